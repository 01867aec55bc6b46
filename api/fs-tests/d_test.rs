use super::WaitingLocks;

#[test]
fn empty_ledger() {
    let mut ledger: WaitingLocks<u32> = WaitingLocks::new();
    assert!(ledger.is_empty());
    assert_eq!(ledger.wake_next("/f"), None);
    assert!(ledger.wake_all("/f").is_empty());
    assert!(ledger.drain().is_empty());
}

#[test]
fn wake_next_is_per_path_and_oldest_first() {
    let mut ledger = WaitingLocks::new();
    ledger.park("/f", "a", 1);
    ledger.park("/g", "b", 2);
    ledger.park("/f", "c", 3);
    assert_eq!(ledger.len(), 3);
    assert_eq!(ledger.waiting_on("/f"), 2);
    assert_eq!(ledger.waiting_on("/h"), 0);

    assert_eq!(ledger.wake_next("/f"), Some(1));
    assert_eq!(ledger.wake_next("/f"), Some(3));
    assert_eq!(ledger.wake_next("/f"), None);
    //other paths untouched
    assert_eq!(ledger.waiting_on("/g"), 1);
}

#[test]
fn wake_all_leaves_other_paths() {
    let mut ledger = WaitingLocks::new();
    for (i, path) in ["/f", "/g", "/f", "/f", "/g"].iter().enumerate() {
        ledger.park(path, "c", i);
    }
    assert_eq!(ledger.wake_all("/f"), vec![0, 2, 3]);
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger.wake_next("/g"), Some(1));
}

#[test]
fn drain_empties_everything() {
    let mut ledger = WaitingLocks::new();
    ledger.park("/f", "a", 'x');
    ledger.park("/g", "b", 'y');
    let drained = ledger.drain();
    assert_eq!(
        drained,
        vec![("/f".to_string(), 'x'), ("/g".to_string(), 'y')]
    );
    assert!(ledger.is_empty());

    //still usable
    ledger.park("/f", "a", 'z');
    assert_eq!(ledger.wake_next("/f"), Some('z'));
}
