//! Waiting-lock ledger
//!
//! Lock requests that found their file exclusively held by another client are parked here, in arrival order, together with an opaque continuation supplied by the worker layer.
//! When the lock is released, the oldest request for that file is handed back so the worker can re-attempt it on the requester's behalf.
//! There is no expiry: a parked request stays until it is matched, until its file disappears, or until the server shuts down and drains the ledger.
//!
//! The ledger does no locking of its own; the storage keeps it behind a mutex taken after the directory lock and the record lock.

use super::a_ordered_list::OrderedList;

/// A parked lock request
#[derive(Debug)]
pub struct WaitingLock<W> {
    /// File the request waits on
    pub path: String,
    /// Client that asked for the lock
    pub client: String,
    /// Continuation handed back when the request may be retried
    pub waiter: W,
}

/// Queue of parked lock requests, oldest first
#[derive(Debug)]
pub struct WaitingLocks<W> {
    queue: OrderedList<WaitingLock<W>>,
}

impl<W> Default for WaitingLocks<W> {
    fn default() -> Self {
        WaitingLocks {
            queue: OrderedList::new(),
        }
    }
}

impl<W> WaitingLocks<W> {
    /// Create an empty ledger
    pub fn new() -> WaitingLocks<W> {
        WaitingLocks::default()
    }

    /// Number of parked requests
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no request is parked
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Park a request of `client` for `path`
    pub fn park(&mut self, path: &str, client: &str, waiter: W) {
        self.queue.push_back(WaitingLock {
            path: path.to_string(),
            client: client.to_string(),
            waiter,
        });
    }

    /// Number of requests parked on `path`
    pub fn waiting_on(&self, path: &str) -> usize {
        self.queue.iter().filter(|w| w.path == path).count()
    }

    /// Remove the oldest request for `path` and return its continuation
    pub fn wake_next(&mut self, path: &str) -> Option<W> {
        self.queue.remove(|w| w.path == path).map(|w| w.waiter)
    }

    /// Remove every request for `path`, oldest first
    pub fn wake_all(&mut self, path: &str) -> Vec<W> {
        self.queue
            .remove_all(|w| w.path == path)
            .into_iter()
            .map(|w| w.waiter)
            .collect()
    }

    /// Empty the ledger, returning each continuation with the file it waited on
    pub fn drain(&mut self) -> Vec<(String, W)> {
        let mut drained = Vec::with_capacity(self.queue.len());
        std::mem::take(&mut self.queue).destroy(|w| drained.push((w.path, w.waiter)));
        drained
    }
}

#[cfg(test)]
#[path = "../../api/fs-tests/d_test.rs"]
mod tests;
