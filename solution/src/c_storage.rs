//! Storage engine
//!
//! A thread-safe, in-memory store of named files, bounded both in number of files holding content and in total content bytes.
//! When a `write` or `append` would cross either bound, the files whose content arrived first are evicted and copies of them are returned to the caller.
//!
//! # Locking
//!
//! Two levels of reader/writer locks protect the state:
//! 1. The *directory lock* guards the name → record map, the eviction ledger and the counters.
//!    Operations that insert or delete entries or touch the counters (`open` with `CREATE`, `write`, `append`, `remove`) take it for writing, and hold it for their whole duration, so no two evictions ever run concurrently.
//!    Every other operation takes it for reading, only for the time needed to find its record.
//! 2. Each record has its own lock (see [`SharedRecord`]), which guards its content, openers and lock holder.
//!    It is always taken while the directory lock is held; lookups release the directory lock as soon as the record lock is taken, so a slow operation on one file does not hold up the others.
//!
//! The ledger of waiting lock requests sits behind a mutex that is only taken after the other two.
//! The order is always directory, then record, then waiting ledger.
//! The only time a thread holds two record locks is during victim selection, which reads the victims while holding the directory lock for writing.
//!
//! Every guard is scoped, so each early return releases whatever was taken.
//! A poisoned lock is reported as `StorageError::Internal`.
//!
//! # Accounting
//!
//! Only files holding content take part in the capacity accounting: `files_count` is the number of non-empty files, which is also the length of the eviction ledger.
//! Empty files created by `open` cost nothing and are never evicted.

use super::a_ordered_list::OrderedList;
use super::b_file_record::{FileRecord, SharedRecord};
use super::d_waiting_locks::WaitingLocks;
use fss_api::error::{Result, StorageError};
use fss_api::fs::StorageSupport;
use fss_api::types::{
    check_client, check_filename, Evicted, FileCopy, LockAttempt, OpenFlags, Removed,
    StorageLimits, StorageStats,
};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Storage type exercised by the shared test suites, with plain numbers as lock continuations
pub type FSName = FileStorage<u64>;

fn read_lock<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| StorageError::Internal("poisoned lock while reading"))
}

fn write_lock<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| StorageError::Internal("poisoned lock while writing"))
}

fn mutex_lock<T>(lock: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    lock.lock()
        .map_err(|_| StorageError::Internal("poisoned waiting ledger"))
}

/// State guarded by the directory lock
#[derive(Debug, Default)]
struct Directory {
    files: HashMap<String, SharedRecord>,
    ledger: OrderedList<String>,
    files_count: u64,
    bytes_used: u64,
    max_files_seen: u64,
    max_bytes_seen: u64,
    eviction_count: u64,
}

impl Directory {
    fn record(&self, name: &str) -> Result<&SharedRecord> {
        self.files.get(name).ok_or(StorageError::NotFound)
    }

    fn note_peaks(&mut self) {
        self.max_files_seen = self.max_files_seen.max(self.files_count);
        self.max_bytes_seen = self.max_bytes_seen.max(self.bytes_used);
    }

    /// Account for a non-empty file of `size` bytes leaving the storage
    fn release(&mut self, size: u64) -> Result<()> {
        self.files_count = self
            .files_count
            .checked_sub(1)
            .ok_or(StorageError::InconsistentState("file count underflow"))?;
        self.bytes_used = self
            .bytes_used
            .checked_sub(size)
            .ok_or(StorageError::InconsistentState("byte count underflow"))?;
        Ok(())
    }

    /// Pick, oldest first, the files to evict so that `incoming` more bytes fit, plus one more file if `new_file` is set.
    /// `target` is never picked. Nothing is modified; the victims are returned as copies.
    fn select_victims(
        &self,
        target: &str,
        incoming: u64,
        new_file: bool,
        limits: &StorageLimits,
    ) -> Result<Vec<FileCopy>> {
        let mut files = self.files_count;
        let mut bytes = self.bytes_used;
        let mut victims = Vec::new();
        let mut cursor = self.ledger.head();

        while (new_file && files + 1 > limits.files) || bytes + incoming > limits.bytes {
            let name = loop {
                let handle = cursor.ok_or(StorageError::InconsistentState(
                    "eviction ledger exhausted before the limits were met",
                ))?;
                cursor = self.ledger.next(handle);
                let name = self
                    .ledger
                    .get(handle)
                    .ok_or(StorageError::InconsistentState("dangling ledger handle"))?;
                if name != target {
                    break name;
                }
            };
            let record = self.files.get(name).ok_or(StorageError::InconsistentState(
                "ledger names a file missing from the directory",
            ))?;
            let copy = read_lock(record)?.snapshot();
            if copy.is_empty() {
                return Err(StorageError::InconsistentState(
                    "empty file in the eviction ledger",
                ));
            }
            files = files
                .checked_sub(1)
                .ok_or(StorageError::InconsistentState("file count underflow"))?;
            bytes = bytes
                .checked_sub(copy.len())
                .ok_or(StorageError::InconsistentState("byte count underflow"))?;
            victims.push(copy);
        }
        Ok(victims)
    }

    /// Drop the selected victims from the ledger and the directory
    fn apply_evictions(&mut self, victims: &[FileCopy]) -> Result<()> {
        for victim in victims {
            self.ledger
                .remove(|n| *n == victim.name)
                .ok_or(StorageError::InconsistentState("victim missing from the ledger"))?;
            self.files
                .remove(&victim.name)
                .ok_or(StorageError::InconsistentState("victim missing from the directory"))?;
            self.release(victim.len())?;
            self.eviction_count += 1;
            debug!("evicted {} ({} bytes)", victim.name, victim.len());
        }
        Ok(())
    }
}

/// Capacity-bounded in-memory file storage.
/// `W` is the type of the continuations parked by `lock_or_wait`.
#[derive(Debug)]
pub struct FileStorage<W> {
    limits: StorageLimits,
    directory: RwLock<Directory>,
    waiting: Mutex<WaitingLocks<W>>,
}

/// Functions specific to FileStorage
impl<W> FileStorage<W> {
    /// Limits the storage was created with
    pub fn limits(&self) -> StorageLimits {
        self.limits
    }

    /// Whether a file called `filename` exists, empty or not
    pub fn contains(&self, filename: &str) -> Result<bool> {
        Ok(read_lock(&self.directory)?.files.contains_key(filename))
    }

    /// Number of lock requests parked on `filename`
    pub fn waiting_on(&self, filename: &str) -> Result<usize> {
        Ok(mutex_lock(&self.waiting)?.waiting_on(filename))
    }

    /// Verify the accounting invariants: the counters match the directory, and the ledger lists every non-empty file exactly once.
    /// Only meaningful while no operation is in flight.
    pub fn check_invariants(&self) -> Result<()> {
        let dir = read_lock(&self.directory)?;
        let mut non_empty = 0;
        let mut bytes = 0;
        for (name, record) in &dir.files {
            let rec = read_lock(record)?;
            if rec.name() != name {
                return Err(StorageError::InconsistentState("record filed under another name"));
            }
            if rec.is_empty() {
                if dir.ledger.find(|n| n == name).is_some() {
                    return Err(StorageError::InconsistentState("empty file in the ledger"));
                }
                continue;
            }
            non_empty += 1;
            bytes += rec.size();
            let mut occurrences = 0;
            let mut cursor = dir.ledger.head();
            while let Some(h) = cursor {
                if dir.ledger.get(h).map(|n| n == name) == Some(true) {
                    occurrences += 1;
                }
                cursor = dir.ledger.next(h);
            }
            if occurrences != 1 {
                return Err(StorageError::InconsistentState(
                    "non-empty file not listed exactly once in the ledger",
                ));
            }
        }
        if dir.ledger.len() as u64 != non_empty || dir.files_count != non_empty {
            return Err(StorageError::InconsistentState("file count mismatch"));
        }
        if dir.bytes_used != bytes {
            return Err(StorageError::InconsistentState("byte count mismatch"));
        }
        Ok(())
    }

    /// Find `filename`, lock its record for writing, release the directory and run `f` on the record
    fn with_record<T, F>(&self, filename: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut FileRecord) -> Result<T>,
    {
        let dir = read_lock(&self.directory)?;
        let record = Arc::clone(dir.record(filename)?);
        let mut rec = write_lock(&record)?;
        drop(dir);
        f(&mut rec)
    }

    /// Same as `with_record`, with a read lock on the record
    fn with_record_read<T, F>(&self, filename: &str, f: F) -> Result<T>
    where
        F: FnOnce(&FileRecord) -> Result<T>,
    {
        let dir = read_lock(&self.directory)?;
        let record = Arc::clone(dir.record(filename)?);
        let rec = read_lock(&record)?;
        drop(dir);
        f(&rec)
    }

    fn wake_evicted(&self, victims: &[FileCopy]) -> Result<Vec<W>> {
        if victims.is_empty() {
            return Ok(Vec::new());
        }
        let mut waiting = mutex_lock(&self.waiting)?;
        Ok(victims
            .iter()
            .flat_map(|v| waiting.wake_all(&v.name))
            .collect())
    }
}

impl<W: Send> StorageSupport for FileStorage<W> {
    type Waiter = W;

    fn with_limits(limits: StorageLimits) -> Result<Self> {
        if !limits.is_valid() {
            return Err(StorageError::InvalidArgument(
                "storage limits must be positive",
            ));
        }
        Ok(FileStorage {
            limits,
            directory: RwLock::new(Directory::default()),
            waiting: Mutex::new(WaitingLocks::new()),
        })
    }

    fn open(&self, filename: &str, flags: OpenFlags, client: &str) -> Result<()> {
        check_filename(filename)?;
        check_client(client)?;

        if flags.contains(OpenFlags::CREATE) {
            let mut dir = write_lock(&self.directory)?;
            if dir.files.contains_key(filename) {
                return Err(StorageError::AlreadyExists);
            }
            let record = FileRecord::new(filename, client, flags.contains(OpenFlags::LOCK));
            dir.files.insert(filename.to_string(), record.into_shared());
            return Ok(());
        }

        self.with_record(filename, |rec| {
            rec.open(client, flags.contains(OpenFlags::LOCK))
        })
    }

    fn read(&self, filename: &str, client: &str) -> Result<Vec<u8>> {
        check_filename(filename)?;
        check_client(client)?;
        self.with_record_read(filename, |rec| rec.read(client).map(|c| c.to_vec()))
    }

    fn read_n(&self, n: i64, client: &str) -> Result<Vec<FileCopy>> {
        check_client(client)?;
        let wanted = if n <= 0 {
            usize::MAX
        } else {
            usize::try_from(n).unwrap_or(usize::MAX)
        };

        let dir = read_lock(&self.directory)?;
        if dir.ledger.is_empty() {
            return Err(StorageError::StorageEmpty);
        }
        let mut copies = Vec::new();
        //skipped files still use up their place among the n visited
        for name in dir.ledger.iter().take(wanted) {
            let record = dir.files.get(name).ok_or(StorageError::InconsistentState(
                "ledger names a file missing from the directory",
            ))?;
            let rec = read_lock(record)?;
            if !rec.is_locked_by_other(client) {
                copies.push(rec.snapshot());
            }
        }
        Ok(copies)
    }

    fn write(&self, filename: &str, content: Vec<u8>, client: &str) -> Result<Evicted<W>> {
        check_filename(filename)?;
        check_client(client)?;

        let mut dir = write_lock(&self.directory)?;
        let record = Arc::clone(dir.record(filename)?);
        let mut rec = write_lock(&record)?;

        let size = content.len() as u64;
        if !rec.is_empty() {
            return Err(StorageError::AlreadyWritten);
        }
        if size > self.limits.bytes {
            return Err(StorageError::TooBig);
        }
        rec.check_writer(client)?;
        if size == 0 {
            return Ok(Evicted::default());
        }

        let victims = dir.select_victims(filename, size, true, &self.limits)?;
        dir.apply_evictions(&victims)?;
        let waiters = self.wake_evicted(&victims)?;

        rec.store(content);
        dir.ledger.push_back(filename.to_string());
        dir.files_count += 1;
        dir.bytes_used += size;
        dir.note_peaks();
        Ok(Evicted {
            files: victims,
            waiters,
        })
    }

    fn append(&self, filename: &str, data: &[u8], client: &str) -> Result<Evicted<W>> {
        check_filename(filename)?;
        check_client(client)?;

        let mut dir = write_lock(&self.directory)?;
        let record = Arc::clone(dir.record(filename)?);
        let mut rec = write_lock(&record)?;

        let size = data.len() as u64;
        if rec.size() + size > self.limits.bytes {
            return Err(StorageError::TooBig);
        }
        rec.check_writer(client)?;
        if size == 0 {
            return Ok(Evicted::default());
        }

        //an empty file joins the ledger with its first bytes
        let new_file = rec.is_empty();
        let victims = dir.select_victims(filename, size, new_file, &self.limits)?;
        dir.apply_evictions(&victims)?;
        let waiters = self.wake_evicted(&victims)?;

        rec.extend(data);
        if new_file {
            dir.ledger.push_back(filename.to_string());
            dir.files_count += 1;
        }
        dir.bytes_used += size;
        dir.note_peaks();
        Ok(Evicted {
            files: victims,
            waiters,
        })
    }

    fn lock(&self, filename: &str, client: &str) -> Result<()> {
        check_filename(filename)?;
        check_client(client)?;
        self.with_record(filename, |rec| rec.lock(client))
    }

    fn lock_or_wait(&self, filename: &str, client: &str, waiter: W) -> Result<LockAttempt> {
        check_filename(filename)?;
        check_client(client)?;
        self.with_record(filename, |rec| match rec.lock(client) {
            Ok(()) => Ok(LockAttempt::Acquired),
            Err(StorageError::Busy) => {
                mutex_lock(&self.waiting)?.park(filename, client, waiter);
                Ok(LockAttempt::Parked)
            }
            Err(e) => Err(e),
        })
    }

    fn unlock(&self, filename: &str, client: &str) -> Result<Option<W>> {
        check_filename(filename)?;
        check_client(client)?;
        self.with_record(filename, |rec| {
            rec.unlock(client)?;
            Ok(mutex_lock(&self.waiting)?.wake_next(filename))
        })
    }

    fn close(&self, filename: &str, client: &str) -> Result<()> {
        check_filename(filename)?;
        check_client(client)?;
        self.with_record(filename, |rec| rec.close(client))
    }

    fn remove(&self, filename: &str, client: &str) -> Result<Removed<W>> {
        check_filename(filename)?;
        check_client(client)?;

        let mut dir = write_lock(&self.directory)?;
        let record = Arc::clone(dir.record(filename)?);
        let rec = write_lock(&record)?;
        if !rec.is_held_by(client) {
            return Err(StorageError::PermissionDenied);
        }

        let freed = rec.size();
        if freed > 0 {
            dir.ledger
                .remove(|n| n == filename)
                .ok_or(StorageError::InconsistentState("removed file missing from the ledger"))?;
            dir.release(freed)?;
        }
        dir.files.remove(filename);
        let waiters = mutex_lock(&self.waiting)?.wake_all(filename);
        Ok(Removed { freed, waiters })
    }

    fn next_waiter(&self, filename: &str) -> Result<Option<W>> {
        Ok(mutex_lock(&self.waiting)?.wake_next(filename))
    }

    fn drain_waiters(&self) -> Result<Vec<(String, W)>> {
        Ok(mutex_lock(&self.waiting)?.drain())
    }

    fn stats(&self) -> Result<StorageStats> {
        let dir = read_lock(&self.directory)?;
        Ok(StorageStats {
            max_files_seen: dir.max_files_seen,
            max_bytes_seen: dir.max_bytes_seen,
            eviction_count: dir.eviction_count,
            files_count: dir.files_count,
            bytes_used: dir.bytes_used,
            ledger: dir.ledger.iter().cloned().collect(),
        })
    }
}

#[cfg(test)]
#[path = "../../api/fs-tests/c_test.rs"]
mod tests;
