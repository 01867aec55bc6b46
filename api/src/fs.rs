//! The trait every storage engine implements.
//! The server's workers and the shared test suites only talk to a storage through this trait, so they never depend on how an implementation lays out its directory or its locks.
//!
//! All operations take `&self`: a storage is shared between many workers (typically behind an `Arc`) and does its own synchronization.
//! Every operation first checks its arguments with [`check_client`] and [`check_filename`], without touching any lock, and reports `InvalidArgument` on failure.
//!
//! [`check_client`]: ../types/fn.check_client.html
//! [`check_filename`]: ../types/fn.check_filename.html

use super::error::Result;
use super::types::{
    Evicted, FileCopy, LockAttempt, OpenFlags, Removed, StorageLimits, StorageStats,
};

/// File lifecycle operations of a capacity-bounded, in-memory file storage.
///
/// The storage keeps named files with a byte content, a set of clients that have each file open, and an optional exclusive lock holder per file.
/// Files that hold content are kept in arrival order; when a `write` or `append` would exceed the limits given at construction, the oldest files are evicted and handed back to the caller.
pub trait StorageSupport: Sized {
    /// Opaque continuation stored for a lock request that has to wait.
    /// The storage never looks inside it; it only hands it back when the lock may have become available.
    type Waiter: Send;

    /// Create an empty storage with the given limits.
    /// Errors with `InvalidArgument` if either ceiling is zero.
    fn with_limits(limits: StorageLimits) -> Result<Self>;

    /// Open `filename` on behalf of `client`.
    ///
    /// With `CREATE`, the file must not exist yet; it is created empty, opened by `client`, and locked by `client` if `LOCK` is set too.
    /// An empty file takes no part in eviction.
    ///
    /// Without `CREATE`, the file must exist (`NotFound`), must not be locked by somebody else (`PermissionDenied`) and must not be open by `client` already (`AlreadyOpen`).
    /// With `LOCK`, the lock is only taken if nobody holds it.
    fn open(&self, filename: &str, flags: OpenFlags, client: &str) -> Result<()>;

    /// Return a copy of the content of `filename`.
    /// Errors with `NotOpened` if `client` did not open it, `PermissionDenied` if another client holds its lock and `Empty` if it has no content.
    fn read(&self, filename: &str, client: &str) -> Result<Vec<u8>>;

    /// Visit the `n` oldest files holding content and return a copy of each; `n <= 0` means all of them.
    /// Files locked by another client are skipped silently, and still count towards `n`.
    /// Errors with `StorageEmpty` when no file holds content.
    fn read_n(&self, n: i64, client: &str) -> Result<Vec<FileCopy>>;

    /// Store `content` in the empty file `filename`, evicting the oldest files as needed to respect both limits.
    /// `client` must have opened the file and hold its lock.
    /// Errors with `AlreadyWritten` if the file has content and `TooBig` if `content` exceeds the byte limit on its own.
    fn write(&self, filename: &str, content: Vec<u8>, client: &str) -> Result<Evicted<Self::Waiter>>;

    /// Append `data` to `filename`, evicting the oldest other files as needed.
    /// Same permissions as `write`, but the file may already hold content.
    /// Errors with `TooBig` if the grown file would exceed the byte limit on its own.
    fn append(&self, filename: &str, data: &[u8], client: &str) -> Result<Evicted<Self::Waiter>>;

    /// Take the exclusive lock on `filename` for `client`, which must have the file open.
    /// Taking a lock one already holds succeeds.
    /// Errors with `Busy` if another client holds it; nothing is queued in that case.
    fn lock(&self, filename: &str, client: &str) -> Result<()>;

    /// Like `lock`, but on contention `waiter` is queued for `filename` and `Parked` is returned.
    /// Queuing happens while the contention is observed, so an `unlock` racing with this call always finds the waiter.
    fn lock_or_wait(&self, filename: &str, client: &str, waiter: Self::Waiter) -> Result<LockAttempt>;

    /// Release the exclusive lock `client` holds on `filename`.
    /// Errors with `NotOpened`, `AlreadyUnlocked` if nobody holds the lock and `PermissionDenied` if somebody else does.
    /// Returns the oldest continuation waiting on `filename`, if any.
    fn unlock(&self, filename: &str, client: &str) -> Result<Option<Self::Waiter>>;

    /// Close `filename` for `client`. The lock, if held, is kept.
    /// Errors with `AlreadyClosed` if `client` did not have it open.
    fn close(&self, filename: &str, client: &str) -> Result<()>;

    /// Remove `filename`, which `client` must hold the lock on.
    /// Returns the number of content bytes released, together with every continuation that waited on the file.
    fn remove(&self, filename: &str, client: &str) -> Result<Removed<Self::Waiter>>;

    /// Pop the oldest continuation waiting on `filename`, if any
    fn next_waiter(&self, filename: &str) -> Result<Option<Self::Waiter>>;

    /// Remove every queued continuation, oldest first, together with the file it waits on
    fn drain_waiters(&self) -> Result<Vec<(String, Self::Waiter)>>;

    /// Snapshot of the storage counters and of the eviction order
    fn stats(&self) -> Result<StorageStats>;
}
