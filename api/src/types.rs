//! Module containing the types shared by the storage engine, the server and the client.
//! You can define your own wrappers around these types if you need more than the provided functionality.

use super::error::{Result, StorageError};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest accepted file name component, in bytes
pub const MAX_FILE_NAME: usize = 128;
/// Longest accepted argument vector, in bytes
pub const MAX_ARGV: usize = 1024;
/// Longest accepted file name, in bytes
pub const MAX_PATH: usize = MAX_ARGV - MAX_FILE_NAME;
/// Longest accepted client name, in bytes
pub const MAX_USERNAME: usize = 64;

bitflags! {
    /// Flags accepted by `open`.
    /// The four valid combinations are `NORMAL` (no flag), `CREATE`, `LOCK` and `CREATE | LOCK`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenFlags: u8 {
        /// Create the file; fails if it already exists
        const CREATE = 0b01;
        /// Take the exclusive lock while opening
        const LOCK = 0b10;
    }
}

impl OpenFlags {
    /// Open an existing file without locking it
    pub const NORMAL: OpenFlags = OpenFlags::empty();

    /// Decode flags received from the wire, rejecting unknown bits
    pub fn from_wire(bits: u8) -> Result<OpenFlags> {
        OpenFlags::from_bits(bits).ok_or(StorageError::InvalidArgument("unknown open flags"))
    }
}

/// Deep copy of a stored file, handed out by `read_n` and by evictions.
/// The copy shares nothing with the engine, so it can be serialized without holding any lock.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct FileCopy {
    /// Name of the file in the storage
    pub name: String,
    /// Content of the file at the moment it was copied
    pub content: Vec<u8>,
}

impl FileCopy {
    /// Create a copy from its parts
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> FileCopy {
        FileCopy {
            name: name.into(),
            content,
        }
    }

    /// Size of the copied content in bytes
    pub fn len(&self) -> u64 {
        self.content.len() as u64
    }

    /// Whether the copied content is empty
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Replacement policies the engine knows about.
/// Only FIFO exists; any other name is a configuration error.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementPolicy {
    /// Evict files in the order their content arrived
    #[default]
    Fifo,
}

impl FromStr for ReplacementPolicy {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FIFO" => Ok(ReplacementPolicy::Fifo),
            _ => Err(StorageError::InvalidArgument(
                "unsupported replacement policy",
            )),
        }
    }
}

impl fmt::Display for ReplacementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplacementPolicy::Fifo => write!(f, "FIFO"),
        }
    }
}

/// Capacity ceilings of a storage, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageLimits {
    /// Maximum number of files holding content
    pub files: u64,
    /// Maximum number of content bytes
    pub bytes: u64,
    /// Replacement policy used when the ceilings are hit
    pub policy: ReplacementPolicy,
}

impl StorageLimits {
    /// FIFO limits with the given ceilings
    pub fn new(files: u64, bytes: u64) -> StorageLimits {
        StorageLimits {
            files,
            bytes,
            policy: ReplacementPolicy::Fifo,
        }
    }

    /// Both ceilings have to be strictly positive
    pub fn is_valid(&self) -> bool {
        self.files > 0 && self.bytes > 0
    }
}

/// Read-only snapshot of the storage counters
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Highest number of files holding content ever observed
    pub max_files_seen: u64,
    /// Highest number of content bytes ever observed
    pub max_bytes_seen: u64,
    /// Number of files evicted so far
    pub eviction_count: u64,
    /// Current number of files holding content
    pub files_count: u64,
    /// Current number of content bytes
    pub bytes_used: u64,
    /// Current eviction order, oldest first
    pub ledger: Vec<String>,
}

impl fmt::Display for StorageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "max files stored: {}", self.max_files_seen)?;
        writeln!(f, "max bytes stored: {}", self.max_bytes_seen)?;
        writeln!(f, "evictions: {}", self.eviction_count)?;
        writeln!(
            f,
            "files at shutdown: {} ({} bytes)",
            self.files_count, self.bytes_used
        )?;
        for name in &self.ledger {
            writeln!(f, "  {}", name)?;
        }
        Ok(())
    }
}

/// Result of a `write` or `append`: the files evicted to make room, and the lock continuations that were parked on them
#[derive(Debug)]
pub struct Evicted<W> {
    /// Copies of the evicted files, in eviction order
    pub files: Vec<FileCopy>,
    /// Continuations parked on the evicted files
    pub waiters: Vec<W>,
}

impl<W> Default for Evicted<W> {
    fn default() -> Self {
        Evicted {
            files: Vec::new(),
            waiters: Vec::new(),
        }
    }
}

/// Result of a `remove`
#[derive(Debug)]
pub struct Removed<W> {
    /// Content bytes released by the removal
    pub freed: u64,
    /// Continuations that were parked on the removed file
    pub waiters: Vec<W>,
}

/// Outcome of a lock attempt that is allowed to wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAttempt {
    /// The caller now holds the exclusive lock
    Acquired,
    /// The lock is held by another client; the continuation was queued
    Parked,
}

/// Check a client name: non-empty and at most `MAX_USERNAME` bytes
pub fn check_client(client: &str) -> Result<()> {
    if client.is_empty() {
        return Err(StorageError::InvalidArgument("empty client name"));
    }
    if client.len() > MAX_USERNAME {
        return Err(StorageError::InvalidArgument("client name too long"));
    }
    Ok(())
}

/// Check a file name: non-empty, at most `MAX_PATH` bytes, no NUL bytes
pub fn check_filename(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StorageError::InvalidArgument("empty file name"));
    }
    if name.len() > MAX_PATH {
        return Err(StorageError::InvalidArgument("file name too long"));
    }
    if name.contains('\0') {
        return Err(StorageError::InvalidArgument("file name contains NUL"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_flags_from_wire() {
        assert_eq!(OpenFlags::from_wire(0).unwrap(), OpenFlags::NORMAL);
        assert_eq!(
            OpenFlags::from_wire(3).unwrap(),
            OpenFlags::CREATE | OpenFlags::LOCK
        );
        assert!(OpenFlags::from_wire(4).is_err());
    }

    #[test]
    fn argument_checks() {
        assert!(check_client("").is_err());
        assert!(check_client(&"u".repeat(MAX_USERNAME + 1)).is_err());
        assert!(check_client("u").is_ok());
        assert!(check_filename("").is_err());
        assert!(check_filename(&"f".repeat(MAX_PATH + 1)).is_err());
        assert!(check_filename("a\0b").is_err());
        assert!(check_filename("/tmp/a.txt").is_ok());
    }

    #[test]
    fn policy_parsing() {
        assert_eq!(
            "fifo".parse::<ReplacementPolicy>().unwrap(),
            ReplacementPolicy::Fifo
        );
        assert!("LRU".parse::<ReplacementPolicy>().is_err());
    }
}
