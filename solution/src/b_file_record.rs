//! File record
//!
//! The unit of stored data: a name, the content, the clients that have the file open and the client holding its exclusive lock, if any.
//!
//! A record never synchronizes itself. The storage wraps each one in its own `RwLock` (see [`SharedRecord`]) and only mutates it through that lock, after finding it in the directory.
//! The methods below implement the per-file rules of the storage operations, so the storage itself only has to deal with the directory, the ledger and the counters.

use super::a_ordered_list::OrderedList;
use fss_api::error::{Result, StorageError};
use fss_api::types::FileCopy;
use std::sync::{Arc, RwLock};

/// A record as stored in the directory: shared, and guarded by its own reader/writer lock
pub type SharedRecord = Arc<RwLock<FileRecord>>;

/// A stored file
#[derive(Debug)]
pub struct FileRecord {
    name: String,
    content: Vec<u8>,
    openers: OrderedList<String>,
    holder: Option<String>,
}

impl FileRecord {
    /// Create an empty file, opened by `creator` and locked by it if `locked` is set
    pub fn new(name: &str, creator: &str, locked: bool) -> FileRecord {
        let mut openers = OrderedList::new();
        openers.push_back(creator.to_string());
        FileRecord {
            name: name.to_string(),
            content: Vec::new(),
            openers,
            holder: if locked {
                Some(creator.to_string())
            } else {
                None
            },
        }
    }

    /// Wrap the record for storage in the directory
    pub fn into_shared(self) -> SharedRecord {
        Arc::new(RwLock::new(self))
    }

    /// Name of the file
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Content size in bytes
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    /// Whether the file has no content
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Content of the file
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Client holding the exclusive lock
    pub fn holder(&self) -> Option<&str> {
        self.holder.as_deref()
    }

    /// Whether `client` currently has the file open
    pub fn is_opener(&self, client: &str) -> bool {
        self.openers.find(|c| c == client).is_some()
    }

    /// Whether somebody other than `client` holds the exclusive lock
    pub fn is_locked_by_other(&self, client: &str) -> bool {
        matches!(&self.holder, Some(h) if h != client)
    }

    /// Whether `client` holds the exclusive lock
    pub fn is_held_by(&self, client: &str) -> bool {
        self.holder.as_deref() == Some(client)
    }

    /// Deep copy of the name and content
    pub fn snapshot(&self) -> FileCopy {
        FileCopy::new(self.name.clone(), self.content.clone())
    }

    /// Open the file for `client`, taking the lock as well if `lock` is set and nobody holds it
    pub fn open(&mut self, client: &str, lock: bool) -> Result<()> {
        if self.is_locked_by_other(client) {
            return Err(StorageError::PermissionDenied);
        }
        if self.is_opener(client) {
            return Err(StorageError::AlreadyOpen);
        }
        self.openers.push_back(client.to_string());
        if lock && self.holder.is_none() {
            self.holder = Some(client.to_string());
        }
        Ok(())
    }

    /// Close the file for `client`; the lock is left untouched
    pub fn close(&mut self, client: &str) -> Result<()> {
        self.openers
            .remove(|c| c == client)
            .map(|_| ())
            .ok_or(StorageError::AlreadyClosed)
    }

    /// Content visible to `client`
    pub fn read(&self, client: &str) -> Result<&[u8]> {
        if !self.is_opener(client) {
            return Err(StorageError::NotOpened);
        }
        if self.is_locked_by_other(client) {
            return Err(StorageError::PermissionDenied);
        }
        if self.is_empty() {
            return Err(StorageError::Empty);
        }
        Ok(&self.content)
    }

    /// Check that `client` may modify the content: it must have the file open and hold its lock
    pub fn check_writer(&self, client: &str) -> Result<()> {
        if !self.is_opener(client) {
            return Err(StorageError::NotOpened);
        }
        if !self.is_held_by(client) {
            return Err(StorageError::PermissionDenied);
        }
        Ok(())
    }

    /// Take the exclusive lock for `client`; taking it twice is fine
    pub fn lock(&mut self, client: &str) -> Result<()> {
        if !self.is_opener(client) {
            return Err(StorageError::NotOpened);
        }
        if self.is_locked_by_other(client) {
            return Err(StorageError::Busy);
        }
        self.holder = Some(client.to_string());
        Ok(())
    }

    /// Release the exclusive lock held by `client`
    pub fn unlock(&mut self, client: &str) -> Result<()> {
        if !self.is_opener(client) {
            return Err(StorageError::NotOpened);
        }
        match &self.holder {
            None => Err(StorageError::AlreadyUnlocked),
            Some(h) if h != client => Err(StorageError::PermissionDenied),
            Some(_) => {
                self.holder = None;
                Ok(())
            }
        }
    }

    /// Replace the (empty) content
    pub fn store(&mut self, content: Vec<u8>) {
        self.content = content;
    }

    /// Grow the content by `data`
    pub fn extend(&mut self, data: &[u8]) {
        self.content.extend_from_slice(data);
    }
}

#[cfg(test)]
#[path = "../../api/fs-tests/b_test.rs"]
mod tests;
