//! Errors returned by the storage engine and by the wire protocol layer.
//!
//! [`StorageError`] is the taxonomy every storage operation reports.
//! Apart from [`StorageError::Busy`], which the worker layer handles by parking the request, each variant is translated into exactly one protocol status through [`StorageError::status`].
//!
//! [`ProtocolError`] covers everything that can go wrong while framing requests and responses on a stream.
//! The `#[from]` tags wrap lower level errors, so the `?` operator works when reading and writing frames.

use super::protocol::ResponseCode;
use std::io;
use thiserror::Error;

/// Errors produced by the storage engine operations.
/// The first group are ordinary outcomes that are reported back to the requesting client.
/// `InconsistentState` and `Internal` mean the engine can no longer be trusted; see [`StorageError::is_fatal`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Missing, empty or oversized argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The file does not exist in the storage
    #[error("File not found")]
    NotFound,
    /// A file with the same name already exists
    #[error("File already exists")]
    AlreadyExists,
    /// The client already has the file open
    #[error("File already opened by this client")]
    AlreadyOpen,
    /// The client does not have the file open
    #[error("File already closed by this client")]
    AlreadyClosed,
    /// The file already holds content and can only be appended to
    #[error("File already written")]
    AlreadyWritten,
    /// Nobody holds the exclusive lock on the file
    #[error("File already unlocked")]
    AlreadyUnlocked,
    /// The operation requires the client to have opened the file first
    #[error("File not opened by this client")]
    NotOpened,
    /// Another client holds the exclusive lock, or the client lacks it
    #[error("Permission denied")]
    PermissionDenied,
    /// The file holds no content
    #[error("File is empty")]
    Empty,
    /// The content can never fit in the storage capacity
    #[error("File too big for the storage capacity")]
    TooBig,
    /// No file in the storage holds content
    #[error("Storage is empty")]
    StorageEmpty,
    /// The exclusive lock is held by another client; the request may be retried
    #[error("File is locked by another client")]
    Busy,
    /// The directory and the eviction ledger disagree
    #[error("Inconsistent storage state: {0}")]
    InconsistentState(&'static str),
    /// A lock was poisoned by a panicking thread
    #[error("Internal storage error: {0}")]
    Internal(&'static str),
}

impl StorageError {
    /// Protocol status that reports this error to a client.
    /// `Busy` never reaches a client, but maps to `PermissionDenied` should a caller send it anyway.
    pub fn status(&self) -> ResponseCode {
        match self {
            StorageError::InvalidArgument(_) => ResponseCode::InvalidArgument,
            StorageError::NotFound => ResponseCode::FileNotFound,
            StorageError::AlreadyExists => ResponseCode::FileAlreadyExists,
            StorageError::AlreadyOpen => ResponseCode::FileAlreadyOpen,
            StorageError::AlreadyClosed => ResponseCode::FileAlreadyClosed,
            StorageError::AlreadyWritten => ResponseCode::FileAlreadyWritten,
            StorageError::AlreadyUnlocked => ResponseCode::FileAlreadyUnlocked,
            StorageError::NotOpened => ResponseCode::FileNotOpened,
            StorageError::PermissionDenied | StorageError::Busy => ResponseCode::PermissionDenied,
            StorageError::Empty => ResponseCode::FileEmpty,
            StorageError::TooBig => ResponseCode::FileTooBig,
            StorageError::StorageEmpty => ResponseCode::StorageEmpty,
            StorageError::InconsistentState(_) | StorageError::Internal(_) => {
                ResponseCode::InternalError
            }
        }
    }

    /// Whether the engine must be considered unusable after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StorageError::InconsistentState(_) | StorageError::Internal(_)
        )
    }
}

/// Define a generic alias for a `Result` with the error type `StorageError`.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised while encoding or decoding frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Error caused when reading or writing the underlying stream
    #[error("Issue using IO in the protocol layer")]
    ProtocolIO(#[from] io::Error),
    /// Error caused when (de)serializing a frame body
    #[error("Issue with serialization in the protocol layer")]
    ProtocolSerialize(#[from] bincode::Error),
    /// The header carries a code this side does not know
    #[error("Unknown frame code {0}")]
    UnknownCode(u16),
    /// The header code and the decoded body disagree
    #[error("Frame header code {0} does not match its body")]
    CodeMismatch(u16),
    /// The announced payload exceeds the accepted maximum
    #[error("Frame payload of {0} bytes exceeds the limit")]
    FrameTooLarge(u64),
}
