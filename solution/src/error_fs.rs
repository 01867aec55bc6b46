//! Errors of the configuration, server and client layers

use fss_api::error::{ProtocolError, StorageError};
use fss_api::protocol::ResponseCode;
use std::io;
use thiserror::Error;

/// Errors raised while reading the server configuration.
/// Every variant that concerns a single entry names the offending key.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Cannot read the configuration file")]
    ConfigIO(#[from] io::Error),
    /// A line without `=`, or a key with nothing after it
    #[error("Missing value for {0}")]
    MissingValue(String),
    /// A numeric entry that is not a strictly positive number
    #[error("Invalid value for {0}: expected a positive number")]
    InvalidNumber(&'static str),
    /// A key the server does not know
    #[error("Unrecognized configuration option {0}")]
    UnknownKey(String),
    /// A mandatory key never appeared
    #[error("Missing configuration option {0}")]
    MissingKey(&'static str),
    /// The socket path does not fit in a UNIX socket address
    #[error("Socket name too long for SOCKET_NAME")]
    SocketNameTooLong,
    /// A replacement policy other than FIFO was asked for
    #[error("Unsupported REPLACEMENT_POLICY {0}")]
    UnsupportedPolicy(String),
}

/// Error type of the server and client layers.
/// The `#[from]` tags wrap the errors of the layers below, so the `?` operator converts them when crossing into these layers.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Error reported by the storage engine
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    /// Error while encoding or decoding frames
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// Error in the configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Error caused when performing IO outside of the protocol
    #[error("Issue using IO in the server layer")]
    ServerIO(#[from] io::Error),
    /// The server answered with a non-success status
    #[error("Request failed with status {0}")]
    Status(ResponseCode),
    /// The server closed the connection before answering
    #[error("Connection closed by the server")]
    Disconnected,
    /// The server answered with a payload that does not fit the request
    #[error("Unexpected reply payload with status {0}")]
    UnexpectedPayload(ResponseCode),
    /// The server stopped because the storage became unusable
    #[error("Server stopped after a fatal storage error")]
    Fatal,
    /// Invalid input to the server or client layer
    #[error("Invalid input: {0}")]
    Input(&'static str),
}

impl ServerError {
    /// Status carried by a failed reply, if that is what this error is
    pub fn status(&self) -> Option<ResponseCode> {
        match self {
            ServerError::Status(code) => Some(*code),
            _ => None,
        }
    }
}

/// Define a generic alias for a `Result` with the error type `ServerError`.
pub type Result<T> = std::result::Result<T, ServerError>;
