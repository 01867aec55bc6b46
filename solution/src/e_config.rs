//! Server configuration
//!
//! The server reads its settings from a text file of `KEY=VALUE` lines.
//! Blank lines and lines starting with `#` are ignored, and whitespace around keys and values is trimmed.
//!
//! | key                  | required | meaning                                   |
//! |----------------------|----------|-------------------------------------------|
//! | `SOCKET_NAME`        | yes      | path of the UNIX socket to listen on      |
//! | `STORAGE_CAPACITY`   | yes      | maximum number of stored content bytes    |
//! | `FILE_LIMIT`         | yes      | maximum number of files holding content   |
//! | `N_WORKERS`          | yes      | number of worker threads                  |
//! | `REPLACEMENT_POLICY` | no       | `FIFO`, the default and only policy       |
//! | `LOG_FILE`           | no       | file the operation log is written to      |
//!
//! Numbers must be strictly positive. A key appearing twice keeps its last value.

use super::error_fs::ConfigError;
use fss_api::types::{ReplacementPolicy, StorageLimits};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Longest accepted socket path: `sun_path` holds 108 bytes, including the terminating NUL
pub const MAX_SOCKET_NAME: usize = 107;

/// Settings of a server instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Path of the listening socket
    pub socket_name: PathBuf,
    /// Byte ceiling of the storage
    pub storage_capacity: u64,
    /// File ceiling of the storage
    pub file_limit: u64,
    /// Number of worker threads
    pub n_workers: usize,
    /// Replacement policy of the storage
    pub policy: ReplacementPolicy,
    /// Destination of the operation log; standard error when absent
    pub log_file: Option<PathBuf>,
}

impl ServerConfig {
    /// Read and parse the configuration file at `path`
    pub fn load(path: &Path) -> Result<ServerConfig, ConfigError> {
        fs::read_to_string(path)?.parse()
    }

    /// Capacity limits of the storage this configuration describes
    pub fn limits(&self) -> StorageLimits {
        StorageLimits {
            files: self.file_limit,
            bytes: self.storage_capacity,
            policy: self.policy,
        }
    }
}

fn required<'a>(key: &str, value: &'a str) -> Result<&'a str, ConfigError> {
    if value.is_empty() {
        Err(ConfigError::MissingValue(key.to_string()))
    } else {
        Ok(value)
    }
}

fn positive(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber(key)),
    }
}

impl FromStr for ServerConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut socket_name = None;
        let mut storage_capacity = None;
        let mut file_limit = None;
        let mut n_workers = None;
        let mut policy = ReplacementPolicy::default();
        let mut log_file = None;

        for line in s.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = match line.split_once('=') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => (line, ""),
            };

            match key {
                "SOCKET_NAME" => {
                    let value = required(key, value)?;
                    if value.len() > MAX_SOCKET_NAME {
                        return Err(ConfigError::SocketNameTooLong);
                    }
                    socket_name = Some(PathBuf::from(value));
                }
                "STORAGE_CAPACITY" => {
                    storage_capacity = Some(positive("STORAGE_CAPACITY", required(key, value)?)?)
                }
                "FILE_LIMIT" => file_limit = Some(positive("FILE_LIMIT", required(key, value)?)?),
                "N_WORKERS" => {
                    let n = positive("N_WORKERS", required(key, value)?)?;
                    n_workers = Some(
                        usize::try_from(n).map_err(|_| ConfigError::InvalidNumber("N_WORKERS"))?,
                    );
                }
                "REPLACEMENT_POLICY" => {
                    let value = required(key, value)?;
                    policy = value
                        .parse()
                        .map_err(|_| ConfigError::UnsupportedPolicy(value.to_string()))?;
                }
                "LOG_FILE" => log_file = Some(PathBuf::from(required(key, value)?)),
                _ => return Err(ConfigError::UnknownKey(key.to_string())),
            }
        }

        Ok(ServerConfig {
            socket_name: socket_name.ok_or(ConfigError::MissingKey("SOCKET_NAME"))?,
            storage_capacity: storage_capacity.ok_or(ConfigError::MissingKey("STORAGE_CAPACITY"))?,
            file_limit: file_limit.ok_or(ConfigError::MissingKey("FILE_LIMIT"))?,
            n_workers: n_workers.ok_or(ConfigError::MissingKey("N_WORKERS"))?,
            policy,
            log_file,
        })
    }
}

#[cfg(test)]
#[path = "../../api/fs-tests/e_test.rs"]
mod tests;
