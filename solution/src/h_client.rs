//! Client
//!
//! [`Connection`] speaks the wire protocol to a server on behalf of one named client, with one method per storage operation.
//! A reply with a non-success status becomes [`ServerError::Status`].
//!
//! [`Session`] builds the command line client on top of it: it turns local files into storage files and back, saving what the server hands out (evicted files, read files) under local directories.
//! Stored names are mapped under those directories with `relative-path`, keeping only their normal components, so no name can point outside the directory it is saved in.

use super::error_fs::{Result, ServerError};
use fss_api::protocol::{
    read_response, write_request, Payload, Request, RequestFrame, ResponseCode,
};
use fss_api::types::{check_client, FileCopy, OpenFlags};
use log::{debug, warn};
use relative_path::{Component, RelativePath, RelativePathBuf};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::time::{sleep, Instant};

/// An open connection to the server
#[derive(Debug)]
pub struct Connection {
    stream: UnixStream,
    username: String,
}

impl Connection {
    /// Connect to the server listening on `socket`, retrying every `retry` until `deadline`
    pub async fn open(
        socket: &Path,
        retry: Duration,
        deadline: Instant,
        username: &str,
    ) -> Result<Connection> {
        check_client(username)?;
        loop {
            match UnixStream::connect(socket).await {
                Ok(stream) => {
                    debug!("connected to {} as {}", socket.display(), username);
                    return Ok(Connection {
                        stream,
                        username: username.to_string(),
                    });
                }
                Err(e) if Instant::now() + retry > deadline => return Err(e.into()),
                Err(e) => {
                    debug!("cannot connect to {} yet: {}", socket.display(), e);
                    sleep(retry).await;
                }
            }
        }
    }

    /// Name the requests are sent under
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Say goodbye to the server
    pub async fn close(mut self) -> Result<()> {
        self.request(Request::Disconnect).await.map(|_| ())
    }

    async fn request(&mut self, request: Request) -> Result<(ResponseCode, Payload)> {
        let code = request.code();
        let frame = RequestFrame {
            client: self.username.clone(),
            request,
        };
        write_request(&mut self.stream, &frame).await?;
        let response = read_response(&mut self.stream)
            .await?
            .ok_or(ServerError::Disconnected)?;
        debug!("{} -> {}", code.name(), response.status);
        if !response.status.is_success() {
            return Err(ServerError::Status(response.status));
        }
        Ok((response.status, response.payload))
    }

    async fn request_empty(&mut self, request: Request) -> Result<()> {
        match self.request(request).await? {
            (_, Payload::Empty) => Ok(()),
            (status, _) => Err(ServerError::UnexpectedPayload(status)),
        }
    }

    async fn request_files(&mut self, request: Request) -> Result<Vec<FileCopy>> {
        match self.request(request).await? {
            (_, Payload::Files(files)) => Ok(files),
            (status, _) => Err(ServerError::UnexpectedPayload(status)),
        }
    }

    /// Open `path` with `flags`
    pub async fn open_file(&mut self, path: &str, flags: OpenFlags) -> Result<()> {
        self.request_empty(Request::Open {
            path: path.to_string(),
            flags: flags.bits(),
        })
        .await
    }

    /// Content of `path`
    pub async fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        match self
            .request(Request::Read {
                path: path.to_string(),
            })
            .await?
        {
            (_, Payload::Data(data)) => Ok(data),
            (status, _) => Err(ServerError::UnexpectedPayload(status)),
        }
    }

    /// Up to `n` files, all of them if `n <= 0`
    pub async fn read_n_files(&mut self, n: i64) -> Result<Vec<FileCopy>> {
        self.request_files(Request::ReadN { n }).await
    }

    /// Write `content` into the empty file `path`; returns the files evicted to make room
    pub async fn write_file(&mut self, path: &str, content: Vec<u8>) -> Result<Vec<FileCopy>> {
        self.request_files(Request::Write {
            path: path.to_string(),
            content,
        })
        .await
    }

    /// Append `data` to `path`; returns the files evicted to make room
    pub async fn append_to_file(&mut self, path: &str, data: &[u8]) -> Result<Vec<FileCopy>> {
        self.request_files(Request::Append {
            path: path.to_string(),
            data: data.to_vec(),
        })
        .await
    }

    /// Take the lock on `path`, waiting for as long as another client holds it
    pub async fn lock_file(&mut self, path: &str) -> Result<()> {
        self.request_empty(Request::Lock {
            path: path.to_string(),
        })
        .await
    }

    /// Release the lock on `path`
    pub async fn unlock_file(&mut self, path: &str) -> Result<()> {
        self.request_empty(Request::Unlock {
            path: path.to_string(),
        })
        .await
    }

    /// Close `path`
    pub async fn close_file(&mut self, path: &str) -> Result<()> {
        self.request_empty(Request::Close {
            path: path.to_string(),
        })
        .await
    }

    /// Remove `path`, returning the number of bytes freed
    pub async fn remove_file(&mut self, path: &str) -> Result<u64> {
        match self
            .request(Request::Remove {
                path: path.to_string(),
            })
            .await?
        {
            (_, Payload::Freed(freed)) => Ok(freed),
            (status, _) => Err(ServerError::UnexpectedPayload(status)),
        }
    }
}

/// Where a stored file called `name` is saved under `dir`.
/// Only the normal components of `name` are kept.
pub fn local_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let mut relative = RelativePathBuf::new();
    for component in RelativePath::new(name).components() {
        if let Component::Normal(part) = component {
            relative.push(part);
        }
    }
    if relative.as_str().is_empty() {
        return Err(ServerError::Input("file name has no usable component"));
    }
    Ok(relative.to_path(dir))
}

/// Save `files` under `dir`, creating directories as needed
pub fn save_files(dir: &Path, files: &[FileCopy]) -> Result<Vec<PathBuf>> {
    let mut saved = Vec::with_capacity(files.len());
    for file in files {
        let target = local_path(dir, &file.name)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &file.content)?;
        saved.push(target);
    }
    Ok(saved)
}

/// Regular files under `dir`, recursively and in name order, at most `limit` of them (all if `limit` is 0)
pub fn list_files(dir: &Path, limit: usize) -> Result<Vec<PathBuf>> {
    fn walk(dir: &Path, limit: usize, found: &mut Vec<PathBuf>) -> Result<()> {
        let mut entries = fs::read_dir(dir)?
            .map(|e| e.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort();
        for path in entries {
            if limit != 0 && found.len() >= limit {
                break;
            }
            if path.is_dir() {
                walk(&path, limit, found)?;
            } else if path.is_file() {
                found.push(path);
            }
        }
        Ok(())
    }

    let mut found = Vec::new();
    walk(dir, limit, &mut found)?;
    Ok(found)
}

/// Command line client session: runs requests one at a time and reports them
#[derive(Debug)]
pub struct Session {
    conn: Connection,
    /// Where files evicted by writes are saved
    pub evicted_dir: Option<PathBuf>,
    /// Where read files are saved
    pub read_dir: Option<PathBuf>,
    /// Pause after each request
    pub delay: Duration,
    /// Print a line per request on standard output
    pub verbose: bool,
    failures: usize,
}

impl Session {
    /// Start a session over `conn`
    pub fn new(conn: Connection) -> Session {
        Session {
            conn,
            evicted_dir: None,
            read_dir: None,
            delay: Duration::ZERO,
            verbose: false,
            failures: 0,
        }
    }

    /// Number of requests that failed so far
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// End the session and close the connection
    pub async fn finish(self) -> Result<usize> {
        let failures = self.failures;
        self.conn.close().await?;
        Ok(failures)
    }

    async fn report<T>(&mut self, op: &str, target: &str, outcome: &Result<T>, bytes: u64) {
        match outcome {
            Ok(_) => {
                if self.verbose {
                    println!("{} {}: OK ({} bytes)", op, target, bytes);
                }
            }
            Err(e) => {
                self.failures += 1;
                warn!("{} {} failed: {}", op, target, e);
                if self.verbose {
                    println!("{} {}: {}", op, target, e);
                }
            }
        }
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
    }

    fn save(dir: &Option<PathBuf>, files: &[FileCopy]) -> Result<()> {
        if let Some(dir) = dir {
            save_files(dir, files)?;
        }
        Ok(())
    }

    /// Send the local file `local` to the storage, under its absolute path.
    /// Creates the file, or appends to it when it already exists.
    pub async fn write_local(&mut self, local: &Path) -> Result<()> {
        let outcome = self.try_write_local(local).await;
        let bytes = *outcome.as_ref().unwrap_or(&0);
        self.report("write", &local.display().to_string(), &outcome, bytes)
            .await;
        outcome.map(|_| ())
    }

    async fn try_write_local(&mut self, local: &Path) -> Result<u64> {
        let content = fs::read(local)?;
        let name = fs::canonicalize(local)?.to_string_lossy().into_owned();
        let size = content.len() as u64;

        let written = match self
            .conn
            .open_file(&name, OpenFlags::CREATE | OpenFlags::LOCK)
            .await
        {
            Ok(()) => self.conn.write_file(&name, content).await,
            Err(ServerError::Status(ResponseCode::FileAlreadyExists)) => {
                self.conn.open_file(&name, OpenFlags::LOCK).await?;
                self.conn.append_to_file(&name, &content).await
            }
            Err(e) => return Err(e),
        };
        //the file is open and locked here, release it whatever the write did
        let released = self.release(&name).await;
        let evicted = written?;
        released?;
        Session::save(&self.evicted_dir, &evicted)?;
        Ok(size)
    }

    async fn release(&mut self, name: &str) -> Result<()> {
        let unlocked = self.conn.unlock_file(name).await;
        self.conn.close_file(name).await?;
        unlocked
    }

    /// Send at most `limit` files found under `dir` (all if `limit` is 0)
    pub async fn write_dir(&mut self, dir: &Path, limit: usize) -> Result<()> {
        let files = match list_files(dir, limit) {
            Ok(files) => files,
            Err(e) => {
                let outcome: Result<()> = Err(e);
                self.report("write", &dir.display().to_string(), &outcome, 0)
                    .await;
                return outcome;
            }
        };
        for file in files {
            let _ = self.write_local(&file).await;
        }
        Ok(())
    }

    /// Read the stored file `name`
    pub async fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let outcome = self.try_read(name).await;
        let bytes = outcome.as_ref().map(|d| d.len() as u64).unwrap_or(0);
        self.report("read", name, &outcome, bytes).await;
        outcome
    }

    async fn try_read(&mut self, name: &str) -> Result<Vec<u8>> {
        self.open_existing(name).await?;
        let data = self.conn.read_file(name).await?;
        self.conn.close_file(name).await?;
        Session::save(&self.read_dir, &[FileCopy::new(name, data.clone())])?;
        Ok(data)
    }

    /// Read up to `n` stored files, all of them if `n <= 0`
    pub async fn read_n(&mut self, n: i64) -> Result<Vec<FileCopy>> {
        let mut outcome = self.conn.read_n_files(n).await;
        if let Ok(files) = &outcome {
            if let Err(e) = Session::save(&self.read_dir, files) {
                outcome = Err(e);
            }
        }
        let bytes = outcome
            .as_ref()
            .map(|files| files.iter().map(|f| f.len()).sum::<u64>())
            .unwrap_or(0);
        self.report("readn", &n.to_string(), &outcome, bytes).await;
        outcome
    }

    /// Lock the stored file `name`, opening it first if needed
    pub async fn lock(&mut self, name: &str) -> Result<()> {
        let outcome = self.try_lock(name).await;
        self.report("lock", name, &outcome, 0).await;
        outcome
    }

    async fn try_lock(&mut self, name: &str) -> Result<()> {
        self.open_existing(name).await?;
        self.conn.lock_file(name).await
    }

    /// Unlock the stored file `name`
    pub async fn unlock(&mut self, name: &str) -> Result<()> {
        let outcome = self.conn.unlock_file(name).await;
        self.report("unlock", name, &outcome, 0).await;
        outcome
    }

    /// Remove the stored file `name`, locking it first
    pub async fn remove(&mut self, name: &str) -> Result<u64> {
        let outcome = match self.try_lock(name).await {
            Ok(()) => self.conn.remove_file(name).await,
            Err(e) => Err(e),
        };
        let bytes = *outcome.as_ref().unwrap_or(&0);
        self.report("remove", name, &outcome, bytes).await;
        outcome
    }

    //opening a file twice is not an error for the command line
    async fn open_existing(&mut self, name: &str) -> Result<()> {
        match self.conn.open_file(name, OpenFlags::NORMAL).await {
            Ok(()) | Err(ServerError::Status(ResponseCode::FileAlreadyOpen)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[path = "../../api/fs-tests/h_test.rs"]
mod tests;
