//! Connection worker
//!
//! A [`Worker`] serves one client connection at a time: it reads a request frame, runs the matching storage operation and writes the reply, until the client disconnects or the server shuts down.
//! The server runs one worker task per connection on a fixed-size runtime.
//!
//! # Lock requests
//!
//! A `lock` on a file held by another client does not fail: the worker parks a [`Wakeup`] in the storage and awaits it.
//! Whoever releases the file (an `unlock`, a `remove` or an eviction) gets the parked wakeups back from the storage and fires them; the woken worker then retries the lock, and may park again if another client got there first.
//! A wakeup whose worker is gone (its client disconnected) cannot be delivered; the next one parked on the same file is tried instead.
//!
//! Once the server starts shutting down, parked requests stop waiting and are answered with `SERVICE_UNAVAILABLE`.
//!
//! # Fatal errors
//!
//! A storage error for which `is_fatal` holds is answered with `INTERNAL_ERROR` and brings the whole server down through [`Shutdown::fail`].

use super::error_fs::Result;
use fss_api::error::{ProtocolError, StorageError};
use fss_api::fs::StorageSupport;
use fss_api::protocol::{
    read_request, write_response, Payload, Request, RequestCode, RequestFrame, Response,
    ResponseCode,
};
use fss_api::types::{LockAttempt, OpenFlags};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Continuation parked for a lock request: firing it makes the waiting worker retry
pub type Wakeup = oneshot::Sender<()>;

/// Shutdown state shared by the server and all of its workers
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    stopping: CancellationToken,
    hard: CancellationToken,
    fatal: Arc<AtomicBool>,
}

impl Shutdown {
    /// Fresh state, nothing requested yet
    pub fn new() -> Shutdown {
        Shutdown::default()
    }

    /// Stop accepting connections, but let the connected clients finish
    pub fn soft(&self) {
        self.stopping.cancel();
    }

    /// Stop accepting connections and drop the connected clients
    pub fn hard(&self) {
        self.stopping.cancel();
        self.hard.cancel();
    }

    /// Stop everything after an unrecoverable storage error
    pub fn fail(&self) {
        self.fatal.store(true, Ordering::SeqCst);
        self.hard();
    }

    /// Whether any kind of shutdown was requested
    pub fn is_stopping(&self) -> bool {
        self.stopping.is_cancelled()
    }

    /// Whether connections have to be dropped
    pub fn is_hard(&self) -> bool {
        self.hard.is_cancelled()
    }

    /// Whether the shutdown was caused by a fatal error
    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }

    /// Resolves once any kind of shutdown is requested
    pub async fn stopping(&self) {
        self.stopping.cancelled().await
    }

    /// Resolves once connections have to be dropped
    pub async fn stopped_hard(&self) {
        self.hard.cancelled().await
    }
}

/// Serves client connections against a shared storage
#[derive(Debug)]
pub struct Worker<S> {
    storage: Arc<S>,
    shutdown: Shutdown,
}

impl<S> Clone for Worker<S> {
    fn clone(&self) -> Self {
        Worker {
            storage: Arc::clone(&self.storage),
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Bytes moved by a request, for the operation log
fn bytes_moved(request_bytes: u64, payload: &Payload) -> u64 {
    match payload {
        Payload::Data(data) => data.len() as u64,
        Payload::Files(files) if request_bytes == 0 => files.iter().map(|f| f.len()).sum(),
        Payload::Freed(freed) => *freed,
        _ => request_bytes,
    }
}

impl<S> Worker<S>
where
    S: StorageSupport<Waiter = Wakeup> + Send + Sync + 'static,
{
    /// Create a worker over `storage`
    pub fn new(storage: Arc<S>, shutdown: Shutdown) -> Worker<S> {
        Worker { storage, shutdown }
    }

    /// Serve requests arriving on `stream` until the client disconnects or the server stops hard.
    /// `conn` only identifies the connection in the log.
    pub async fn serve<T>(&self, mut stream: T, conn: u64) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        debug!("connection {} accepted", conn);
        loop {
            let read = tokio::select! {
                _ = self.shutdown.stopped_hard() => {
                    debug!("connection {} dropped by shutdown", conn);
                    return Ok(());
                }
                read = read_request(&mut stream) => read,
            };
            let frame = match read {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("connection {} closed by the client", conn);
                    return Ok(());
                }
                //the whole frame was consumed, so the stream is still in sync
                Err(e @ ProtocolError::UnknownCode(_))
                | Err(e @ ProtocolError::CodeMismatch(_))
                | Err(e @ ProtocolError::ProtocolSerialize(_)) => {
                    warn!("connection {}: malformed request: {}", conn, e);
                    write_response(&mut stream, &Response::status(ResponseCode::InvalidArgument))
                        .await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let (response, disconnect) = self.handle(frame).await;
            write_response(&mut stream, &response).await?;
            if disconnect {
                debug!("connection {} disconnected", conn);
                return Ok(());
            }
        }
    }

    /// Run one request and build its reply.
    /// The flag is set when the client asked to disconnect.
    pub async fn handle(&self, frame: RequestFrame) -> (Response, bool) {
        let RequestFrame { client, request } = frame;
        let code = request.code();
        let path = request.path().unwrap_or("-").to_string();
        let request_bytes = match &request {
            Request::Write { content, .. } => content.len() as u64,
            Request::Append { data, .. } => data.len() as u64,
            _ => 0,
        };

        let response = match request {
            Request::Lock { path } => self.lock(&path, &client).await,
            Request::Disconnect => Response::status(RequestCode::Disconnect.success()),
            request => {
                let outcome = self.run(request, &client);
                self.respond(code, outcome)
            }
        };

        let evicted = match (&response.payload, code) {
            (Payload::Files(files), RequestCode::Write | RequestCode::Append) => files.len(),
            _ => 0,
        };
        info!(
            "client={} op={} path={} status={} bytes={} evicted={}",
            client,
            code.name(),
            path,
            response.status as u16,
            bytes_moved(request_bytes, &response.payload),
            evicted
        );
        (response, code == RequestCode::Disconnect)
    }

    /// Requests that complete without waiting
    fn run(&self, request: Request, client: &str) -> std::result::Result<Payload, StorageError> {
        let storage = &self.storage;
        match request {
            Request::Open { path, flags } => {
                storage.open(&path, OpenFlags::from_wire(flags)?, client)?;
                Ok(Payload::Empty)
            }
            Request::Read { path } => storage.read(&path, client).map(Payload::Data),
            Request::ReadN { n } => storage.read_n(n, client).map(Payload::Files),
            Request::Write { path, content } => {
                let evicted = storage.write(&path, content, client)?;
                wake_all(evicted.waiters);
                Ok(Payload::Files(evicted.files))
            }
            Request::Append { path, data } => {
                let evicted = storage.append(&path, &data, client)?;
                wake_all(evicted.waiters);
                Ok(Payload::Files(evicted.files))
            }
            Request::Unlock { path } => {
                let next = storage.unlock(&path, client)?;
                self.hand_over(&path, next)?;
                Ok(Payload::Empty)
            }
            Request::Close { path } => {
                storage.close(&path, client)?;
                Ok(Payload::Empty)
            }
            Request::Remove { path } => {
                let removed = storage.remove(&path, client)?;
                wake_all(removed.waiters);
                Ok(Payload::Freed(removed.freed))
            }
            Request::Lock { .. } | Request::Disconnect => {
                Err(StorageError::InvalidArgument("request cannot run synchronously"))
            }
        }
    }

    /// Take the lock, waiting for as long as another client holds it
    async fn lock(&self, path: &str, client: &str) -> Response {
        loop {
            let (wakeup, woken) = oneshot::channel();
            match self.storage.lock_or_wait(path, client, wakeup) {
                Ok(LockAttempt::Acquired) => {
                    return self.respond(RequestCode::Lock, Ok(Payload::Empty))
                }
                Ok(LockAttempt::Parked) => {
                    debug!("{} waits for the lock on {}", client, path);
                    let proceed = tokio::select! {
                        received = woken => received.is_ok(),
                        _ = self.shutdown.stopping() => false,
                    };
                    if !proceed {
                        return Response::status(ResponseCode::ServiceUnavailable);
                    }
                }
                Err(e) => return self.respond(RequestCode::Lock, Err(e)),
            }
        }
    }

    /// Pass a released lock on to the oldest waiter that is still around
    fn hand_over(&self, path: &str, mut next: Option<Wakeup>) -> std::result::Result<(), StorageError> {
        while let Some(wakeup) = next {
            if wakeup.send(()).is_ok() {
                return Ok(());
            }
            next = self.storage.next_waiter(path)?;
        }
        Ok(())
    }

    fn respond(&self, code: RequestCode, outcome: std::result::Result<Payload, StorageError>) -> Response {
        match outcome {
            Ok(payload) => Response::with_payload(code.success(), payload),
            Err(e) => {
                if e.is_fatal() {
                    error!("{} failed fatally: {}", code.name(), e);
                    self.shutdown.fail();
                }
                Response::status(e.status())
            }
        }
    }
}

/// Wake every waiter of a file that disappeared; they will find it gone
fn wake_all(wakeups: Vec<Wakeup>) {
    for wakeup in wakeups {
        let _ = wakeup.send(());
    }
}

#[cfg(test)]
#[path = "../../api/fs-tests/f_test.rs"]
mod tests;
