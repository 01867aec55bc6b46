//! Server
//!
//! Listens on a UNIX socket and hands every accepted connection to a [`Worker`] task.
//! [`Server::run`] builds a multi-threaded tokio runtime with exactly `N_WORKERS` threads, which bounds how many requests are processed in parallel; [`Server::serve`] runs on whatever runtime its caller provides.
//!
//! # Signals
//!
//! * `SIGINT` and `SIGQUIT`: stop accepting connections and drop the connected clients.
//! * `SIGHUP`: stop accepting connections and wait for the connected clients to disconnect.
//!   A later `SIGINT` or `SIGQUIT` still escalates to the first mode.
//!
//! In both modes the lock requests still waiting are answered with `SERVICE_UNAVAILABLE`, the socket file is removed and the storage statistics are logged.
//! A fatal storage error stops the server the same way as `SIGINT`, after which [`Server::serve`] reports [`ServerError::Fatal`].

use super::c_storage::FileStorage;
use super::e_config::ServerConfig;
use super::error_fs::{Result, ServerError};
use super::f_worker::{Shutdown, Wakeup, Worker};
use fss_api::fs::StorageSupport;
use fss_api::types::StorageStats;
use log::{debug, error, info, warn};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::runtime::Builder;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinSet;

/// Storage served by the server
pub type ServerStorage = FileStorage<Wakeup>;

/// A configured server, ready to serve
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    storage: Arc<ServerStorage>,
    shutdown: Shutdown,
}

fn remove_socket(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Turn the termination signals into shutdown requests, until the server stops hard
async fn watch_signals(shutdown: Shutdown) -> io::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut hangup = signal(SignalKind::hangup())?;
    loop {
        tokio::select! {
            _ = interrupt.recv() => {
                info!("SIGINT received, stopping now");
                shutdown.hard();
            }
            _ = quit.recv() => {
                info!("SIGQUIT received, stopping now");
                shutdown.hard();
            }
            _ = hangup.recv() => {
                info!("SIGHUP received, waiting for the connected clients");
                shutdown.soft();
            }
            _ = shutdown.stopped_hard() => return Ok(()),
        }
    }
}

impl Server {
    /// Create the storage described by `config`
    pub fn new(config: ServerConfig) -> Result<Server> {
        let storage = FileStorage::with_limits(config.limits())?;
        Ok(Server {
            config,
            storage: Arc::new(storage),
            shutdown: Shutdown::new(),
        })
    }

    /// Handle to stop the server from elsewhere
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// The storage behind the server
    pub fn storage(&self) -> Arc<ServerStorage> {
        Arc::clone(&self.storage)
    }

    /// Serve on a fresh runtime of `N_WORKERS` threads until shutdown
    pub fn run(self) -> Result<StorageStats> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(self.config.n_workers)
            .thread_name("fss-worker")
            .enable_all()
            .build()?;
        runtime.block_on(self.serve())
    }

    /// Accept and serve connections until shutdown, then return the final statistics
    pub async fn serve(self) -> Result<StorageStats> {
        let socket = self.config.socket_name.clone();
        remove_socket(&socket)?;
        let listener = UnixListener::bind(&socket)?;
        info!(
            "listening on {} ({} files, {} bytes, {} policy, {} workers)",
            socket.display(),
            self.config.file_limit,
            self.config.storage_capacity,
            self.config.policy,
            self.config.n_workers
        );

        let signals = tokio::spawn(watch_signals(self.shutdown.clone()));
        let worker = Worker::new(Arc::clone(&self.storage), self.shutdown.clone());
        let mut connections = JoinSet::new();
        let mut next_conn = 0u64;

        loop {
            tokio::select! {
                _ = self.shutdown.stopping() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        next_conn += 1;
                        let conn = next_conn;
                        let worker = worker.clone();
                        connections.spawn(async move {
                            if let Err(e) = worker.serve(stream, conn).await {
                                warn!("connection {} failed: {}", conn, e);
                            }
                        });
                    }
                    Err(e) => warn!("accept failed: {}", e),
                },
                Some(done) = connections.join_next() => {
                    if let Err(e) = done {
                        error!("connection task failed: {}", e);
                    }
                }
            }
        }

        drop(listener);
        if let Err(e) = remove_socket(&socket) {
            warn!("cannot remove {}: {}", socket.display(), e);
        }
        if !self.shutdown.is_hard() {
            info!("waiting for {} connected clients", connections.len());
        }
        while let Some(done) = connections.join_next().await {
            if let Err(e) = done {
                error!("connection task failed: {}", e);
            }
        }
        signals.abort();

        //dropping the wakeups answers whoever still waits
        let pending = self.storage.drain_waiters()?;
        for (path, _) in &pending {
            debug!("lock request on {} left waiting", path);
        }

        let stats = self.storage.stats()?;
        info!("storage statistics at shutdown\n{}", stats);
        if self.shutdown.is_fatal() {
            return Err(ServerError::Fatal);
        }
        Ok(stats)
    }
}

#[cfg(test)]
#[path = "../../api/fs-tests/g_test.rs"]
mod tests;
