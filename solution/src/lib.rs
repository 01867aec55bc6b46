//! Concurrent in-memory file storage server
//!
//! # This crate
//!
//! This crate implements the storage described by the `StorageSupport` trait of the `fss_api` crate, and serves it to clients over a UNIX socket.
//! The storage keeps a bounded number of files, holding a bounded number of bytes, entirely in memory.
//! When a write would cross either bound, the oldest files are evicted and sent back to the writer.
//!
//! The modules are layered, each one building on the previous ones:
//!
//! 1. [`a_ordered_list`]: the ordered container used for the eviction order, the openers of a file and the waiting lock requests.
//! 2. [`b_file_record`]: a single stored file and its per-file rules.
//! 3. [`c_storage`]: the storage engine, its locking and its eviction.
//! 4. [`d_waiting_locks`]: the ledger of lock requests waiting for a file.
//! 5. [`e_config`]: the server configuration file.
//! 6. [`f_worker`]: serving one client connection.
//! 7. [`g_server`]: the listening server, its worker threads and its shutdown.
//! 8. [`h_client`]: the client side of the protocol, used by the `fss-client` binary.
//!
//! Errors of the last four layers are gathered in [`error_fs`].
//!
//! The tests of every module live in `api/fs-tests/` and are compiled into the module they test.
//!
//! The next thing to look at is the [`a_ordered_list` module](a_ordered_list/index.html).

// This line forces you to write documentation for all important things.
#![deny(missing_docs)]

// Storage
pub mod a_ordered_list;
pub mod b_file_record;
pub mod c_storage;
pub mod d_waiting_locks;

// Server and client
pub mod e_config;
pub mod f_worker;
pub mod g_server;
pub mod h_client;

pub mod error_fs;
