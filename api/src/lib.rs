//! The API shared by the file storage server and its clients
//!
//! This crate contains the definitions of the storage trait, the types it works with, its error taxonomy and the wire protocol spoken between clients and the server.
//! The implementation lives in the `fss_server` crate; the shared test suites in `fs-tests/` are compiled into the implementing modules there.
//!
//! Placing the modules here ensures that Cargo notices them as part of the build process.

#![deny(missing_docs)]

//Error taxonomy of the storage and of the protocol
pub mod error;

//Wire format between clients and server
pub mod protocol;

//Basic modules for types
pub mod types;

//Traits a storage implements
pub mod fs;
