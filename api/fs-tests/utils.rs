#![allow(dead_code)]

//Some more general testing utilities
use fss_api::fs::StorageSupport;
use fss_api::types::{FileCopy, OpenFlags, StorageLimits};
use std::path::PathBuf;
use tempfile::TempDir;

//Create a fresh storage with the given ceilings
pub fn storage_setup<S: StorageSupport>(files: u64, bytes: u64) -> S {
    S::with_limits(StorageLimits::new(files, bytes)).unwrap()
}

//Create `name` on behalf of `client`, locked, and write `content` into it
//The lock stays with `client`; returns the files evicted by the write
pub fn put<S: StorageSupport>(fs: &S, name: &str, client: &str, content: &[u8]) -> Vec<FileCopy> {
    fs.open(name, OpenFlags::CREATE | OpenFlags::LOCK, client)
        .unwrap();
    fs.write(name, content.to_vec(), client).unwrap().files
}

//Same as put, but leave the file unlocked afterwards
pub fn put_unlocked<S: StorageSupport>(
    fs: &S,
    name: &str,
    client: &str,
    content: &[u8],
) -> Vec<FileCopy> {
    let evicted = put(fs, name, client, content);
    assert!(fs.unlock(name, client).unwrap().is_none());
    evicted
}

//Names of the given copies, in order
pub fn names(copies: &[FileCopy]) -> Vec<String> {
    copies.iter().map(|c| c.name.clone()).collect()
}

//A buffer of n bytes, all equal to b
pub fn filled(n: usize, b: u8) -> Vec<u8> {
    vec![b; n]
}

//Fresh directory to place sockets and saved files in; removed when dropped
pub fn scratch_dir() -> TempDir {
    tempfile::tempdir().unwrap()
}

//Socket path inside a scratch directory
pub fn socket_path(dir: &TempDir) -> PathBuf {
    dir.path().join("fss.sk")
}
