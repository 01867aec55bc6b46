use super::Server;
use crate::e_config::ServerConfig;
use crate::error_fs::ServerError;
use fss_api::error::StorageError;
use fss_api::fs::StorageSupport;
use fss_api::protocol::{
    read_response, write_request, Payload, Request, RequestFrame, Response, ResponseCode,
};
use fss_api::types::{OpenFlags, ReplacementPolicy};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::UnixStream;
use tokio::{task, time};

#[path = "utils.rs"]
mod utils;

fn config(dir: &TempDir, files: u64, bytes: u64) -> ServerConfig {
    ServerConfig {
        socket_name: utils::socket_path(dir),
        storage_capacity: bytes,
        file_limit: files,
        n_workers: 2,
        policy: ReplacementPolicy::Fifo,
        log_file: None,
    }
}

async fn connect(path: &Path) -> UnixStream {
    loop {
        match UnixStream::connect(path).await {
            Ok(stream) => return stream,
            Err(_) => time::sleep(Duration::from_millis(10)).await,
        }
    }
}

async fn send(stream: &mut UnixStream, client: &str, request: Request) {
    let frame = RequestFrame {
        client: client.to_string(),
        request,
    };
    write_request(stream, &frame).await.unwrap();
}

async fn call(stream: &mut UnixStream, client: &str, request: Request) -> Response {
    send(stream, client, request).await;
    read_response(stream).await.unwrap().unwrap()
}

fn open(path: &str, flags: OpenFlags) -> Request {
    Request::Open {
        path: path.to_string(),
        flags: flags.bits(),
    }
}

fn lock(path: &str) -> Request {
    Request::Lock {
        path: path.to_string(),
    }
}

fn unlock(path: &str) -> Request {
    Request::Unlock {
        path: path.to_string(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serve_until_soft_shutdown() {
    let dir = utils::scratch_dir();
    let socket = utils::socket_path(&dir);
    std::fs::write(&socket, b"stale").unwrap(); //left over by a previous run

    let server = Server::new(config(&dir, 4, 100)).unwrap();
    let shutdown = server.shutdown_handle();
    let serving = task::spawn(server.serve());

    let mut c = connect(&socket).await;
    assert_eq!(
        call(&mut c, "u", open("/f", OpenFlags::CREATE | OpenFlags::LOCK))
            .await
            .status,
        ResponseCode::OpenFileSuccess
    );
    let write = Request::Write {
        path: "/f".to_string(),
        content: b"payload".to_vec(),
    };
    assert_eq!(
        call(&mut c, "u", write).await.status,
        ResponseCode::WriteFileSuccess
    );

    //connected clients are still served after SIGHUP-like shutdown
    shutdown.soft();
    let read = call(&mut c, "u", Request::Read { path: "/f".to_string() }).await;
    assert_eq!(read.payload, Payload::Data(b"payload".to_vec()));
    assert_eq!(
        call(&mut c, "u", Request::Disconnect).await.status,
        ResponseCode::CloseConnSuccess
    );

    let stats = serving.await.unwrap().unwrap();
    assert_eq!(stats.files_count, 1);
    assert_eq!(stats.bytes_used, 7);
    assert_eq!(stats.ledger, vec!["/f"]);
    assert!(!socket.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hard_shutdown_drops_clients() {
    let dir = utils::scratch_dir();
    let server = Server::new(config(&dir, 4, 100)).unwrap();
    let shutdown = server.shutdown_handle();
    let serving = task::spawn(server.serve());

    let mut c = connect(&utils::socket_path(&dir)).await;
    assert_eq!(
        call(&mut c, "u", Request::ReadN { n: 0 }).await.status,
        ResponseCode::StorageEmpty
    );
    shutdown.hard();
    serving.await.unwrap().unwrap();
    assert!(read_response(&mut c).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lock_handoff_between_clients() {
    let dir = utils::scratch_dir();
    let socket = utils::socket_path(&dir);
    let server = Server::new(config(&dir, 4, 100)).unwrap();
    let storage = server.storage();
    let shutdown = server.shutdown_handle();
    let serving = task::spawn(server.serve());

    let mut a = connect(&socket).await;
    let mut b = connect(&socket).await;
    call(&mut a, "a", open("/f", OpenFlags::CREATE)).await;
    call(&mut b, "b", open("/f", OpenFlags::NORMAL)).await;
    assert_eq!(
        call(&mut a, "a", lock("/f")).await.status,
        ResponseCode::LockFileSuccess
    );

    send(&mut b, "b", lock("/f")).await;
    let waiting = task::spawn(async move {
        let response = read_response(&mut b).await.unwrap().unwrap();
        (b, response.status)
    });
    while storage.waiting_on("/f").unwrap() == 0 {
        time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(
        call(&mut a, "a", unlock("/f")).await.status,
        ResponseCode::UnlockFileSuccess
    );
    let (mut b, status) = waiting.await.unwrap();
    assert_eq!(status, ResponseCode::LockFileSuccess);

    call(&mut a, "a", Request::Disconnect).await;
    call(&mut b, "b", Request::Disconnect).await;
    shutdown.soft();
    serving.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_answers_waiting_locks() {
    let dir = utils::scratch_dir();
    let socket = utils::socket_path(&dir);
    let server = Server::new(config(&dir, 4, 100)).unwrap();
    let storage = server.storage();
    let shutdown = server.shutdown_handle();
    let serving = task::spawn(server.serve());

    let mut a = connect(&socket).await;
    let mut b = connect(&socket).await;
    call(&mut a, "a", open("/f", OpenFlags::CREATE)).await;
    call(&mut b, "b", open("/f", OpenFlags::NORMAL)).await;
    call(&mut a, "a", lock("/f")).await;
    send(&mut b, "b", lock("/f")).await;
    while storage.waiting_on("/f").unwrap() == 0 {
        time::sleep(Duration::from_millis(5)).await;
    }

    shutdown.hard();
    let response = read_response(&mut b).await.unwrap().unwrap();
    assert_eq!(response.status, ResponseCode::ServiceUnavailable);
    serving.await.unwrap().unwrap();
    //drained by the server on its way out
    assert!(storage.drain_waiters().unwrap().is_empty());
}

#[test]
fn invalid_limits_are_refused() {
    let dir = utils::scratch_dir();
    let err = Server::new(config(&dir, 0, 100)).unwrap_err();
    assert!(matches!(
        err,
        ServerError::Storage(StorageError::InvalidArgument(_))
    ));
}
