use super::{list_files, local_path, save_files, Connection, Session};
use crate::e_config::ServerConfig;
use crate::error_fs::ServerError;
use crate::f_worker::Shutdown;
use crate::g_server::Server;
use fss_api::protocol::ResponseCode;
use fss_api::types::{FileCopy, OpenFlags, ReplacementPolicy, StorageStats};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::{self, JoinHandle};
use tokio::time::{self, Instant};

#[path = "utils.rs"]
mod utils;

type Serving = JoinHandle<crate::error_fs::Result<StorageStats>>;

fn start(dir: &TempDir, files: u64, bytes: u64) -> (Shutdown, Serving) {
    let config = ServerConfig {
        socket_name: utils::socket_path(dir),
        storage_capacity: bytes,
        file_limit: files,
        n_workers: 2,
        policy: ReplacementPolicy::Fifo,
        log_file: None,
    };
    let server = Server::new(config).unwrap();
    (server.shutdown_handle(), task::spawn(server.serve()))
}

async fn connect(socket: &Path, user: &str) -> Connection {
    let deadline = Instant::now() + Duration::from_secs(5);
    Connection::open(socket, Duration::from_millis(10), deadline, user)
        .await
        .unwrap()
}

async fn stop(shutdown: Shutdown, serving: Serving) -> StorageStats {
    shutdown.soft();
    serving.await.unwrap().unwrap()
}

#[test]
fn names_stay_inside_the_directory() {
    let dir = Path::new("/save");
    assert_eq!(
        local_path(dir, "/tmp/a/b.txt").unwrap(),
        PathBuf::from("/save/tmp/a/b.txt")
    );
    assert_eq!(
        local_path(dir, "../../etc/passwd").unwrap(),
        PathBuf::from("/save/etc/passwd")
    );
    assert_eq!(local_path(dir, "./x").unwrap(), PathBuf::from("/save/x"));
    assert!(matches!(
        local_path(dir, "/../.."),
        Err(ServerError::Input(_))
    ));
}

#[test]
fn save_and_list() {
    let dir = utils::scratch_dir();
    let files = vec![
        FileCopy::new("/b/two", b"2".to_vec()),
        FileCopy::new("/a/one", b"1".to_vec()),
        FileCopy::new("/three", b"3".to_vec()),
    ];
    let saved = save_files(dir.path(), &files).unwrap();
    assert_eq!(fs::read(&saved[0]).unwrap(), b"2");

    let all = list_files(dir.path(), 0).unwrap();
    assert_eq!(
        all,
        vec![
            dir.path().join("a/one"),
            dir.path().join("b/two"),
            dir.path().join("three")
        ]
    );
    assert_eq!(list_files(dir.path(), 2).unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connection_operations() {
    let dir = utils::scratch_dir();
    let (shutdown, serving) = start(&dir, 4, 100);
    let mut conn = connect(&utils::socket_path(&dir), "alice").await;
    assert_eq!(conn.username(), "alice");

    conn.open_file("/f", OpenFlags::CREATE | OpenFlags::LOCK)
        .await
        .unwrap();
    assert!(conn.write_file("/f", b"abc".to_vec()).await.unwrap().is_empty());
    conn.append_to_file("/f", b"def").await.unwrap();
    assert_eq!(conn.read_file("/f").await.unwrap(), b"abcdef");
    assert_eq!(conn.read_n_files(0).await.unwrap().len(), 1);
    conn.unlock_file("/f").await.unwrap();
    conn.lock_file("/f").await.unwrap();

    assert!(matches!(
        conn.read_file("/missing").await,
        Err(ServerError::Status(ResponseCode::FileNotFound))
    ));
    assert!(matches!(
        conn.write_file("/f", b"x".to_vec()).await,
        Err(ServerError::Status(ResponseCode::FileAlreadyWritten))
    ));

    assert_eq!(conn.remove_file("/f").await.unwrap(), 6);
    conn.close().await.unwrap();

    let stats = stop(shutdown, serving).await;
    assert_eq!(stats.files_count, 0);
    assert_eq!(stats.max_bytes_seen, 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connect_retries_until_deadline() {
    let dir = utils::scratch_dir();
    let socket = utils::socket_path(&dir);

    //nobody listening
    let deadline = Instant::now() + Duration::from_millis(50);
    let failed = Connection::open(&socket, Duration::from_millis(10), deadline, "u").await;
    assert!(matches!(failed, Err(ServerError::ServerIO(_))));

    //the server shows up while the client retries
    let waiting = {
        let socket = socket.clone();
        task::spawn(async move { connect(&socket, "u").await })
    };
    time::sleep(Duration::from_millis(100)).await;
    let (shutdown, serving) = start(&dir, 4, 100);
    waiting.await.unwrap().close().await.unwrap();
    stop(shutdown, serving).await;

    assert!(matches!(
        Connection::open(&socket, Duration::from_millis(10), Instant::now(), "").await,
        Err(ServerError::Storage(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn session_writes_and_saves_evictions() {
    let dir = utils::scratch_dir();
    let local = utils::scratch_dir();
    let evicted = utils::scratch_dir();
    let (shutdown, serving) = start(&dir, 1, 100);

    fs::write(local.path().join("first"), b"first").unwrap();
    fs::write(local.path().join("second"), b"second").unwrap();
    let first_name = fs::canonicalize(local.path().join("first")).unwrap();

    let mut session = Session::new(connect(&utils::socket_path(&dir), "w").await);
    session.evicted_dir = Some(evicted.path().to_path_buf());
    session.write_dir(local.path(), 0).await.unwrap();
    assert_eq!(session.failures(), 0);

    //first was pushed out by second and saved locally
    let saved = local_path(evicted.path(), &first_name.to_string_lossy()).unwrap();
    assert_eq!(fs::read(saved).unwrap(), b"first");

    //writing again appends
    session
        .write_local(&local.path().join("second"))
        .await
        .unwrap();
    let second_name = fs::canonicalize(local.path().join("second")).unwrap();
    let read = session.read(&second_name.to_string_lossy()).await.unwrap();
    assert_eq!(read, b"secondsecond");
    assert_eq!(session.finish().await.unwrap(), 0);

    let stats = stop(shutdown, serving).await;
    assert_eq!(stats.eviction_count, 1);
    assert_eq!(stats.bytes_used, 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn session_lock_read_remove() {
    let dir = utils::scratch_dir();
    let reads = utils::scratch_dir();
    let (shutdown, serving) = start(&dir, 4, 100);
    let socket = utils::socket_path(&dir);

    let mut writer = connect(&socket, "writer").await;
    writer.open_file("/doc", OpenFlags::CREATE | OpenFlags::LOCK).await.unwrap();
    writer.write_file("/doc", b"text".to_vec()).await.unwrap();
    writer.unlock_file("/doc").await.unwrap();
    writer.close().await.unwrap();

    let mut session = Session::new(connect(&socket, "reader").await);
    session.read_dir = Some(reads.path().to_path_buf());
    assert_eq!(session.read_n(0).await.unwrap().len(), 1);
    assert_eq!(fs::read(reads.path().join("doc")).unwrap(), b"text");

    session.lock("/doc").await.unwrap();
    session.unlock("/doc").await.unwrap();
    assert_eq!(session.remove("/doc").await.unwrap(), 4);
    assert!(session.read("/doc").await.is_err());
    assert_eq!(session.failures(), 1);
    assert_eq!(session.finish().await.unwrap(), 1);

    stop(shutdown, serving).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_write_releases_the_file() {
    let dir = utils::scratch_dir();
    let local = utils::scratch_dir();
    let (shutdown, serving) = start(&dir, 4, 4);
    let socket = utils::socket_path(&dir);

    let big = local.path().join("big");
    fs::write(&big, utils::filled(10, b'x')).unwrap();
    let name = fs::canonicalize(&big).unwrap().to_string_lossy().into_owned();

    let mut session = Session::new(connect(&socket, "w").await);
    let too_big = |r: &crate::error_fs::Result<()>| {
        matches!(r, Err(ServerError::Status(ResponseCode::FileTooBig)))
    };
    assert!(too_big(&session.write_local(&big).await));
    //the retry goes through open and append again instead of finding the file held
    assert!(too_big(&session.write_local(&big).await));

    //the empty file is neither locked nor open by the writer any more
    let mut other = connect(&socket, "other").await;
    other.open_file(&name, OpenFlags::NORMAL).await.unwrap();
    other.lock_file(&name).await.unwrap();
    other.close().await.unwrap();

    //a directory that cannot be listed counts as a failed request
    assert!(session
        .write_dir(&local.path().join("missing"), 0)
        .await
        .is_err());
    assert_eq!(session.finish().await.unwrap(), 3);

    let stats = stop(shutdown, serving).await;
    assert_eq!(stats.files_count, 0);
    assert_eq!(stats.bytes_used, 0);
}
