use super::{ServerConfig, MAX_SOCKET_NAME};
use crate::error_fs::ConfigError;
use fss_api::types::ReplacementPolicy;
use std::fs;
use std::path::PathBuf;

#[path = "utils.rs"]
mod utils;

static GOOD: &str = "
# storage server
SOCKET_NAME=/tmp/fss.sk
STORAGE_CAPACITY = 1048576
FILE_LIMIT=100
N_WORKERS=4
";

#[test]
fn parse_good() {
    let config: ServerConfig = GOOD.parse().unwrap();
    assert_eq!(config.socket_name, PathBuf::from("/tmp/fss.sk"));
    assert_eq!(config.storage_capacity, 1048576);
    assert_eq!(config.file_limit, 100);
    assert_eq!(config.n_workers, 4);
    assert_eq!(config.policy, ReplacementPolicy::Fifo); //default
    assert_eq!(config.log_file, None);

    let limits = config.limits();
    assert_eq!(limits.files, 100);
    assert_eq!(limits.bytes, 1048576);
}

#[test]
fn optional_keys() {
    let text = format!("{}REPLACEMENT_POLICY=fifo\nLOG_FILE=/tmp/fss.log\n", GOOD);
    let config: ServerConfig = text.parse().unwrap();
    assert_eq!(config.policy, ReplacementPolicy::Fifo);
    assert_eq!(config.log_file, Some(PathBuf::from("/tmp/fss.log")));

    //last one wins
    let config: ServerConfig = format!("{}N_WORKERS=9\n", GOOD).parse().unwrap();
    assert_eq!(config.n_workers, 9);
}

#[test]
fn error_cases() {
    let with = |extra: &str| format!("{}{}\n", GOOD, extra).parse::<ServerConfig>();

    assert!(matches!(
        with("FILE_LIMIT=0"),
        Err(ConfigError::InvalidNumber("FILE_LIMIT"))
    ));
    assert!(matches!(
        with("STORAGE_CAPACITY=-5"),
        Err(ConfigError::InvalidNumber("STORAGE_CAPACITY"))
    ));
    assert!(matches!(
        with("N_WORKERS=four"),
        Err(ConfigError::InvalidNumber("N_WORKERS"))
    ));
    assert!(matches!(with("N_WORKERS="), Err(ConfigError::MissingValue(k)) if k == "N_WORKERS"));
    assert!(matches!(with("SOCKET_NAME"), Err(ConfigError::MissingValue(k)) if k == "SOCKET_NAME"));
    assert!(matches!(with("CACHE=1"), Err(ConfigError::UnknownKey(k)) if k == "CACHE"));
    assert!(matches!(
        with("REPLACEMENT_POLICY=LRU"),
        Err(ConfigError::UnsupportedPolicy(p)) if p == "LRU"
    ));

    let long = format!("SOCKET_NAME=/{}", "s".repeat(MAX_SOCKET_NAME));
    assert!(matches!(with(&long), Err(ConfigError::SocketNameTooLong)));

    assert!(matches!(
        "SOCKET_NAME=/tmp/x.sk\nFILE_LIMIT=1\nN_WORKERS=1".parse::<ServerConfig>(),
        Err(ConfigError::MissingKey("STORAGE_CAPACITY"))
    ));
}

#[test]
fn load_from_file() {
    let dir = utils::scratch_dir();
    let path = dir.path().join("config.txt");
    fs::write(&path, GOOD).unwrap();
    let config = ServerConfig::load(&path).unwrap();
    assert_eq!(config.n_workers, 4);

    assert!(matches!(
        ServerConfig::load(&dir.path().join("missing.txt")),
        Err(ConfigError::ConfigIO(_))
    ));
}
