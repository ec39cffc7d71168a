use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Corrupt manifest: {0}")]
    ManifestCorrupt(String),
    #[error("Integrity mismatch for game {game_id}: {} file(s) failed verification", .files.len())]
    IntegrityMismatch { game_id: i64, files: Vec<String> },
    #[error("Install already in progress for game {0}")]
    ConcurrentStart(i64),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LauncherError>;
