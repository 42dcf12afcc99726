//! Engine-wide error type.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("media root {path:?} is not a readable directory: {reason}")]
    MediaRoot { path: PathBuf, reason: String },

    #[error("cache record at offset {offset} is malformed: {reason}")]
    MalformedRecord { offset: u64, reason: String },

    #[error("no cached record for uri {0}")]
    NotCached(String),

    #[error("playlist cycle: {0:?} already contains the target playlist")]
    PlaylistCycle(String),

    #[error("index {index} out of bounds (len {len})")]
    OutOfBounds { index: usize, len: usize },

    #[error("decoder error for {uri}: {reason}")]
    Decoder { uri: String, reason: String },

    #[error("scan worker panicked")]
    ScanPanicked,
}

pub type Result<T> = std::result::Result<T, EngineError>;
