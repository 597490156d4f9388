//! Error types for the graph splitter

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SplitError>;

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error on {path}: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record {index} in `{section}` is missing required field `{field}`")]
    MissingField {
        section: &'static str,
        index: u64,
        field: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Membership store error: {0}")]
    Membership(String),

    #[error("Shard {shard} worker failed: {source}")]
    ShardWorker {
        shard: usize,
        #[source]
        source: Box<SplitError>,
    },

    #[error("Parser thread panicked while streaming {0}")]
    ReaderPanicked(String),

    #[error("Worker pool error: {0}")]
    Pool(String),
}

impl SplitError {
    /// Attach a path to a bare I/O error.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SplitError::IoAt {
            path: path.into(),
            source,
        }
    }

    /// True for errors caused by the input document rather than the host.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            SplitError::Json(_) | SplitError::MissingField { .. }
        )
    }
}
