use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BloomError {
    #[error("bloom filter size is non-power-of-two: {size}")]
    NotPowerOfTwo { size: usize },

    #[error("can't open/create bloom file {path} ({size} bytes): {source}")]
    Storage {
        path: String,
        size: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("bloom file {path} is {actual} bytes, expected {expected}")]
    SizeMismatch { path: String, expected: usize, actual: u64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Persist: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl BloomError {
    pub(crate) fn storage(path: Option<&Path>, size: usize, source: std::io::Error) -> Self {
        BloomError::Storage { path: display_path(path), size, source }
    }

    /// True when an exclusive create ran into an existing file.
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            BloomError::Storage { source, .. } if source.kind() == std::io::ErrorKind::AlreadyExists
        )
    }
}

pub(crate) fn display_path(path: Option<&Path>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "<anonymous>".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, BloomError>;
