use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or unusable provider credentials / settings. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Embedding call failed (transport, auth, rate limit, malformed body).
    #[error("embedding provider error: {0}")]
    Provider(String),

    /// Generation call failed.
    #[error("generation error: {0}")]
    Generation(String),

    #[error("dimension mismatch: index holds {expected}-d vectors, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("invalid mode '{0}': expected 'rag' or 'generate'")]
    InvalidMode(String),

    #[error("invalid k = {0}: at least one result must be requested")]
    InvalidTopK(usize),

    #[error("failed to load vector index {path}: {reason}")]
    IndexLoad { path: String, reason: String },

    #[error("record store error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A thread panicked while holding the named lock.
    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// A blocking worker task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn index_load(path: &Path, reason: impl Into<String>) -> Self {
        Error::IndexLoad {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
