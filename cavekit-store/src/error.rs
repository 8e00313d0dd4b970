//! Store errors.

use std::path::PathBuf;

/// Failures a storage backend can surface. Missing documents are not
/// errors; those come back as `None`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store i/o failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed stored document at {location}: {source}")]
    Decode {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("backend `{backend}` is unavailable: {reason}")]
    Unavailable { backend: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;
