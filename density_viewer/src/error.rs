// THEORY:
// Every failure the service can report to a client is one of four kinds. Missing
// data, an unknown colormap and a malformed record are the caller's problem and
// map to 4xx responses; anything else that goes wrong while reading the data
// directory is ours. Degenerate geometry and flat density ranges are NOT errors:
// the normalizer and colorizer resolve those with explicit fallbacks.

use std::path::PathBuf;

/// The error taxonomy of the normalization & coloring service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A named dataset has no backing files under the data root.
    #[error("dataset '{name}' not found")]
    DatasetNotFound { name: String },

    /// The requested colormap is not registered.
    #[error("unknown colormap '{name}' (available: {available})")]
    UnknownColormap { name: String, available: String },

    /// A record violates a shape or index invariant.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// Reading from the data directory failed for a reason other than absence.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ServiceError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRecord(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
