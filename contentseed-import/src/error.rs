//! Error types for content import.

use contentseed_store::StoreError;
use thiserror::Error;

/// Result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Archive safety threshold that was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    Entries,
    TotalSize,
    CompressionRatio,
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Entries => "The total entries count of the archive exceeded the allowed threshold",
            Self::TotalSize => "The total size of the archive exceeded the allowed threshold",
            Self::CompressionRatio => "The compression ratio exceeded the allowed threshold",
        })
    }
}

/// Errors that can occur while decoding content into the store.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// An archive crossed one of its safety thresholds.
    #[error("{threshold} (limit {limit}, actual {actual})")]
    SecurityLimit {
        threshold: Threshold,
        limit: String,
        actual: String,
    },

    /// A node exists and the entry's policy neither merges nor overwrites.
    #[error("node already exists: {path}")]
    Conflict { path: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImportError {
    pub(crate) fn decode(msg: impl std::fmt::Display) -> Self {
        Self::Decode(msg.to_string())
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err)
    }
}

impl From<zip::result::ZipError> for ImportError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => Self::Io(io),
            other => Self::decode(other),
        }
    }
}
