//! Error types for the loading engine.

use contentseed_import::ImportError;
use contentseed_store::StoreError;
use contentseed_types::ModuleId;
use thiserror::Error;

/// Result type for loader operations.
pub type LoaderResult<T> = Result<T, LoaderError>;

/// Errors that can occur while loading or unloading module content.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The module's content header could not be parsed.
    #[error("malformed content descriptor: {0}")]
    Descriptor(#[from] contentseed_types::Error),

    /// Decoding or building one path entry failed.
    #[error("import of {source_path} failed: {source}")]
    Import {
        source_path: String,
        #[source]
        source: ImportError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The module's bookkeeping record is locked by someone else. The
    /// operation is retried later.
    #[error("content record of module {module} is locked by another session")]
    ConcurrentModification { module: ModuleId },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("module package error: {0}")]
    Package(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for LoaderError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Package(err.to_string())
    }
}

impl From<toml::de::Error> for LoaderError {
    fn from(err: toml::de::Error) -> Self {
        Self::Package(err.to_string())
    }
}

impl From<toml::ser::Error> for LoaderError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Package(err.to_string())
    }
}
