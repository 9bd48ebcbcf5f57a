//! Error types for the store layer.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No node at the given path.
    #[error("node not found: {0}")]
    NotFound(String),

    /// A node already exists at the given path.
    #[error("node already exists: {0}")]
    AlreadyExists(String),

    /// The path is not absolute or contains empty/relative segments.
    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    /// The node is checked in and must be checked out before modification.
    #[error("node is checked in: {0}")]
    CheckedIn(String),

    /// The node is locked by another session.
    #[error("node is locked: {0}")]
    Locked(String),

    /// The requested workspace does not exist.
    #[error("no such workspace: {0}")]
    NoSuchWorkspace(String),

    /// The operation is not supported on this node.
    #[error("unsupported operation on {path}: {reason}")]
    Unsupported { path: String, reason: String },
}
