//! Core type definitions for contentseed.
//!
//! This crate defines the store-agnostic types shared by the importer and the
//! loader:
//! - Module identifiers
//! - [`PathEntry`] import directives and the descriptor-header parser
//! - Property values and their types
//! - Access-control entry and principal declarations
//!
//! Nothing here talks to a content store; the store seam lives in
//! `contentseed-store`.

mod access;
mod descriptor;
mod ids;
mod path_entry;
mod value;

pub use access::{AccessControlEntry, AceOrder, PrincipalDefinition, PrincipalKind, RestrictionValue};
pub use descriptor::{DescriptorEntry, parse_header};
pub use ids::ModuleId;
pub use path_entry::{
    AUTO_CHECKOUT_DIRECTIVE, CHECKIN_DIRECTIVE, CONTENT_HEADER, IGNORE_READERS_DIRECTIVE,
    LAST_MODIFIED_HEADER, MERGE_NODES_DIRECTIVE, MERGE_PROPERTIES_DIRECTIVE, OVERWRITE_DIRECTIVE,
    OVERWRITE_PROPERTIES_DIRECTIVE, PATH_DIRECTIVE, PathEntry, REQUIRE_READERS_DIRECTIVE,
    UNINSTALL_DIRECTIVE, WORKSPACE_DIRECTIVE,
};
pub use value::{PropertyType, PropertyValue, Value};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The content descriptor could not be tokenized or a directive is unparsable.
    #[error("malformed descriptor: {reason} (in {descriptor:?})")]
    MalformedDescriptor { descriptor: String, reason: String },

    #[error("invalid module id: {0:?}")]
    InvalidModuleId(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Alias kept for call sites that want to name the descriptor failure explicitly.
pub type DescriptorError = Error;
