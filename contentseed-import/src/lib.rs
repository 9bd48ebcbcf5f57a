//! Content import for contentseed.
//!
//! Readers decode one format into structural events pushed into a
//! [`ContentCreator`]; [`TreeBuilder`] is the creator that writes those
//! events into a store session under a [`PathEntry`](contentseed_types::PathEntry)'s
//! merge and overwrite policy.
//!
//! Built-in readers:
//! - [`JsonReader`] for `.json`, and its ordered flavour for `.ordered-json`
//! - [`ZipReader`] for `.zip` and `.jar`, guarded by [`ArchiveLimits`]

mod archive;
mod builder;
mod creator;
mod error;
pub mod json;
pub mod mime;
mod reader;

pub use archive::{ArchiveLimits, ZipReader};
pub use builder::{
    CONTENT_NODE, DATA_PROPERTY, DEFAULT_NODE_TYPE, FILE_NODE_TYPE, ImportSummary,
    LAST_MODIFIED_PROPERTY, MIME_TYPE_PROPERTY, RESOURCE_NODE_TYPE, TreeBuilder,
};
pub use creator::ContentCreator;
pub use error::{ImportError, ImportResult, Threshold};
pub use json::JsonReader;
pub use mime::{BuiltinMimeTypes, MimeTypes};
pub use reader::{ContentReader, ReaderRegistry};
