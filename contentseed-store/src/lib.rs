//! Hierarchical content store for contentseed.
//!
//! The loader talks to a store only through [`ContentRepository`] and
//! [`ContentSession`]: named nodes with typed properties, mixins, ordered
//! children, access-control lists, principals, versioning checkpoints and
//! session-scoped locks. [`MemoryRepository`] is the in-process
//! implementation used by tests and embedders without a backing store.

mod error;
mod memory;
pub mod path;
mod session;

pub use error::{StoreError, StoreResult};
pub use memory::{DEFAULT_WORKSPACE, MemoryRepository, MemorySession, ROOT_NODE_TYPE};
pub use session::{AclEntry, ContentRepository, ContentSession, MIX_VERSIONABLE, NodeInfo};
