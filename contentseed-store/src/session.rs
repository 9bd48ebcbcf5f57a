//! The store seam: a repository hands out sessions, a session reads and
//! writes one workspace and commits with [`ContentSession::save`].

use contentseed_types::{AceOrder, PrincipalDefinition, PropertyValue, RestrictionValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::StoreResult;

/// Mixin marking a node as versionable.
pub const MIX_VERSIONABLE: &str = "mix:versionable";

/// A snapshot of one node's structural state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub path: String,
    pub primary_type: String,
    pub mixins: Vec<String>,
    /// Child names in sibling order.
    pub children: Vec<String>,
    pub checked_out: bool,
}

impl NodeInfo {
    /// Whether the node's primary type or one of its mixins is `node_type`.
    pub fn is_node_type(&self, node_type: &str) -> bool {
        self.primary_type == node_type || self.mixins.iter().any(|m| m == node_type)
    }

    pub fn is_versionable(&self) -> bool {
        self.is_node_type(MIX_VERSIONABLE)
    }
}

/// One stored access-control entry. A declared entry with both granted and
/// denied privileges is stored as two entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub principal: String,
    pub allow: bool,
    pub privileges: Vec<String>,
    pub restrictions: BTreeMap<String, RestrictionValue>,
}

/// Hands out sessions bound to a workspace.
pub trait ContentRepository: Send + Sync {
    /// Opens a session on `workspace`, or on the default workspace for `None`.
    fn login(&self, workspace: Option<&str>) -> StoreResult<Box<dyn ContentSession>>;

    /// Name of the workspace used when none is requested.
    fn default_workspace(&self) -> &str;
}

/// Transactional access to one workspace.
///
/// Writes are staged in the session and become visible to other sessions on
/// [`save`](Self::save); [`refresh`](Self::refresh) discards them. Locks and
/// principals are repository-wide.
pub trait ContentSession {
    fn workspace(&self) -> &str;

    fn node_exists(&self, path: &str) -> StoreResult<bool>;

    fn node(&self, path: &str) -> StoreResult<NodeInfo>;

    /// Adds a node; the parent must exist and the path must be free.
    fn add_node(&mut self, path: &str, primary_type: &str) -> StoreResult<()>;

    /// Removes a node and its subtree.
    fn remove_node(&mut self, path: &str) -> StoreResult<()>;

    fn add_mixin(&mut self, path: &str, mixin: &str) -> StoreResult<()>;

    fn property(&self, path: &str, name: &str) -> StoreResult<Option<PropertyValue>>;

    fn property_names(&self, path: &str) -> StoreResult<Vec<String>>;

    fn set_property(&mut self, path: &str, name: &str, value: PropertyValue) -> StoreResult<()>;

    fn remove_property(&mut self, path: &str, name: &str) -> StoreResult<()>;

    fn access_control_list(&self, path: &str) -> StoreResult<Vec<AclEntry>>;

    /// Adds an entry, replacing any entry for the same principal with the
    /// same allow/deny kind.
    fn apply_access_control(
        &mut self,
        path: &str,
        entry: AclEntry,
        order: Option<&AceOrder>,
    ) -> StoreResult<()>;

    fn principal(&self, name: &str) -> StoreResult<Option<PrincipalDefinition>>;

    /// Creates a principal unless one with the same name already exists.
    fn create_principal(&mut self, definition: &PrincipalDefinition) -> StoreResult<()>;

    fn checkout(&mut self, path: &str) -> StoreResult<()>;

    fn checkin(&mut self, path: &str) -> StoreResult<()>;

    /// Takes a session-scoped lock on a saved node without waiting.
    fn lock(&mut self, path: &str) -> StoreResult<()>;

    fn unlock(&mut self, path: &str) -> StoreResult<()>;

    /// Whether any session holds a lock on the node.
    fn is_locked(&self, path: &str) -> StoreResult<bool>;

    fn has_pending_changes(&self) -> bool;

    /// Commits staged writes atomically.
    fn save(&mut self) -> StoreResult<()>;

    /// Discards staged writes.
    fn refresh(&mut self);
}
