//! In-memory repository.
//!
//! Committed state lives behind one mutex. A session copies its workspace on
//! the first write and records every write in a journal; `save` replays the
//! journal onto the current committed state, so sessions touching disjoint
//! subtrees never clobber each other.

use contentseed_types::{AceOrder, PrincipalDefinition, PropertyValue};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

use crate::path::{self, ROOT};
use crate::session::{AclEntry, ContentRepository, ContentSession, NodeInfo};
use crate::{StoreError, StoreResult};

/// Primary type of the root node.
pub const ROOT_NODE_TYPE: &str = "rep:root";

/// Workspace used when a session does not name one.
pub const DEFAULT_WORKSPACE: &str = "default";

// ── Node data ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct NodeData {
    primary_type: String,
    mixins: Vec<String>,
    properties: BTreeMap<String, PropertyValue>,
    children: Vec<String>,
    checked_out: bool,
    acl: Vec<AclEntry>,
}

impl NodeData {
    fn new(primary_type: &str) -> Self {
        Self {
            primary_type: primary_type.to_string(),
            mixins: Vec::new(),
            properties: BTreeMap::new(),
            children: Vec::new(),
            checked_out: true,
            acl: Vec::new(),
        }
    }

    fn is_versionable(&self) -> bool {
        self.mixins.iter().any(|m| m == crate::MIX_VERSIONABLE)
    }
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: HashMap<String, NodeData>,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT.to_string(), NodeData::new(ROOT_NODE_TYPE));
        Self { nodes }
    }

    fn get(&self, path: &str) -> StoreResult<&NodeData> {
        self.nodes
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn get_mut(&mut self, path: &str) -> StoreResult<&mut NodeData> {
        self.nodes
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn writable(&mut self, path: &str) -> StoreResult<&mut NodeData> {
        let node = self.get_mut(path)?;
        if !node.checked_out {
            return Err(StoreError::CheckedIn(path.to_string()));
        }
        Ok(node)
    }

    fn info(&self, path: &str) -> StoreResult<NodeInfo> {
        let node = self.get(path)?;
        Ok(NodeInfo {
            path: path.to_string(),
            primary_type: node.primary_type.clone(),
            mixins: node.mixins.clone(),
            children: node.children.clone(),
            checked_out: node.checked_out,
        })
    }
}

// ── Journal ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    AddNode { path: String, primary_type: String },
    RemoveNode { path: String },
    AddMixin { path: String, mixin: String },
    SetProperty { path: String, name: String, value: PropertyValue },
    RemoveProperty { path: String, name: String },
    ApplyAce { path: String, entry: AclEntry, order: Option<AceOrder> },
    CreatePrincipal(PrincipalDefinition),
    Checkout(String),
    Checkin(String),
}

/// A workspace tree together with the repository-wide principals.
#[derive(Debug, Clone)]
struct Staged {
    tree: Tree,
    principals: BTreeMap<String, PrincipalDefinition>,
}

fn apply(tree: &mut Tree, principals: &mut BTreeMap<String, PrincipalDefinition>, op: &Op) -> StoreResult<()> {
    match op {
        Op::AddNode { path, primary_type } => {
            if tree.nodes.contains_key(path) {
                return Err(StoreError::AlreadyExists(path.clone()));
            }
            let parent = path::parent(path).ok_or_else(|| StoreError::AlreadyExists(path.clone()))?;
            tree.writable(parent)?.children.push(path::name(path).to_string());
            tree.nodes.insert(path.clone(), NodeData::new(primary_type));
        }
        Op::RemoveNode { path } => {
            let parent = path::parent(path).ok_or_else(|| StoreError::Unsupported {
                path: path.clone(),
                reason: "the root node cannot be removed".to_string(),
            })?;
            tree.get(path)?;
            let name = path::name(path);
            tree.writable(parent)?.children.retain(|c| c != name);
            tree.nodes.retain(|p, _| !path::is_same_or_descendant(p, path));
        }
        Op::AddMixin { path, mixin } => {
            let node = tree.writable(path)?;
            if !node.mixins.contains(mixin) {
                node.mixins.push(mixin.clone());
            }
        }
        Op::SetProperty { path, name, value } => {
            tree.writable(path)?.properties.insert(name.clone(), value.clone());
        }
        Op::RemoveProperty { path, name } => {
            tree.writable(path)?.properties.remove(name);
        }
        Op::ApplyAce { path, entry, order } => {
            let acl = &mut tree.get_mut(path)?.acl;
            acl.retain(|e| !(e.principal == entry.principal && e.allow == entry.allow));
            let index = match order {
                Some(AceOrder::First) => 0,
                Some(AceOrder::Before(principal)) => acl
                    .iter()
                    .position(|e| &e.principal == principal)
                    .unwrap_or(acl.len()),
                Some(AceOrder::After(principal)) => acl
                    .iter()
                    .rposition(|e| &e.principal == principal)
                    .map_or(acl.len(), |i| i + 1),
                Some(AceOrder::Last) | None => acl.len(),
            };
            acl.insert(index, entry.clone());
        }
        Op::CreatePrincipal(definition) => {
            principals
                .entry(definition.name.clone())
                .or_insert_with(|| definition.clone());
        }
        Op::Checkout(path) => versionable(tree, path)?.checked_out = true,
        Op::Checkin(path) => versionable(tree, path)?.checked_out = false,
    }
    Ok(())
}

fn versionable<'a>(tree: &'a mut Tree, path: &str) -> StoreResult<&'a mut NodeData> {
    let node = tree.get_mut(path)?;
    if !node.is_versionable() {
        return Err(StoreError::Unsupported {
            path: path.to_string(),
            reason: "node is not versionable".to_string(),
        });
    }
    Ok(node)
}

// ── Repository ───────────────────────────────────────────────────

#[derive(Debug)]
struct RepoState {
    workspaces: HashMap<String, Tree>,
    principals: BTreeMap<String, PrincipalDefinition>,
    /// (workspace, path) -> holding session id.
    locks: HashMap<(String, String), u64>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<RepoState>,
    next_session: AtomicU64,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, RepoState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A thread-safe in-memory repository. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    inner: Arc<Inner>,
}

impl MemoryRepository {
    /// Creates a repository with an empty default workspace.
    pub fn new() -> Self {
        let mut workspaces = HashMap::new();
        workspaces.insert(DEFAULT_WORKSPACE.to_string(), Tree::new());
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RepoState {
                    workspaces,
                    principals: BTreeMap::new(),
                    locks: HashMap::new(),
                }),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Adds an empty workspace. Existing workspaces are left untouched.
    pub fn create_workspace(&self, name: &str) {
        self.inner
            .state()
            .workspaces
            .entry(name.to_string())
            .or_insert_with(Tree::new);
    }

    pub fn workspace_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.state().workspaces.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of committed nodes in a workspace, root included.
    pub fn node_count(&self, workspace: &str) -> usize {
        self.inner
            .state()
            .workspaces
            .get(workspace)
            .map_or(0, |t| t.nodes.len())
    }

    pub fn open(&self, workspace: Option<&str>) -> StoreResult<MemorySession> {
        let workspace = workspace.unwrap_or(DEFAULT_WORKSPACE);
        if !self.inner.state().workspaces.contains_key(workspace) {
            return Err(StoreError::NoSuchWorkspace(workspace.to_string()));
        }
        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        trace!(session = id, workspace, "session opened");
        Ok(MemorySession {
            id,
            workspace: workspace.to_string(),
            inner: Arc::clone(&self.inner),
            staged: None,
            journal: Vec::new(),
        })
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentRepository for MemoryRepository {
    fn login(&self, workspace: Option<&str>) -> StoreResult<Box<dyn ContentSession>> {
        Ok(Box::new(self.open(workspace)?))
    }

    fn default_workspace(&self) -> &str {
        DEFAULT_WORKSPACE
    }
}

// ── Session ──────────────────────────────────────────────────────

/// A session on one workspace of a [`MemoryRepository`].
///
/// Locks taken by the session are released when it is dropped.
#[derive(Debug)]
pub struct MemorySession {
    id: u64,
    workspace: String,
    inner: Arc<Inner>,
    staged: Option<Staged>,
    journal: Vec<Op>,
}

impl MemorySession {
    fn read<R>(&self, f: impl FnOnce(&Tree, &BTreeMap<String, PrincipalDefinition>) -> StoreResult<R>) -> StoreResult<R> {
        if let Some(staged) = &self.staged {
            return f(&staged.tree, &staged.principals);
        }
        let state = self.inner.state();
        let tree = state
            .workspaces
            .get(&self.workspace)
            .ok_or_else(|| StoreError::NoSuchWorkspace(self.workspace.clone()))?;
        f(tree, &state.principals)
    }

    fn write(&mut self, op: Op) -> StoreResult<()> {
        if self.staged.is_none() {
            let state = self.inner.state();
            let tree = state
                .workspaces
                .get(&self.workspace)
                .ok_or_else(|| StoreError::NoSuchWorkspace(self.workspace.clone()))?
                .clone();
            let principals = state.principals.clone();
            drop(state);
            self.staged = Some(Staged { tree, principals });
        }
        let staged = self
            .staged
            .as_mut()
            .ok_or_else(|| StoreError::NoSuchWorkspace(self.workspace.clone()))?;
        apply(&mut staged.tree, &mut staged.principals, &op)?;
        self.journal.push(op);
        Ok(())
    }

    fn lock_key(&self, path: &str) -> (String, String) {
        (self.workspace.clone(), path.to_string())
    }
}

impl ContentSession for MemorySession {
    fn workspace(&self) -> &str {
        &self.workspace
    }

    fn node_exists(&self, path: &str) -> StoreResult<bool> {
        let path = path::normalize(path)?;
        self.read(|tree, _| Ok(tree.nodes.contains_key(&path)))
    }

    fn node(&self, path: &str) -> StoreResult<NodeInfo> {
        let path = path::normalize(path)?;
        self.read(|tree, _| tree.info(&path))
    }

    fn add_node(&mut self, path: &str, primary_type: &str) -> StoreResult<()> {
        let path = path::normalize(path)?;
        self.write(Op::AddNode {
            path,
            primary_type: primary_type.to_string(),
        })
    }

    fn remove_node(&mut self, path: &str) -> StoreResult<()> {
        let path = path::normalize(path)?;
        self.write(Op::RemoveNode { path })
    }

    fn add_mixin(&mut self, path: &str, mixin: &str) -> StoreResult<()> {
        let path = path::normalize(path)?;
        self.write(Op::AddMixin {
            path,
            mixin: mixin.to_string(),
        })
    }

    fn property(&self, path: &str, name: &str) -> StoreResult<Option<PropertyValue>> {
        let path = path::normalize(path)?;
        self.read(|tree, _| Ok(tree.get(&path)?.properties.get(name).cloned()))
    }

    fn property_names(&self, path: &str) -> StoreResult<Vec<String>> {
        let path = path::normalize(path)?;
        self.read(|tree, _| Ok(tree.get(&path)?.properties.keys().cloned().collect()))
    }

    fn set_property(&mut self, path: &str, name: &str, value: PropertyValue) -> StoreResult<()> {
        let path = path::normalize(path)?;
        self.write(Op::SetProperty {
            path,
            name: name.to_string(),
            value,
        })
    }

    fn remove_property(&mut self, path: &str, name: &str) -> StoreResult<()> {
        let path = path::normalize(path)?;
        self.write(Op::RemoveProperty {
            path,
            name: name.to_string(),
        })
    }

    fn access_control_list(&self, path: &str) -> StoreResult<Vec<AclEntry>> {
        let path = path::normalize(path)?;
        self.read(|tree, _| Ok(tree.get(&path)?.acl.clone()))
    }

    fn apply_access_control(
        &mut self,
        path: &str,
        entry: AclEntry,
        order: Option<&AceOrder>,
    ) -> StoreResult<()> {
        let path = path::normalize(path)?;
        self.write(Op::ApplyAce {
            path,
            entry,
            order: order.cloned(),
        })
    }

    fn principal(&self, name: &str) -> StoreResult<Option<PrincipalDefinition>> {
        self.read(|_, principals| Ok(principals.get(name).cloned()))
    }

    fn create_principal(&mut self, definition: &PrincipalDefinition) -> StoreResult<()> {
        self.write(Op::CreatePrincipal(definition.clone()))
    }

    fn checkout(&mut self, path: &str) -> StoreResult<()> {
        let path = path::normalize(path)?;
        self.write(Op::Checkout(path))
    }

    fn checkin(&mut self, path: &str) -> StoreResult<()> {
        let path = path::normalize(path)?;
        self.write(Op::Checkin(path))
    }

    fn lock(&mut self, path: &str) -> StoreResult<()> {
        let path = path::normalize(path)?;
        let key = self.lock_key(&path);
        let mut state = self.inner.state();
        let exists = state
            .workspaces
            .get(&self.workspace)
            .is_some_and(|t| t.nodes.contains_key(&path));
        if !exists {
            return Err(StoreError::NotFound(path));
        }
        match state.locks.get(&key) {
            Some(holder) if *holder != self.id => Err(StoreError::Locked(path)),
            _ => {
                state.locks.insert(key, self.id);
                Ok(())
            }
        }
    }

    fn unlock(&mut self, path: &str) -> StoreResult<()> {
        let path = path::normalize(path)?;
        let key = self.lock_key(&path);
        let mut state = self.inner.state();
        match state.locks.get(&key) {
            Some(holder) if *holder != self.id => Err(StoreError::Locked(path)),
            Some(_) => {
                state.locks.remove(&key);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn is_locked(&self, path: &str) -> StoreResult<bool> {
        let path = path::normalize(path)?;
        let key = self.lock_key(&path);
        Ok(self.inner.state().locks.contains_key(&key))
    }

    fn has_pending_changes(&self) -> bool {
        !self.journal.is_empty()
    }

    fn save(&mut self) -> StoreResult<()> {
        if self.journal.is_empty() {
            self.staged = None;
            return Ok(());
        }
        let mut state = self.inner.state();
        let mut tree = state
            .workspaces
            .get(&self.workspace)
            .ok_or_else(|| StoreError::NoSuchWorkspace(self.workspace.clone()))?
            .clone();
        let mut principals = state.principals.clone();
        for op in &self.journal {
            apply(&mut tree, &mut principals, op)?;
        }
        state.workspaces.insert(self.workspace.clone(), tree);
        state.principals = principals;
        drop(state);

        debug!(session = self.id, workspace = %self.workspace, ops = self.journal.len(), "session saved");
        self.journal.clear();
        self.staged = None;
        Ok(())
    }

    fn refresh(&mut self) {
        if !self.journal.is_empty() {
            debug!(session = self.id, ops = self.journal.len(), "discarding staged changes");
        }
        self.journal.clear();
        self.staged = None;
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        let id = self.id;
        self.inner.state().locks.retain(|_, holder| *holder != id);
    }
}
