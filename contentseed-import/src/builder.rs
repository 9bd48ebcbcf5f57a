//! Turns structural events into store mutations under a path entry's policy.
//!
//! One [`TreeBuilder`] serves one path entry: it starts at the entry's target
//! node, applies node and property conflict rules, and records what it
//! created. Mutations stay in the caller's session; saving, and checking in
//! the versionable nodes reported by [`TreeBuilder::finish`], is the caller's
//! job.

use chrono::{DateTime, Utc};
use contentseed_store::{AclEntry, ContentSession, MIX_VERSIONABLE, path};
use contentseed_types::{AccessControlEntry, PathEntry, PrincipalDefinition, PropertyValue, Value};
use std::collections::HashSet;
use tracing::{debug, trace};

use crate::mime::{DEFAULT_MIME_TYPE, MimeTypes};
use crate::{ContentCreator, ImportError, ImportResult, ReaderRegistry};

/// Primary type for nodes declared without one.
pub const DEFAULT_NODE_TYPE: &str = "nt:unstructured";
pub const FILE_NODE_TYPE: &str = "nt:file";
pub const RESOURCE_NODE_TYPE: &str = "nt:resource";
pub const CONTENT_NODE: &str = "jcr:content";
pub const DATA_PROPERTY: &str = "jcr:data";
pub const MIME_TYPE_PROPERTY: &str = "jcr:mimeType";
pub const LAST_MODIFIED_PROPERTY: &str = "jcr:lastModified";

/// What one builder pass produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Topmost nodes created by the pass, in creation order. A node created
    /// below another node of the same pass is covered by its ancestor.
    pub created_paths: Vec<String>,
    /// The first node created by the pass.
    pub root_node: Option<String>,
    /// Versionable nodes to check in once the pass is saved.
    pub versionables: Vec<String>,
}

/// The default [`ContentCreator`].
pub struct TreeBuilder<'a> {
    session: &'a mut dyn ContentSession,
    entry: &'a PathEntry,
    mime: &'a dyn MimeTypes,
    readers: Option<&'a ReaderRegistry>,
    /// Current node is last; the target node is the base.
    stack: Vec<String>,
    /// Name for the next unnamed node.
    pending_name: Option<String>,
    /// An unnamed top-level node stands for the target itself.
    parent_import: bool,
    /// Every node this pass added.
    created: HashSet<String>,
    summary: ImportSummary,
}

impl<'a> TreeBuilder<'a> {
    /// Creates a builder rooted at `target`, which must exist.
    pub fn new(
        session: &'a mut dyn ContentSession,
        entry: &'a PathEntry,
        target: &str,
        mime: &'a dyn MimeTypes,
    ) -> ImportResult<Self> {
        let target = path::normalize(target)?;
        if !session.node_exists(&target)? {
            return Err(contentseed_store::StoreError::NotFound(target).into());
        }
        Ok(Self {
            session,
            entry,
            mime,
            readers: None,
            stack: vec![target],
            pending_name: None,
            parent_import: false,
            created: HashSet::new(),
            summary: ImportSummary::default(),
        })
    }

    /// Lets archive members be imported through registered readers.
    pub fn with_readers(mut self, readers: &'a ReaderRegistry) -> Self {
        self.readers = Some(readers);
        self
    }

    /// Names the next node a reader creates without a name.
    pub fn set_default_name(&mut self, name: Option<&str>) {
        self.pending_name = name.map(str::to_string);
    }

    /// When set, an unnamed top-level node updates the current node instead
    /// of creating a child.
    pub fn set_parent_import(&mut self, parent_import: bool) {
        self.parent_import = parent_import;
    }

    pub fn current(&self) -> &str {
        self.stack.last().map_or(path::ROOT, String::as_str)
    }

    /// Direct access to the session for callers driving the builder.
    pub fn session(&mut self) -> &mut dyn ContentSession {
        &mut *self.session
    }

    pub fn summary(&self) -> &ImportSummary {
        &self.summary
    }

    pub fn finish(self) -> ImportSummary {
        self.summary
    }

    // ── Policy helpers ───────────────────────────────────────────

    /// Checks out `path` if it is checked in and auto checkout is enabled.
    fn ensure_writable(&mut self, path: &str) -> ImportResult<()> {
        let info = self.session.node(path)?;
        if !info.checked_out && self.entry.auto_checkout_versionable {
            debug!(path, "checking out versionable node");
            self.session.checkout(path)?;
        }
        Ok(())
    }

    /// Decides what to do with a node that may exist. Returns `true` when the
    /// existing node is reused.
    fn resolve_existing(&mut self, path: &str) -> ImportResult<bool> {
        if !self.session.node_exists(path)? {
            return Ok(false);
        }
        if self.entry.merge_nodes {
            trace!(path, "merging into existing node");
            return Ok(true);
        }
        if self.entry.overwrite_nodes {
            debug!(path, "overwriting existing node");
            if let Some(parent) = path::parent(path) {
                self.ensure_writable(parent)?;
            }
            self.session.remove_node(path)?;
            return Ok(false);
        }
        Err(ImportError::Conflict { path: path.to_string() })
    }

    fn add_node(&mut self, path: &str, primary_type: &str) -> ImportResult<()> {
        if let Some(parent) = path::parent(path) {
            self.ensure_writable(parent)?;
        }
        self.session.add_node(path, primary_type)?;
        self.record_created(path);
        if self.summary.root_node.is_none() {
            self.summary.root_node = Some(path.to_string());
        }
        Ok(())
    }

    fn record_created(&mut self, path: &str) {
        let covered = path::parent(path).is_some_and(|parent| self.created.contains(parent));
        if !covered {
            self.summary.created_paths.push(path.to_string());
        }
        self.created.insert(path.to_string());
    }

    fn add_mixins(&mut self, path: &str, mixins: &[String]) -> ImportResult<()> {
        let existing = self.session.node(path)?.mixins;
        for mixin in mixins.iter().filter(|m| !existing.contains(m)) {
            self.ensure_writable(path)?;
            self.session.add_mixin(path, mixin)?;
        }
        if self.entry.checkin_versionable
            && mixins.iter().any(|m| m == MIX_VERSIONABLE)
            && !self.summary.versionables.iter().any(|p| p == path)
        {
            self.summary.versionables.push(path.to_string());
        }
        Ok(())
    }

    /// Sets a property on `path` if absent, or merges/overwrites it when the
    /// entry allows.
    fn apply_property(&mut self, path: &str, name: &str, value: PropertyValue) -> ImportResult<()> {
        let value = match self.session.property(path, name)? {
            None => value,
            Some(existing) if self.entry.merge_properties => existing.merged_with(&value),
            Some(_) if self.entry.overwrite_properties => value,
            Some(_) => {
                trace!(path, name, "keeping existing property");
                return Ok(());
            }
        };
        self.ensure_writable(path)?;
        self.session.set_property(path, name, value)?;
        Ok(())
    }
}

impl ContentCreator for TreeBuilder<'_> {
    fn create_node(
        &mut self,
        name: Option<&str>,
        primary_type: Option<&str>,
        mixins: &[String],
    ) -> ImportResult<()> {
        let name = name.map(str::to_string).or_else(|| self.pending_name.take());
        let Some(name) = name else {
            if self.parent_import && self.stack.len() == 1 {
                let target = self.current().to_string();
                self.add_mixins(&target, mixins)?;
                self.stack.push(target);
                return Ok(());
            }
            return Err(ImportError::decode(format!("unnamed node below {}", self.current())));
        };
        if !path::is_valid_name(&name) {
            return Err(ImportError::decode(format!("invalid node name {name:?}")));
        }

        let node_path = path::join(self.current(), &name);
        if !self.resolve_existing(&node_path)? {
            self.add_node(&node_path, primary_type.unwrap_or(DEFAULT_NODE_TYPE))?;
        }
        self.add_mixins(&node_path, mixins)?;
        self.stack.push(node_path);
        Ok(())
    }

    fn finish_node(&mut self) -> ImportResult<()> {
        if self.stack.len() <= 1 {
            return Err(ImportError::decode("finish_node without a matching node"));
        }
        self.stack.pop();
        Ok(())
    }

    fn create_property(&mut self, name: &str, value: PropertyValue) -> ImportResult<()> {
        let current = self.current().to_string();
        self.apply_property(&current, name, value)
    }

    fn create_file(
        &mut self,
        name: &str,
        data: &[u8],
        mime_type: Option<&str>,
        last_modified: Option<DateTime<Utc>>,
    ) -> ImportResult<()> {
        if !path::is_valid_name(name) {
            return Err(ImportError::decode(format!("invalid file name {name:?}")));
        }
        let file_path = path::join(self.current(), name);
        let content_path = path::join(&file_path, CONTENT_NODE);
        if !self.resolve_existing(&file_path)? {
            self.add_node(&file_path, FILE_NODE_TYPE)?;
        }
        if !self.session.node_exists(&content_path)? {
            self.ensure_writable(&file_path)?;
            self.session.add_node(&content_path, RESOURCE_NODE_TYPE)?;
            self.record_created(&content_path);
        }

        let mime_type = mime_type
            .map(str::to_string)
            .or_else(|| self.mime.mime_type(name))
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
        let last_modified = last_modified.unwrap_or_else(Utc::now);

        self.apply_property(&content_path, DATA_PROPERTY, Value::Binary(data.to_vec()).into())?;
        self.apply_property(&content_path, MIME_TYPE_PROPERTY, Value::String(mime_type).into())?;
        self.apply_property(
            &content_path,
            LAST_MODIFIED_PROPERTY,
            Value::Date(last_modified.fixed_offset()).into(),
        )?;
        trace!(path = %file_path, bytes = data.len(), "file created");
        Ok(())
    }

    fn switch_current_node(&mut self, sub_path: &str, folder_type: &str) -> ImportResult<()> {
        let mut current = self.current().to_string();
        for segment in sub_path.split('/').filter(|s| !s.is_empty()) {
            if !path::is_valid_name(segment) {
                return Err(ImportError::decode(format!("invalid path segment in {sub_path:?}")));
            }
            let next = path::join(&current, segment);
            if !self.session.node_exists(&next)? {
                if let Some(parent) = path::parent(&next) {
                    self.ensure_writable(parent)?;
                }
                self.session.add_node(&next, folder_type)?;
                self.record_created(&next);
                if self.summary.root_node.is_none() {
                    self.summary.root_node = Some(next.clone());
                }
            }
            current = next;
        }
        self.stack.push(current);
        Ok(())
    }

    fn create_principal(&mut self, principal: PrincipalDefinition) -> ImportResult<()> {
        if self.session.principal(&principal.name)?.is_some() {
            trace!(principal = %principal.name, "principal exists");
            return Ok(());
        }
        debug!(principal = %principal.name, group = principal.is_group(), "creating principal");
        self.session.create_principal(&principal)?;
        Ok(())
    }

    fn create_ace(&mut self, ace: AccessControlEntry) -> ImportResult<()> {
        let current = self.current().to_string();
        let AccessControlEntry {
            principal,
            granted,
            denied,
            order,
            restrictions,
        } = ace;
        for (allow, privileges) in [(true, granted), (false, denied)] {
            if privileges.is_empty() {
                continue;
            }
            let entry = AclEntry {
                principal: principal.clone(),
                allow,
                privileges,
                restrictions: restrictions.clone(),
            };
            self.session.apply_access_control(&current, entry, order.as_ref())?;
        }
        Ok(())
    }

    fn import_nested(&mut self, name: &str, data: &[u8]) -> ImportResult<bool> {
        let Some(readers) = self.readers else {
            return Ok(false);
        };
        let Some((ext, reader)) = readers.reader_for_file(name) else {
            return Ok(false);
        };
        if reader.is_archive() || self.entry.is_ignored_reader(&ext) {
            return Ok(false);
        }
        let stem = &name[..name.len() - ext.len() - 1];
        if stem.is_empty() {
            return Ok(false);
        }
        debug!(name, reader = reader.name(), "importing archive member");
        self.pending_name = Some(stem.to_string());
        let mut input = data;
        reader.parse(&mut input, self)?;
        self.pending_name = None;
        Ok(true)
    }
}
