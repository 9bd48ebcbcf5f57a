//! Per-module content records kept in the store.
//!
//! Each module gets one node under the bookkeeping root, named by its id.
//! Records are never deleted; unloading only flips `content-loaded`. Every
//! read-modify-write holds a store lock on the record node, and a record
//! that is locked by someone else reads as unknown instead of blocking.

use chrono::{DateTime, Utc};
use contentseed_import::DEFAULT_NODE_TYPE;
use contentseed_store::{ContentRepository, ContentSession, StoreError, path};
use contentseed_types::{ModuleId, PropertyValue, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::{LoaderError, LoaderResult};

const LOADED_PROPERTY: &str = "content-loaded";
const LOAD_TIME_PROPERTY: &str = "content-load-time";
const LOADED_BY_PROPERTY: &str = "content-loaded-by";
const UNINSTALL_PATHS_PROPERTY: &str = "uninstall-paths";
const UNLOADED_BY_PROPERTY: &str = "content-unloaded-by";
const UNLOAD_TIME_PROPERTY: &str = "content-unload-time";

const CREATE_ATTEMPTS: usize = 3;

/// The persisted load status of one module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleContentRecord {
    pub loaded: bool,
    pub loaded_at: Option<DateTime<Utc>>,
    pub loaded_by: Option<String>,
    /// Top-level nodes to remove on uninstall. `workspace:/path` for nodes
    /// outside the default workspace.
    pub uninstall_paths: Vec<String>,
    pub unloaded_by: Option<String>,
    pub unloaded_at: Option<DateTime<Utc>>,
}

/// Read-only view of a record handed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleContentInfo {
    pub loaded: bool,
    pub loaded_at: Option<DateTime<Utc>>,
    pub uninstall_paths: Vec<String>,
}

impl From<&ModuleContentRecord> for ModuleContentInfo {
    fn from(record: &ModuleContentRecord) -> Self {
        Self {
            loaded: record.loaded,
            loaded_at: record.loaded_at,
            uninstall_paths: record.uninstall_paths.clone(),
        }
    }
}

impl ModuleContentRecord {
    fn read(session: &dyn ContentSession, node: &str) -> LoaderResult<Self> {
        let string = |name: &str| -> LoaderResult<Option<String>> {
            Ok(session
                .property(node, name)?
                .and_then(|v| v.single().and_then(Value::as_str).map(str::to_string)))
        };
        let date = |name: &str| -> LoaderResult<Option<DateTime<Utc>>> {
            Ok(session
                .property(node, name)?
                .and_then(|v| v.single().and_then(Value::as_date))
                .map(|d| d.with_timezone(&Utc)))
        };

        let loaded = session
            .property(node, LOADED_PROPERTY)?
            .and_then(|v| v.single().and_then(Value::as_bool))
            .unwrap_or(false);
        let uninstall_paths = session
            .property(node, UNINSTALL_PATHS_PROPERTY)?
            .map(|v| {
                v.values()
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            loaded,
            loaded_at: date(LOAD_TIME_PROPERTY)?,
            loaded_by: string(LOADED_BY_PROPERTY)?,
            uninstall_paths,
            unloaded_by: string(UNLOADED_BY_PROPERTY)?,
            unloaded_at: date(UNLOAD_TIME_PROPERTY)?,
        })
    }

    fn write(&self, session: &mut dyn ContentSession, node: &str) -> LoaderResult<()> {
        session.set_property(node, LOADED_PROPERTY, Value::Boolean(self.loaded).into())?;
        session.set_property(
            node,
            UNINSTALL_PATHS_PROPERTY,
            PropertyValue::strings(self.uninstall_paths.iter().cloned()),
        )?;
        set_optional(session, node, LOAD_TIME_PROPERTY, self.loaded_at.map(date_value))?;
        set_optional(session, node, LOADED_BY_PROPERTY, self.loaded_by.clone().map(Value::String))?;
        set_optional(session, node, UNLOADED_BY_PROPERTY, self.unloaded_by.clone().map(Value::String))?;
        set_optional(session, node, UNLOAD_TIME_PROPERTY, self.unloaded_at.map(date_value))?;
        Ok(())
    }
}

fn date_value(at: DateTime<Utc>) -> Value {
    Value::Date(at.fixed_offset())
}

fn set_optional(
    session: &mut dyn ContentSession,
    node: &str,
    name: &str,
    value: Option<Value>,
) -> LoaderResult<()> {
    match value {
        Some(v) => session.set_property(node, name, v.into())?,
        None => session.remove_property(node, name)?,
    }
    Ok(())
}

/// Creates every missing node on `path` and saves. Another session creating
/// the same nodes concurrently is tolerated.
pub fn ensure_node_path(session: &mut dyn ContentSession, target: &str, node_type: &str) -> LoaderResult<()> {
    let target = path::normalize(target)?;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match create_missing(session, &target, node_type) {
            Ok(()) => return Ok(()),
            Err(StoreError::AlreadyExists(existing)) if attempt < CREATE_ATTEMPTS => {
                trace!(path = %existing, attempt, "node created concurrently, retrying");
                session.refresh();
            }
            Err(e) => {
                session.refresh();
                return Err(e.into());
            }
        }
    }
}

fn create_missing(session: &mut dyn ContentSession, target: &str, node_type: &str) -> Result<(), StoreError> {
    let mut current = path::ROOT.to_string();
    for segment in target.split('/').filter(|s| !s.is_empty()) {
        current = path::join(&current, segment);
        if !session.node_exists(&current)? {
            session.add_node(&current, node_type)?;
        }
    }
    session.save()
}

/// Store-backed access to module records.
pub struct Bookkeeping {
    repository: Arc<dyn ContentRepository>,
    root: String,
}

impl Bookkeeping {
    pub fn new(repository: Arc<dyn ContentRepository>, root: &str) -> Self {
        Self {
            repository,
            root: root.to_string(),
        }
    }

    /// Path of the record node for `module`.
    pub fn record_path(&self, module: &ModuleId) -> String {
        format!("{}/{}", self.root.trim_end_matches('/'), module.as_str())
    }

    /// Reads a module's record. `None` when the module has never been seen
    /// or its record is currently locked.
    pub fn info(&self, module: &ModuleId) -> LoaderResult<Option<ModuleContentInfo>> {
        let session = self.repository.login(None)?;
        let node = self.record_path(module);
        if !session.node_exists(&node)? || session.is_locked(&node)? {
            return Ok(None);
        }
        let record = ModuleContentRecord::read(session.as_ref(), &node)?;
        Ok(Some(ModuleContentInfo::from(&record)))
    }

    /// Runs `f` on the module's record under the record lock and persists
    /// the record if `f` changed it.
    ///
    /// Fails with [`LoaderError::ConcurrentModification`] when another
    /// session holds the lock. The lock is released whatever `f` returns.
    pub fn update<T>(
        &self,
        module: &ModuleId,
        f: impl FnOnce(&mut ModuleContentRecord) -> LoaderResult<T>,
    ) -> LoaderResult<T> {
        let mut session = self.repository.login(None)?;
        let node = self.record_path(module);
        ensure_node_path(session.as_mut(), &node, DEFAULT_NODE_TYPE)?;

        match session.lock(&node) {
            Ok(()) => {}
            Err(StoreError::Locked(_)) => {
                debug!(module = %module, "content record is locked");
                return Err(LoaderError::ConcurrentModification { module: module.clone() });
            }
            Err(e) => return Err(e.into()),
        }

        let result = Self::modify(session.as_mut(), &node, f);
        if result.is_err() {
            session.refresh();
        }
        let unlocked = session.unlock(&node);
        let value = result?;
        unlocked?;
        Ok(value)
    }

    fn modify<T>(
        session: &mut dyn ContentSession,
        node: &str,
        f: impl FnOnce(&mut ModuleContentRecord) -> LoaderResult<T>,
    ) -> LoaderResult<T> {
        let original = ModuleContentRecord::read(session, node)?;
        let mut record = original.clone();
        let value = f(&mut record)?;
        if record != original {
            record.write(session, node)?;
            session.save()?;
        }
        Ok(value)
    }
}

/// Merges `added` into `existing`, sorts the result and drops every path
/// already covered by an ancestor in the list.
pub fn optimize_uninstall_paths(existing: &[String], added: &[String]) -> Vec<String> {
    let mut all: Vec<String> = existing.iter().chain(added).cloned().collect();
    all.sort();
    all.dedup();

    let mut kept: Vec<String> = Vec::with_capacity(all.len());
    for candidate in all {
        let covered = kept.iter().any(|k| covers(k, &candidate));
        if !covered {
            kept.push(candidate);
        }
    }
    kept
}

fn covers(ancestor: &str, candidate: &str) -> bool {
    let (a_ws, a_path) = split_workspace(ancestor);
    let (c_ws, c_path) = split_workspace(candidate);
    a_ws == c_ws && path::is_same_or_descendant(c_path, a_path)
}

/// Splits `workspace:/path` into its parts. Plain paths have no workspace.
pub fn split_workspace(uninstall_path: &str) -> (Option<&str>, &str) {
    match uninstall_path.split_once(':') {
        Some((ws, p)) if !ws.contains('/') && p.starts_with('/') => (Some(ws), p),
        _ => (None, uninstall_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn descendants_of_recorded_paths_are_dropped() {
        let optimized = optimize_uninstall_paths(
            &strings(&["/content/site/page"]),
            &strings(&["/content/site", "/apps/x", "/content/sitemap"]),
        );
        assert_eq!(optimized, strings(&["/apps/x", "/content/site", "/content/sitemap"]));
    }

    #[test]
    fn workspaces_do_not_cover_each_other() {
        let optimized = optimize_uninstall_paths(&strings(&["/a"]), &strings(&["other:/a/b", "/a/b"]));
        assert_eq!(optimized, strings(&["/a", "other:/a/b"]));
    }

    #[test]
    fn split_workspace_recognizes_prefix() {
        assert_eq!(split_workspace("other:/a"), (Some("other"), "/a"));
        assert_eq!(split_workspace("/a:b"), (None, "/a:b"));
        assert_eq!(split_workspace("/a"), (None, "/a"));
    }
}
