//! Import directives declared by a module for one source path.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::descriptor::{DescriptorEntry, parse_header};
use crate::Error;

/// Module header declaring the initial content to load.
pub const CONTENT_HEADER: &str = "Initial-Content";

/// Optional module header carrying a build timestamp in epoch milliseconds.
pub const LAST_MODIFIED_HEADER: &str = "Module-Last-Modified";

/// Replace existing nodes instead of only adding missing ones.
pub const OVERWRITE_DIRECTIVE: &str = "overwrite";
/// Replace existing property values.
pub const OVERWRITE_PROPERTIES_DIRECTIVE: &str = "overwriteProperties";
/// Merge into existing property values.
pub const MERGE_PROPERTIES_DIRECTIVE: &str = "mergeProperties";
/// Reuse existing nodes instead of failing on conflicts.
pub const MERGE_NODES_DIRECTIVE: &str = "merge";
/// Remove imported content when the module is uninstalled.
pub const UNINSTALL_DIRECTIVE: &str = "uninstall";
/// Target node path for the import.
pub const PATH_DIRECTIVE: &str = "path";
/// Store workspace to import into.
pub const WORKSPACE_DIRECTIVE: &str = "workspace";
/// Check in versionable nodes after the import.
pub const CHECKIN_DIRECTIVE: &str = "checkin";
/// Check out versionable nodes transparently when they must be modified.
pub const AUTO_CHECKOUT_DIRECTIVE: &str = "autoCheckout";
/// Reader extensions that must not be used for this entry.
pub const IGNORE_READERS_DIRECTIVE: &str = "ignoreImportProviders";
/// Reader extensions that must be registered before this entry is imported.
pub const REQUIRE_READERS_DIRECTIVE: &str = "requireImportProviders";

/// One declared source path with its import policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    /// Path inside the module.
    pub source_path: String,
    /// Target node path; `None` means the store root.
    pub target_path: Option<String>,
    pub overwrite_nodes: bool,
    pub overwrite_properties: bool,
    pub merge_nodes: bool,
    pub merge_properties: bool,
    pub uninstall_on_remove: bool,
    pub checkin_versionable: bool,
    pub auto_checkout_versionable: bool,
    /// Stored as written; a leading `.` is stripped only when looking up.
    pub ignored_reader_extensions: BTreeSet<String>,
    pub required_reader_extensions: BTreeSet<String>,
    pub target_namespace: Option<String>,
    pub source_last_modified: Option<DateTime<Utc>>,
}

impl PathEntry {
    /// Creates an entry for `source_path` with every directive at its default.
    pub fn new(source_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            target_path: None,
            overwrite_nodes: false,
            overwrite_properties: false,
            merge_nodes: false,
            merge_properties: false,
            uninstall_on_remove: false,
            checkin_versionable: false,
            auto_checkout_versionable: true,
            ignored_reader_extensions: BTreeSet::new(),
            required_reader_extensions: BTreeSet::new(),
            target_namespace: None,
            source_last_modified: None,
        }
    }

    /// Builds an entry from one tokenized descriptor clause.
    pub fn from_descriptor(entry: &DescriptorEntry, last_modified: Option<DateTime<Utc>>) -> Self {
        let flag = |name: &str| entry.directive(name).map(parse_bool);

        let overwrite_nodes = flag(OVERWRITE_DIRECTIVE).unwrap_or(false);
        Self {
            source_path: entry.value.clone(),
            target_path: entry.directive(PATH_DIRECTIVE).map(str::to_string),
            overwrite_nodes,
            overwrite_properties: flag(OVERWRITE_PROPERTIES_DIRECTIVE).unwrap_or(false),
            merge_nodes: flag(MERGE_NODES_DIRECTIVE).unwrap_or(false),
            merge_properties: flag(MERGE_PROPERTIES_DIRECTIVE).unwrap_or(false),
            uninstall_on_remove: flag(UNINSTALL_DIRECTIVE).unwrap_or(overwrite_nodes),
            checkin_versionable: flag(CHECKIN_DIRECTIVE).unwrap_or(false),
            auto_checkout_versionable: flag(AUTO_CHECKOUT_DIRECTIVE).unwrap_or(true),
            ignored_reader_extensions: entry
                .directive(IGNORE_READERS_DIRECTIVE)
                .map(parse_list)
                .unwrap_or_default(),
            required_reader_extensions: entry
                .directive(REQUIRE_READERS_DIRECTIVE)
                .map(parse_list)
                .unwrap_or_default(),
            target_namespace: entry.directive(WORKSPACE_DIRECTIVE).map(str::to_string),
            source_last_modified: last_modified,
        }
    }

    /// Parses a raw descriptor string into its path entries.
    pub fn parse_all(descriptor: &str, last_modified: Option<DateTime<Utc>>) -> Result<Vec<Self>, Error> {
        Ok(parse_header(descriptor)?
            .iter()
            .map(|entry| Self::from_descriptor(entry, last_modified))
            .collect())
    }

    /// Reads the content header from a module's headers.
    ///
    /// Returns `Ok(None)` when the module declares no initial content at all,
    /// which callers treat differently from a declared-but-empty header. The
    /// `Module-Last-Modified` header, when present and parsable, lowers the
    /// effective timestamp.
    pub fn from_headers(
        headers: &HashMap<String, String>,
        module_last_modified: Option<DateTime<Utc>>,
    ) -> Result<Option<Vec<Self>>, Error> {
        let Some(descriptor) = headers.get(CONTENT_HEADER) else {
            return Ok(None);
        };
        let stamp = match headers.get(LAST_MODIFIED_HEADER) {
            Some(raw) => Some(parse_millis(raw)?),
            None => None,
        };
        let last_modified = match (module_last_modified, stamp) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self::parse_all(descriptor, last_modified).map(Some)
    }

    /// Whether the reader registered for `extension` must be skipped.
    pub fn is_ignored_reader(&self, extension: &str) -> bool {
        let extension = extension.strip_prefix('.').unwrap_or(extension);
        self.ignored_reader_extensions
            .iter()
            .any(|e| e.strip_prefix('.').unwrap_or(e) == extension)
    }

    /// Required reader extensions with any leading `.` removed.
    pub fn required_readers(&self) -> impl Iterator<Item = &str> {
        self.required_reader_extensions
            .iter()
            .map(|e| e.strip_prefix('.').unwrap_or(e))
    }

    /// The target node path, defaulting to the store root.
    pub fn target(&self) -> &str {
        self.target_path.as_deref().unwrap_or("/")
    }
}

fn parse_bool(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

fn parse_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_millis(raw: &str) -> Result<DateTime<Utc>, Error> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| Error::InvalidTimestamp(raw.to_string()))
}
