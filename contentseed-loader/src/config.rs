//! Loader configuration.
//!
//! Loaded from a TOML file; any field left out takes its default. A missing
//! or unreadable file yields the defaults.
//!
//! ```toml
//! default_required_readers = ["json"]
//! included_targets = ["^/content/.*$"]
//! excluded_targets = ["^/content/private(/.*)?$"]
//!
//! [archive]
//! max_entries = 128
//! ```

use contentseed_import::ArchiveLimits;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::{LoaderError, LoaderResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Readers every path entry needs unless it names its own.
    pub default_required_readers: Vec<String>,
    /// A target path must match one of these to be imported.
    pub included_targets: Vec<String>,
    /// A target path matching one of these is never imported.
    pub excluded_targets: Vec<String>,
    /// Parent of the per-module bookkeeping nodes.
    pub bookkeeping_root: String,
    /// Recorded as the unloading instance.
    pub instance_name: String,
    /// Node type for directories and missing target ancestors.
    pub folder_node_type: String,
    pub archive: ArchiveLimits,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            default_required_readers: vec!["json".to_string()],
            included_targets: vec!["^/.*$".to_string()],
            excluded_targets: Vec::new(),
            bookkeeping_root: "/var/contentseed/modules".to_string(),
            instance_name: default_instance_name(),
            folder_node_type: "nt:folder".to_string(),
            archive: ArchiveLimits::default(),
        }
    }
}

fn default_instance_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "contentseed".to_string())
}

impl LoaderConfig {
    /// Loads configuration from `path`, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("No loader config at {:?}, using defaults", path);
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!("Loaded loader config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse loader config {:?}: {}. Using defaults.", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read loader config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Compiles the include/exclude patterns.
    pub fn target_filter(&self) -> LoaderResult<TargetFilter> {
        Ok(TargetFilter {
            included: compile(&self.included_targets)?,
            excluded: compile(&self.excluded_targets)?,
        })
    }
}

fn compile(patterns: &[String]) -> LoaderResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| LoaderError::Config(format!("bad target pattern {p:?}: {e}"))))
        .collect()
}

/// Decides which target paths may receive content.
#[derive(Debug, Clone)]
pub struct TargetFilter {
    included: Vec<Regex>,
    excluded: Vec<Regex>,
}

impl TargetFilter {
    pub fn allows(&self, target: &str) -> bool {
        self.included.iter().any(|r| r.is_match(target)) && !self.excluded.iter().any(|r| r.is_match(target))
    }
}
