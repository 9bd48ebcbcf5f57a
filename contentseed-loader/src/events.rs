//! Lifecycle events delivered by the host, and the per-module state machine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use contentseed_types::PathEntry;

/// A host lifecycle notification for one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleEventKind {
    Installed,
    Updated,
    Resolved,
    Uninstalled,
}

/// Where a module stands in the loading state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ModuleState {
    Pending,
    ReadyCheck,
    /// Waiting for the named readers to be registered.
    Deferred { missing: BTreeSet<String> },
    Loading,
    Loaded,
    Failed { error: String },
    Unloading,
    Unloaded,
    /// The module declares no initial content.
    NoContent,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::ReadyCheck => f.write_str("ready-check"),
            Self::Deferred { missing } => {
                let missing: Vec<_> = missing.iter().map(String::as_str).collect();
                write!(f, "deferred on {}", missing.join(", "))
            }
            Self::Loading => f.write_str("loading"),
            Self::Loaded => f.write_str("loaded"),
            Self::Failed { error } => write!(f, "failed: {error}"),
            Self::Unloading => f.write_str("unloading"),
            Self::Unloaded => f.write_str("unloaded"),
            Self::NoContent => f.write_str("no content"),
        }
    }
}

/// Work queued for a module.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleJob {
    /// A lifecycle event as delivered.
    Event(ModuleEventKind),
    /// A deferred load resumed with the entries captured at deferral time.
    Resume { entries: Vec<PathEntry>, update: bool },
}
