//! Readiness bookkeeping kept in memory: deferred modules, modules being
//! processed, updates that arrived while busy, and contention retries.

use contentseed_types::{ModuleId, PathEntry};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

use crate::events::{ModuleJob, ModuleState};
use crate::module::ContentModule;

/// A module whose load waits for readers to be registered.
#[derive(Clone)]
pub struct DeferredModule {
    pub module: Arc<dyn ContentModule>,
    /// Entries as parsed when the module was deferred.
    pub entries: Vec<PathEntry>,
    pub missing: BTreeSet<String>,
    pub update: bool,
}

impl std::fmt::Debug for DeferredModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredModule")
            .field("module", self.module.id())
            .field("entries", &self.entries.len())
            .field("missing", &self.missing)
            .field("update", &self.update)
            .finish()
    }
}

type PendingJob = (Arc<dyn ContentModule>, ModuleJob);

#[derive(Default)]
struct TrackerState {
    deferred: HashMap<ModuleId, DeferredModule>,
    /// Reader key to the modules deferred on it.
    waiting_on: HashMap<String, BTreeSet<ModuleId>>,
    in_flight: HashSet<ModuleId>,
    /// Latest job that arrived while the module was in flight.
    dirty: HashMap<ModuleId, PendingJob>,
    retries: VecDeque<PendingJob>,
    states: HashMap<ModuleId, ModuleState>,
}

impl TrackerState {
    fn unlink(&mut self, id: &ModuleId) -> Option<DeferredModule> {
        let deferred = self.deferred.remove(id)?;
        for key in &deferred.missing {
            if let Some(ids) = self.waiting_on.get_mut(key) {
                ids.remove(id);
                if ids.is_empty() {
                    self.waiting_on.remove(key);
                }
            }
        }
        Some(deferred)
    }
}

/// Thread-safe readiness state shared by every caller of the loader.
///
/// The lock is only held while sets are updated, never across an import.
#[derive(Default)]
pub struct ReadinessTracker {
    state: Mutex<TrackerState>,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the module for processing. Returns `false` if another caller
    /// already holds it.
    pub fn begin(&self, id: &ModuleId) -> bool {
        self.state().in_flight.insert(id.clone())
    }

    /// Remembers a job for a module that is in flight. A later job replaces
    /// an earlier one.
    pub fn mark_dirty(&self, module: Arc<dyn ContentModule>, job: ModuleJob) {
        let id = module.id().clone();
        debug!(module = %id, "module busy, marking dirty");
        self.state().dirty.insert(id, (module, job));
    }

    /// Hands back the dirty job for `id`, keeping the module claimed, or
    /// releases the claim when there is none.
    pub fn finish_or_next(&self, id: &ModuleId) -> Option<PendingJob> {
        let mut state = self.state();
        match state.dirty.remove(id) {
            Some(next) => Some(next),
            None => {
                state.in_flight.remove(id);
                None
            }
        }
    }

    /// Parks a module until every reader in `missing` is registered.
    pub fn defer(&self, deferred: DeferredModule) {
        let id = deferred.module.id().clone();
        let mut state = self.state();
        state.unlink(&id);
        for key in &deferred.missing {
            state.waiting_on.entry(key.clone()).or_default().insert(id.clone());
        }
        trace!(module = %id, missing = ?deferred.missing, "deferred");
        state.deferred.insert(id, deferred);
    }

    pub fn remove_deferred(&self, id: &ModuleId) -> Option<DeferredModule> {
        self.state().unlink(id)
    }

    /// Removes and returns every module deferred on `key`.
    pub fn take_waiting(&self, key: &str) -> Vec<DeferredModule> {
        let mut state = self.state();
        let ids = state.waiting_on.get(key).cloned().unwrap_or_default();
        ids.iter().filter_map(|id| state.unlink(id)).collect()
    }

    pub fn is_deferred(&self, id: &ModuleId) -> bool {
        self.state().deferred.contains_key(id)
    }

    /// Queues a job that lost a race on the module's record.
    pub fn queue_retry(&self, module: Arc<dyn ContentModule>, job: ModuleJob) {
        let mut state = self.state();
        let id = module.id().clone();
        state.retries.retain(|(m, _)| m.id() != &id);
        state.retries.push_back((module, job));
    }

    pub fn take_retries(&self) -> Vec<PendingJob> {
        self.state().retries.drain(..).collect()
    }

    pub fn set_state(&self, id: &ModuleId, module_state: ModuleState) {
        trace!(module = %id, state = %module_state, "state change");
        self.state().states.insert(id.clone(), module_state);
    }

    pub fn module_state(&self, id: &ModuleId) -> Option<ModuleState> {
        self.state().states.get(id).cloned()
    }

    /// Drops all tracked state.
    pub fn clear(&self) {
        let mut state = self.state();
        debug!(deferred = state.deferred.len(), retries = state.retries.len(), "clearing readiness tracker");
        *state = TrackerState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ModuleEventKind;
    use crate::module::ModulePackageBuilder;

    fn module(name: &str) -> Arc<dyn ContentModule> {
        Arc::new(ModulePackageBuilder::new(ModuleId::parse(name).unwrap()).build())
    }

    fn deferred(name: &str, missing: &[&str]) -> DeferredModule {
        DeferredModule {
            module: module(name),
            entries: Vec::new(),
            missing: missing.iter().map(|s| s.to_string()).collect(),
            update: false,
        }
    }

    #[test]
    fn waiting_modules_are_taken_once() {
        let tracker = ReadinessTracker::new();
        tracker.defer(deferred("a", &["x", "y"]));
        tracker.defer(deferred("b", &["x"]));

        let taken: Vec<_> = tracker.take_waiting("x").iter().map(|d| d.module.id().to_string()).collect();
        assert_eq!(taken, vec!["a", "b"]);
        assert!(tracker.take_waiting("y").is_empty());
        assert!(!tracker.is_deferred(&ModuleId::parse("a").unwrap()));
    }

    #[test]
    fn dirty_job_keeps_module_claimed() {
        let tracker = ReadinessTracker::new();
        let m = module("a");
        let id = m.id().clone();
        assert!(tracker.begin(&id));
        assert!(!tracker.begin(&id));

        tracker.mark_dirty(Arc::clone(&m), ModuleJob::Event(ModuleEventKind::Installed));
        tracker.mark_dirty(m, ModuleJob::Event(ModuleEventKind::Updated));

        let (_, job) = tracker.finish_or_next(&id).unwrap();
        assert_eq!(job, ModuleJob::Event(ModuleEventKind::Updated));
        assert!(!tracker.begin(&id));
        assert!(tracker.finish_or_next(&id).is_none());
        assert!(tracker.begin(&id));
    }

    #[test]
    fn retries_keep_latest_per_module() {
        let tracker = ReadinessTracker::new();
        tracker.queue_retry(module("a"), ModuleJob::Event(ModuleEventKind::Installed));
        tracker.queue_retry(module("a"), ModuleJob::Event(ModuleEventKind::Updated));
        let retries = tracker.take_retries();
        assert_eq!(retries.len(), 1);
        assert_eq!(retries[0].1, ModuleJob::Event(ModuleEventKind::Updated));
        assert!(tracker.take_retries().is_empty());
    }

    #[test]
    fn clear_forgets_everything() {
        let tracker = ReadinessTracker::new();
        let id = ModuleId::parse("a").unwrap();
        tracker.defer(deferred("a", &["x"]));
        tracker.set_state(&id, ModuleState::Loaded);
        tracker.clear();
        assert!(tracker.module_state(&id).is_none());
        assert!(tracker.take_waiting("x").is_empty());
    }
}
