//! The loading engine.
//!
//! [`ContentLoader`] reacts to module lifecycle events: it parses the
//! module's content header, waits until the readers the entries need are
//! registered, imports every entry into the store and keeps the module's
//! content record up to date. Uninstalling a module removes the nodes its
//! record lists.

use chrono::Utc;
use contentseed_import::{
    BuiltinMimeTypes, ContentReader, ImportResult, ImportSummary, MimeTypes, ReaderRegistry,
};
use contentseed_store::{ContentRepository, ContentSession};
use contentseed_types::{ModuleId, PathEntry};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::bookkeeping::{
    Bookkeeping, ModuleContentInfo, ensure_node_path, optimize_uninstall_paths, split_workspace,
};
use crate::config::{LoaderConfig, TargetFilter};
use crate::events::{ModuleEventKind, ModuleJob, ModuleState};
use crate::installer::Installer;
use crate::module::ContentModule;
use crate::tracker::{DeferredModule, ReadinessTracker};
use crate::{LoaderError, LoaderResult};

fn reader_key(key: &str) -> String {
    key.strip_prefix('.').unwrap_or(key).to_ascii_lowercase()
}

/// Loads and unloads module content. Safe to share between threads; each
/// module is processed by one caller at a time.
pub struct ContentLoader {
    repository: Arc<dyn ContentRepository>,
    readers: Arc<ReaderRegistry>,
    mime: Arc<dyn MimeTypes>,
    config: LoaderConfig,
    filter: TargetFilter,
    bookkeeping: Bookkeeping,
    tracker: ReadinessTracker,
}

impl ContentLoader {
    /// Creates a loader with the built-in readers and MIME table.
    pub fn new(repository: Arc<dyn ContentRepository>, config: LoaderConfig) -> LoaderResult<Self> {
        let filter = config.target_filter()?;
        let readers = Arc::new(ReaderRegistry::with_builtin(config.archive));
        let bookkeeping = Bookkeeping::new(Arc::clone(&repository), &config.bookkeeping_root);
        info!(
            instance = %config.instance_name,
            readers = ?readers.keys(),
            "content loader started"
        );
        Ok(Self {
            repository,
            readers,
            mime: Arc::new(BuiltinMimeTypes),
            config,
            filter,
            bookkeeping,
            tracker: ReadinessTracker::new(),
        })
    }

    /// Replaces the reader registry, e.g. to start without built-in readers.
    pub fn with_readers(mut self, readers: Arc<ReaderRegistry>) -> Self {
        self.readers = readers;
        self
    }

    pub fn with_mime_types(mut self, mime: Arc<dyn MimeTypes>) -> Self {
        self.mime = mime;
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn readers(&self) -> &ReaderRegistry {
        &self.readers
    }

    // ── Reader registration ──────────────────────────────────────

    /// Registers a reader under `key` and resumes modules waiting on it.
    pub fn register_reader(&self, key: &str, reader: Arc<dyn ContentReader>) {
        if self.readers.register(key, reader).is_some() {
            debug!(reader = key, "replaced content reader");
        }
        info!(reader = key, "content reader registered");
        self.resume_waiting(&[reader_key(key)]);
        self.run_retries();
    }

    /// Registers a reader under all of its extensions and MIME types.
    pub fn register_reader_all(&self, reader: Arc<dyn ContentReader>) {
        let name = reader.name().to_string();
        let keys = self.readers.register_reader(reader);
        info!(reader = %name, keys = ?keys, "content reader registered");
        self.resume_waiting(&keys);
        self.run_retries();
    }

    /// Removes a reader. Content it already imported stays.
    pub fn unregister_reader(&self, key: &str) -> Option<Arc<dyn ContentReader>> {
        let removed = self.readers.unregister(key);
        if removed.is_some() {
            info!(reader = key, "content reader unregistered");
        }
        removed
    }

    fn resume_waiting(&self, keys: &[String]) {
        for key in keys {
            for deferred in self.tracker.take_waiting(key) {
                let id = deferred.module.id().clone();
                let missing = self.missing_readers(&deferred.entries);
                if !missing.is_empty() {
                    trace!(module = %id, missing = ?missing, "still waiting on readers");
                    self.tracker.set_state(&id, ModuleState::Deferred { missing: missing.clone() });
                    self.tracker.defer(DeferredModule { missing, ..deferred });
                    continue;
                }
                info!(module = %id, reader = %key, "resuming deferred module");
                let DeferredModule { module, entries, update, .. } = deferred;
                self.submit(module, ModuleJob::Resume { entries, update });
            }
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Handles one lifecycle event and returns the module's resulting state.
    ///
    /// If the module is already being processed by another caller the event
    /// is remembered and handled as soon as that caller finishes; the
    /// returned state is then the one in effect at the time of the call.
    pub fn on_module_event(&self, module: Arc<dyn ContentModule>, kind: ModuleEventKind) -> ModuleState {
        debug!(module = %module.id(), event = ?kind, "module event");
        let state = self.submit(module, ModuleJob::Event(kind));
        if matches!(state, ModuleState::Loaded | ModuleState::Unloaded) {
            self.run_retries();
        }
        state
    }

    pub fn module_state(&self, id: &ModuleId) -> Option<ModuleState> {
        self.tracker.module_state(id)
    }

    /// The module's content record, or `None` if the module is unknown or
    /// its record is locked right now.
    pub fn module_content_info(&self, id: &ModuleId) -> Option<ModuleContentInfo> {
        match self.bookkeeping.info(id) {
            Ok(info) => info,
            Err(e) => {
                warn!(module = %id, "failed to read content record: {}", e);
                None
            }
        }
    }

    /// Forgets deferred modules and pending retries.
    pub fn shutdown(&self) {
        info!("content loader shutting down");
        self.tracker.clear();
    }

    fn submit(&self, module: Arc<dyn ContentModule>, job: ModuleJob) -> ModuleState {
        let id = module.id().clone();
        if !self.tracker.begin(&id) {
            let current = self.tracker.module_state(&id).unwrap_or(ModuleState::Pending);
            self.tracker.mark_dirty(module, job);
            return current;
        }

        let (mut module, mut job) = (module, job);
        loop {
            let state = self.process(&module, job);
            self.tracker.set_state(&id, state.clone());
            match self.tracker.finish_or_next(&id) {
                Some((next_module, next_job)) => {
                    debug!(module = %id, "re-evaluating module changed during processing");
                    module = next_module;
                    job = next_job;
                }
                None => return state,
            }
        }
    }

    fn run_retries(&self) {
        for (module, job) in self.tracker.take_retries() {
            debug!(module = %module.id(), "retrying after contention");
            self.submit(module, job);
        }
    }

    fn process(&self, module: &Arc<dyn ContentModule>, job: ModuleJob) -> ModuleState {
        match job {
            ModuleJob::Event(ModuleEventKind::Uninstalled) => self.unload(module),
            ModuleJob::Event(kind) => self.load(module, None, kind == ModuleEventKind::Updated),
            ModuleJob::Resume { entries, update } => self.load(module, Some(entries), update),
        }
    }

    // ── Loading ──────────────────────────────────────────────────

    fn missing_readers(&self, entries: &[PathEntry]) -> BTreeSet<String> {
        let mut missing = BTreeSet::new();
        for entry in entries {
            let mut required: Vec<String> = entry.required_readers().map(reader_key).collect();
            if required.is_empty() {
                required = self.config.default_required_readers.iter().map(|r| reader_key(r)).collect();
            }
            missing.extend(required.into_iter().filter(|key| !self.readers.contains(key)));
        }
        missing
    }

    fn load(&self, module: &Arc<dyn ContentModule>, entries: Option<Vec<PathEntry>>, update: bool) -> ModuleState {
        let id = module.id().clone();
        self.tracker.set_state(&id, ModuleState::Pending);

        let entries = match entries {
            Some(entries) => entries,
            None => match PathEntry::from_headers(module.headers(), module.last_modified()) {
                Ok(Some(entries)) => entries,
                Ok(None) => {
                    self.tracker.remove_deferred(&id);
                    debug!(module = %id, "module declares no initial content");
                    return ModuleState::NoContent;
                }
                Err(e) => {
                    self.tracker.remove_deferred(&id);
                    let e = LoaderError::from(e);
                    error!(module = %id, "{}", e);
                    return ModuleState::Failed { error: e.to_string() };
                }
            },
        };

        self.tracker.set_state(&id, ModuleState::ReadyCheck);
        let missing = self.missing_readers(&entries);
        if !missing.is_empty() {
            info!(module = %id, missing = ?missing, "deferring content until readers are registered");
            self.tracker.defer(DeferredModule {
                module: Arc::clone(module),
                entries: entries.clone(),
                missing: missing.clone(),
                update,
            });
            // A reader registered since the check above would not have seen
            // the deferral; take it back and load now.
            if !self.missing_readers(&entries).is_empty() || self.tracker.remove_deferred(&id).is_none() {
                return ModuleState::Deferred { missing };
            }
        }
        self.tracker.remove_deferred(&id);

        self.tracker.set_state(&id, ModuleState::Loading);
        match self.load_entries(module.as_ref(), &entries, update) {
            Ok(()) => {
                info!(module = %id, entries = entries.len(), "initial content loaded");
                ModuleState::Loaded
            }
            Err(LoaderError::ConcurrentModification { .. }) => {
                warn!(module = %id, "content record busy, will retry");
                self.tracker
                    .queue_retry(Arc::clone(module), ModuleJob::Resume { entries, update });
                ModuleState::Pending
            }
            Err(e) => {
                error!(module = %id, "failed to load initial content: {}", e);
                ModuleState::Failed { error: e.to_string() }
            }
        }
    }

    fn load_entries(&self, module: &dyn ContentModule, entries: &[PathEntry], update: bool) -> LoaderResult<()> {
        let id = module.id();

        let (already_loaded, plan) = self.bookkeeping.update(id, |record| {
            if !record.loaded {
                return Ok((false, entries.to_vec()));
            }
            let plan: Vec<PathEntry> = entries
                .iter()
                .filter(|entry| {
                    let newer = match (entry.source_last_modified, record.loaded_at) {
                        (Some(modified), Some(loaded_at)) => modified > loaded_at,
                        (Some(_), None) => true,
                        (None, _) => false,
                    };
                    let reload = update || newer || entry.overwrite_nodes;
                    if !reload {
                        trace!(module = %id, source = %entry.source_path, "content already loaded");
                    }
                    reload
                })
                .map(|entry| {
                    let mut entry = entry.clone();
                    if !entry.overwrite_nodes {
                        entry.merge_nodes = true;
                    }
                    entry
                })
                .collect();
            Ok((true, plan))
        })?;

        if already_loaded && plan.is_empty() {
            debug!(module = %id, "content is up to date");
            return Ok(());
        }

        let mut created = Vec::new();
        for entry in &plan {
            let target = entry.target();
            if !self.filter.allows(target) {
                warn!(module = %id, target_path = target, "target path is not allowed, skipping entry");
                continue;
            }
            created.extend(self.install_entry(module, entry)?);
        }

        let instance = self.config.instance_name.clone();
        self.bookkeeping.update(id, |record| {
            record.loaded = true;
            record.loaded_at = Some(Utc::now());
            record.loaded_by = Some(instance);
            record.uninstall_paths = optimize_uninstall_paths(&record.uninstall_paths, &created);
            Ok(())
        })
    }

    /// Imports one entry in its own session. Returns the uninstall paths it
    /// contributes.
    fn install_entry(&self, module: &dyn ContentModule, entry: &PathEntry) -> LoaderResult<Vec<String>> {
        let mut session = self.repository.login(entry.target_namespace.as_deref())?;
        ensure_node_path(session.as_mut(), entry.target(), &self.config.folder_node_type)?;

        let summary = match self.import_entry(session.as_mut(), module, entry) {
            Ok(summary) => summary,
            Err(source) => {
                session.refresh();
                return Err(LoaderError::Import {
                    source_path: entry.source_path.clone(),
                    source,
                });
            }
        };
        debug!(
            module = %module.id(),
            source = %entry.source_path,
            target_path = entry.target(),
            created = summary.created_paths.len(),
            "entry imported"
        );

        if !entry.uninstall_on_remove {
            return Ok(Vec::new());
        }
        Ok(summary
            .created_paths
            .into_iter()
            .map(|p| match &entry.target_namespace {
                Some(ws) => format!("{ws}:{p}"),
                None => p,
            })
            .collect())
    }

    fn import_entry(
        &self,
        session: &mut dyn ContentSession,
        module: &dyn ContentModule,
        entry: &PathEntry,
    ) -> ImportResult<ImportSummary> {
        let installer = Installer::new(module, &self.readers, self.mime.as_ref(), &self.config.folder_node_type);
        let summary = installer.install(session, entry, entry.target())?;
        session.save()?;

        if !summary.versionables.is_empty() {
            for path in &summary.versionables {
                trace!(path = %path, "checking in");
                session.checkin(path)?;
            }
            session.save()?;
        }
        Ok(summary)
    }

    // ── Unloading ────────────────────────────────────────────────

    fn unload(&self, module: &Arc<dyn ContentModule>) -> ModuleState {
        let id = module.id().clone();
        self.tracker.remove_deferred(&id);
        self.tracker.set_state(&id, ModuleState::Unloading);

        let instance = self.config.instance_name.clone();
        let result = self.bookkeeping.update(&id, |record| {
            if !record.loaded {
                debug!(module = %id, "no loaded content to remove");
                return Ok(());
            }
            for uninstall_path in &record.uninstall_paths {
                self.remove_path(uninstall_path)?;
            }
            record.loaded = false;
            record.unloaded_by = Some(instance);
            record.unloaded_at = Some(Utc::now());
            record.uninstall_paths.clear();
            Ok(())
        });

        match result {
            Ok(()) => {
                info!(module = %id, "initial content unloaded");
                ModuleState::Unloaded
            }
            Err(LoaderError::ConcurrentModification { .. }) => {
                warn!(module = %id, "content record busy, will retry unload");
                self.tracker.queue_retry(
                    Arc::clone(module),
                    ModuleJob::Event(ModuleEventKind::Uninstalled),
                );
                ModuleState::Pending
            }
            Err(e) => {
                error!(module = %id, "failed to unload initial content: {}", e);
                ModuleState::Failed { error: e.to_string() }
            }
        }
    }

    fn remove_path(&self, uninstall_path: &str) -> LoaderResult<()> {
        let (workspace, node) = split_workspace(uninstall_path);
        let mut session = self.repository.login(workspace)?;
        if !session.node_exists(node)? {
            trace!(path = uninstall_path, "already gone");
            return Ok(());
        }
        session.remove_node(node)?;
        session.save()?;
        debug!(path = uninstall_path, "removed");
        Ok(())
    }
}
