//! Walks one path entry's source inside a module and feeds it to a
//! [`TreeBuilder`].

use contentseed_import::{
    ContentCreator, ContentReader, ImportResult, ImportSummary, MimeTypes, ReaderRegistry, TreeBuilder,
};
use contentseed_store::ContentSession;
use contentseed_types::PathEntry;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::module::ContentModule;

/// Installs module files into a session. Saving is left to the caller.
pub struct Installer<'a> {
    module: &'a dyn ContentModule,
    readers: &'a ReaderRegistry,
    mime: &'a dyn MimeTypes,
    folder_type: &'a str,
}

impl<'a> Installer<'a> {
    pub fn new(
        module: &'a dyn ContentModule,
        readers: &'a ReaderRegistry,
        mime: &'a dyn MimeTypes,
        folder_type: &'a str,
    ) -> Self {
        Self {
            module,
            readers,
            mime,
            folder_type,
        }
    }

    /// Imports `entry`'s source below `target`.
    ///
    /// A source that is a file is imported through its reader, or stored as
    /// a file node. A directory is walked recursively. A source that does
    /// not exist in the module imports nothing.
    pub fn install(
        &self,
        session: &mut dyn ContentSession,
        entry: &PathEntry,
        target: &str,
    ) -> ImportResult<ImportSummary> {
        let source = entry.source_path.trim_matches('/');

        if let Some(data) = self.module.entry(source) {
            let mut builder = TreeBuilder::new(session, entry, target, self.mime)?.with_readers(self.readers);
            self.install_file(&mut builder, entry, file_name(source), data)?;
            return Ok(builder.finish());
        }

        if self.module.entry_paths(source).is_some() {
            let mut builder = TreeBuilder::new(session, entry, target, self.mime)?.with_readers(self.readers);
            self.import_parent_descriptor(&mut builder, entry, source)?;
            self.walk(&mut builder, entry, source)?;
            return Ok(builder.finish());
        }

        warn!(module = %self.module.id(), source = %entry.source_path, "content source not found in module");
        Ok(ImportSummary::default())
    }

    /// Applies `<dir>.<ext>` next to the source directory to the target node.
    fn import_parent_descriptor(
        &self,
        builder: &mut TreeBuilder<'_>,
        entry: &PathEntry,
        dir: &str,
    ) -> ImportResult<()> {
        if dir.is_empty() {
            return Ok(());
        }
        for ext in self.readers.keys() {
            let candidate = format!("{dir}.{ext}");
            let Some(data) = self.module.entry(&candidate) else {
                continue;
            };
            let Some(reader) = self.usable_reader(entry, &ext) else {
                continue;
            };
            if reader.is_archive() {
                continue;
            }
            debug!(descriptor = %candidate, "importing parent node descriptor");
            builder.set_default_name(None);
            builder.set_parent_import(true);
            let result = reader.parse(&mut &data[..], builder);
            builder.set_parent_import(false);
            result?;
            return Ok(());
        }
        Ok(())
    }

    fn walk(&self, builder: &mut TreeBuilder<'_>, entry: &PathEntry, dir: &str) -> ImportResult<()> {
        let children = self.module.entry_paths(dir).unwrap_or_default();
        let (dirs, files): (Vec<_>, Vec<_>) = children.into_iter().partition(|c| c.ends_with('/'));

        for file in &files {
            if let Some(data) = self.module.entry(file) {
                self.install_file(builder, entry, file_name(file), data)?;
            }
        }

        for sub in &dirs {
            let sub = sub.trim_end_matches('/');
            trace!(dir = %sub, "descending");
            builder.switch_current_node(file_name(sub), self.folder_type)?;
            self.walk(builder, entry, sub)?;
            builder.finish_node()?;
        }
        Ok(())
    }

    fn install_file(
        &self,
        builder: &mut TreeBuilder<'_>,
        entry: &PathEntry,
        name: &str,
        data: &[u8],
    ) -> ImportResult<()> {
        if let Some((ext, reader)) = self.readers.reader_for_file(name) {
            let stem = &name[..name.len() - ext.len() - 1];
            if !stem.is_empty() && !entry.is_ignored_reader(&ext) {
                debug!(file = name, reader = reader.name(), "decoding content file");
                builder.set_default_name(Some(stem));
                let result = reader.parse(&mut &data[..], builder);
                builder.set_default_name(None);
                return result;
            }
        }
        builder.create_file(name, data, None, entry.source_last_modified)
    }

    fn usable_reader(&self, entry: &PathEntry, ext: &str) -> Option<Arc<dyn ContentReader>> {
        if entry.is_ignored_reader(ext) {
            return None;
        }
        self.readers.lookup(ext)
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
