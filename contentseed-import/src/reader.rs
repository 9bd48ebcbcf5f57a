//! Content reader trait and the runtime reader registry.

use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::archive::{ArchiveLimits, ZipReader};
use crate::json::JsonReader;
use crate::{ContentCreator, ImportResult};

/// Decodes one content format into structural events.
///
/// Implementations must not close or drain `input` beyond what they decode.
pub trait ContentReader: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// File extensions handled, without the leading `.`.
    fn extensions(&self) -> &[&'static str];

    /// MIME types handled.
    fn content_types(&self) -> &[&'static str] {
        &[]
    }

    /// Whether the format is a container of other files.
    fn is_archive(&self) -> bool {
        false
    }

    fn parse(&self, input: &mut dyn Read, creator: &mut dyn ContentCreator) -> ImportResult<()>;
}

/// Registered readers keyed by extension or MIME type.
///
/// Keys are compared without a leading `.` and case-insensitively.
#[derive(Default)]
pub struct ReaderRegistry {
    readers: RwLock<HashMap<String, Arc<dyn ContentReader>>>,
}

impl std::fmt::Debug for ReaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

fn normalize_key(key: &str) -> String {
    key.strip_prefix('.').unwrap_or(key).to_ascii_lowercase()
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the JSON, ordered JSON and zip/jar readers.
    pub fn with_builtin(limits: ArchiveLimits) -> Self {
        let registry = Self::new();
        registry.register_reader(Arc::new(JsonReader::new()));
        registry.register_reader(Arc::new(JsonReader::ordered()));
        registry.register_reader(Arc::new(ZipReader::new(limits)));
        registry
    }

    /// Registers `reader` under one key, returning the reader it replaced.
    pub fn register(&self, key: &str, reader: Arc<dyn ContentReader>) -> Option<Arc<dyn ContentReader>> {
        let key = normalize_key(key);
        debug!(key = %key, reader = reader.name(), "reader registered");
        self.readers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, reader)
    }

    /// Registers `reader` under all its extensions and MIME types and returns
    /// the extension keys.
    pub fn register_reader(&self, reader: Arc<dyn ContentReader>) -> Vec<String> {
        for content_type in reader.content_types() {
            self.register(content_type, Arc::clone(&reader));
        }
        reader
            .extensions()
            .iter()
            .map(|ext| {
                self.register(ext, Arc::clone(&reader));
                normalize_key(ext)
            })
            .collect()
    }

    pub fn unregister(&self, key: &str) -> Option<Arc<dyn ContentReader>> {
        let key = normalize_key(key);
        let removed = self
            .readers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        if removed.is_some() {
            debug!(key = %key, "reader unregistered");
        }
        removed
    }

    pub fn lookup(&self, key: &str) -> Option<Arc<dyn ContentReader>> {
        self.readers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize_key(key))
            .cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.readers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&normalize_key(key))
    }

    /// All registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self
            .readers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Finds the reader for a file by its extension, returning the extension
    /// and the reader.
    pub fn reader_for_file(&self, file_name: &str) -> Option<(String, Arc<dyn ContentReader>)> {
        let (_, ext) = file_name.rsplit_once('.')?;
        let ext = normalize_key(ext);
        self.lookup(&ext).map(|reader| (ext, reader))
    }
}
