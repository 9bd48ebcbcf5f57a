//! Deployable modules and the zip package format.
//!
//! A module package is a zip archive holding a `manifest.toml` and the
//! module's files:
//!
//! ```toml
//! id = "org.example.site"
//! last_modified = "2024-05-01T10:00:00Z"
//!
//! [headers]
//! Initial-Content = "SLING-INF/content;path:=/content/site"
//! ```

use chrono::{DateTime, Utc};
use contentseed_types::{CONTENT_HEADER, ModuleId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{Read, Seek, Write};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::{LoaderError, LoaderResult};

const MANIFEST_ENTRY: &str = "manifest.toml";

/// A deployable unit carrying content headers and files.
///
/// Paths are relative and `/`-separated. Directory listings end directory
/// names in `/`.
pub trait ContentModule: Send + Sync {
    fn id(&self) -> &ModuleId;

    fn headers(&self) -> &HashMap<String, String>;

    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).map(String::as_str)
    }

    fn last_modified(&self) -> Option<DateTime<Utc>>;

    /// Direct children of directory `dir`, sorted, or `None` if no such
    /// directory exists. `""` is the module root.
    fn entry_paths(&self, dir: &str) -> Option<Vec<String>>;

    /// Contents of the file at `path`.
    fn entry(&self, path: &str) -> Option<&[u8]>;
}

/// Manifest stored in every module package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub id: ModuleId,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// An opened module package, held in memory.
#[derive(Debug, Clone)]
pub struct ModulePackage {
    manifest: ModuleManifest,
    headers: HashMap<String, String>,
    files: BTreeMap<String, Vec<u8>>,
}

impl ModulePackage {
    /// Opens and parses a module package from a reader.
    pub fn open<R: Read + Seek>(reader: R) -> LoaderResult<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut manifest_bytes = None;
        let mut files = BTreeMap::new();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().trim_start_matches('/').to_string();
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;

            if name == MANIFEST_ENTRY {
                manifest_bytes = Some(data);
            } else {
                files.insert(name, data);
            }
        }

        let manifest_bytes = manifest_bytes
            .ok_or_else(|| LoaderError::Package(format!("missing {MANIFEST_ENTRY}")))?;
        let manifest: ModuleManifest = toml::from_str(
            std::str::from_utf8(&manifest_bytes).map_err(|e| LoaderError::Package(e.to_string()))?,
        )?;
        Ok(Self::from_parts(manifest, files))
    }

    fn from_parts(manifest: ModuleManifest, files: BTreeMap<String, Vec<u8>>) -> Self {
        let headers = manifest
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            manifest,
            headers,
            files,
        }
    }

    pub fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

impl ContentModule for ModulePackage {
    fn id(&self) -> &ModuleId {
        &self.manifest.id
    }

    fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.manifest.last_modified
    }

    fn entry_paths(&self, dir: &str) -> Option<Vec<String>> {
        let dir = dir.trim_matches('/');
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };
        let children: BTreeSet<String> = self
            .files
            .keys()
            .filter_map(|name| name.strip_prefix(&prefix))
            .map(|rest| match rest.split_once('/') {
                Some((child_dir, _)) => format!("{prefix}{child_dir}/"),
                None => format!("{prefix}{rest}"),
            })
            .collect();
        if children.is_empty() && !dir.is_empty() {
            return None;
        }
        Some(children.into_iter().collect())
    }

    fn entry(&self, path: &str) -> Option<&[u8]> {
        self.files
            .get(path.trim_start_matches('/'))
            .map(Vec::as_slice)
    }
}

/// Fluent builder for module packages.
#[derive(Debug, Clone)]
pub struct ModulePackageBuilder {
    manifest: ModuleManifest,
    files: BTreeMap<String, Vec<u8>>,
}

impl ModulePackageBuilder {
    pub fn new(id: ModuleId) -> Self {
        Self {
            manifest: ModuleManifest {
                id,
                last_modified: None,
                headers: BTreeMap::new(),
            },
            files: BTreeMap::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.manifest.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Sets the initial content descriptor.
    pub fn content(self, descriptor: &str) -> Self {
        self.header(CONTENT_HEADER, descriptor)
    }

    pub fn last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.manifest.last_modified = Some(at);
        self
    }

    pub fn file(mut self, path: &str, data: impl Into<Vec<u8>>) -> Self {
        self.files
            .insert(path.trim_start_matches('/').to_string(), data.into());
        self
    }

    /// Builds the package in memory.
    pub fn build(self) -> ModulePackage {
        ModulePackage::from_parts(self.manifest, self.files)
    }

    /// Builds the zip archive and returns the raw bytes.
    pub fn to_bytes(&self) -> LoaderResult<Vec<u8>> {
        let buf = std::io::Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(buf);
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let manifest_toml = toml::to_string_pretty(&self.manifest)?;
        zip.start_file(MANIFEST_ENTRY, options)?;
        zip.write_all(manifest_toml.as_bytes())?;

        for (name, data) in &self.files {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }

        Ok(zip.finish()?.into_inner())
    }
}
