//! Zip/jar archive reader with archive-bomb thresholds.
//!
//! The compressed archive is buffered up to a cap derived from the limits,
//! then read member by member through its central directory, so members whose
//! sizes trail their data (as `jar` and other streaming writers produce) are
//! read like any other. Entry count, cumulative decompressed size, and each
//! entry's compression ratio are checked as the bytes are inflated. Nothing
//! is handed to the creator until the whole archive has passed, so a rejected
//! archive never yields a partial tree.

use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::Threshold;
use crate::{ContentCreator, ContentReader, ImportError, ImportResult};

const CHUNK: usize = 8 * 1024;
/// Allowance per member for local and central headers, names and data
/// descriptors when capping the compressed archive.
const MEMBER_OVERHEAD: u64 = 1024;

/// Archive safety thresholds. A value is crossed when strictly exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveLimits {
    pub max_entries: u64,
    pub max_total_bytes: u64,
    /// Decompressed bytes per compressed byte, per entry.
    pub max_compression_ratio: f64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entries: 256,
            max_total_bytes: 20 * 1024 * 1024,
            max_compression_ratio: 20.0,
        }
    }
}

impl ArchiveLimits {
    fn exceeded(threshold: Threshold, limit: impl ToString, actual: impl ToString) -> ImportError {
        warn!(%threshold, "archive rejected");
        ImportError::SecurityLimit {
            threshold,
            limit: limit.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Largest compressed archive that is read at all.
    fn max_archive_bytes(&self) -> u64 {
        let overhead = self.max_entries.saturating_add(1).saturating_mul(MEMBER_OVERHEAD);
        self.max_total_bytes.saturating_add(overhead)
    }

    fn check_entries(&self, entries: u64) -> ImportResult<()> {
        if entries > self.max_entries {
            return Err(Self::exceeded(Threshold::Entries, self.max_entries, entries));
        }
        Ok(())
    }

    fn check_total(&self, total: u64) -> ImportResult<()> {
        if total > self.max_total_bytes {
            return Err(Self::exceeded(Threshold::TotalSize, self.max_total_bytes, total));
        }
        Ok(())
    }

    fn check_ratio(&self, decompressed: u64, compressed: u64) -> ImportResult<()> {
        if decompressed == 0 {
            return Ok(());
        }
        let ratio = if compressed == 0 {
            f64::INFINITY
        } else {
            decompressed as f64 / compressed as f64
        };
        if ratio > self.max_compression_ratio {
            return Err(Self::exceeded(
                Threshold::CompressionRatio,
                self.max_compression_ratio,
                format!("{ratio:.2}"),
            ));
        }
        Ok(())
    }
}

struct Member {
    name: String,
    /// `None` for directory entries.
    data: Option<Vec<u8>>,
}

/// Reads `.zip` and `.jar` archives into file nodes.
///
/// Members with a registered non-archive reader are imported through it
/// (see [`ContentCreator::import_nested`]); directories become folders.
#[derive(Debug, Clone)]
pub struct ZipReader {
    limits: ArchiveLimits,
    folder_type: String,
}

impl ZipReader {
    pub fn new(limits: ArchiveLimits) -> Self {
        Self {
            limits,
            folder_type: "nt:folder".to_string(),
        }
    }

    /// Node type used for directories inside the archive.
    pub fn with_folder_type(mut self, folder_type: impl Into<String>) -> Self {
        self.folder_type = folder_type.into();
        self
    }

    pub fn limits(&self) -> &ArchiveLimits {
        &self.limits
    }

    /// Buffers the compressed archive, refusing to read past the cap.
    fn buffer(&self, input: &mut dyn Read) -> ImportResult<Vec<u8>> {
        let cap = self.limits.max_archive_bytes();
        let mut raw = Vec::new();
        input.take(cap.saturating_add(1)).read_to_end(&mut raw)?;
        if raw.len() as u64 > cap {
            return Err(ArchiveLimits::exceeded(
                Threshold::TotalSize,
                cap,
                format!("more than {cap} compressed bytes"),
            ));
        }
        Ok(raw)
    }

    /// Reads and validates all members.
    fn scan(&self, input: &mut dyn Read) -> ImportResult<Vec<Member>> {
        let mut archive = ZipArchive::new(Cursor::new(self.buffer(input)?))?;
        let mut members = Vec::new();
        let mut entries = 0u64;
        let mut total = 0u64;
        let mut buf = vec![0u8; CHUNK];

        for index in 0..archive.len() {
            entries += 1;
            self.limits.check_entries(entries)?;

            let mut file = archive.by_index(index)?;
            let name = sanitize(file.name())?;
            if file.is_dir() {
                members.push(Member { name, data: None });
                continue;
            }

            let compressed = file.compressed_size();
            let mut data = Vec::new();
            let mut entry_bytes = 0u64;
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                entry_bytes += n as u64;
                total += n as u64;
                self.limits.check_total(total)?;
                self.limits.check_ratio(entry_bytes, compressed)?;
                data.extend_from_slice(&buf[..n]);
            }
            members.push(Member { name, data: Some(data) });
        }
        debug!(entries, total, "archive scanned");
        Ok(members)
    }
}

/// Strips leading `/` and rejects parent-directory segments.
fn sanitize(raw: &str) -> ImportResult<String> {
    let name = raw.trim_start_matches('/');
    if name.split('/').any(|segment| segment == "..") {
        return Err(ImportError::decode(format!("archive member {raw:?} escapes its root")));
    }
    Ok(name.to_string())
}

impl ContentReader for ZipReader {
    fn name(&self) -> &str {
        "zip"
    }

    fn extensions(&self) -> &[&'static str] {
        &["zip", "jar"]
    }

    fn content_types(&self) -> &[&'static str] {
        &["application/zip", "application/java-archive"]
    }

    fn is_archive(&self) -> bool {
        true
    }

    fn parse(&self, input: &mut dyn Read, creator: &mut dyn ContentCreator) -> ImportResult<()> {
        let members = self.scan(input)?;

        creator.create_node(None, Some(&self.folder_type), &[])?;
        for member in members {
            let path = member.name.trim_end_matches('/');
            if path.is_empty() {
                continue;
            }
            let Some(data) = member.data else {
                creator.switch_current_node(path, &self.folder_type)?;
                creator.finish_node()?;
                continue;
            };
            let (dir, file_name) = match path.rsplit_once('/') {
                Some((dir, file_name)) => (Some(dir), file_name),
                None => (None, path),
            };
            if let Some(dir) = dir {
                creator.switch_current_node(dir, &self.folder_type)?;
            }
            if !creator.import_nested(file_name, &data)? {
                creator.create_file(file_name, &data, None, None)?;
            }
            if dir.is_some() {
                creator.finish_node()?;
            }
        }
        creator.finish_node()
    }
}
