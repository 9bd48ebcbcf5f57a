//! File-extension based MIME type lookup.

/// Resolves a MIME type for a file name.
pub trait MimeTypes: Send + Sync {
    fn mime_type(&self, file_name: &str) -> Option<String>;
}

/// MIME type stored when nothing better is known.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const TABLE: &[(&str, &str)] = &[
    ("css", "text/css"),
    ("csv", "text/csv"),
    ("gif", "image/gif"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("ico", "image/vnd.microsoft.icon"),
    ("jar", "application/java-archive"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("md", "text/markdown"),
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("svg", "image/svg+xml"),
    ("txt", "text/plain"),
    ("wasm", "application/wasm"),
    ("webp", "image/webp"),
    ("xml", "application/xml"),
    ("zip", "application/zip"),
];

/// A small built-in extension table.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinMimeTypes;

impl MimeTypes for BuiltinMimeTypes {
    fn mime_type(&self, file_name: &str) -> Option<String> {
        let (_, ext) = file_name.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        TABLE
            .binary_search_by(|(e, _)| (*e).cmp(ext.as_str()))
            .ok()
            .map(|i| TABLE[i].1.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sorted() {
        assert!(TABLE.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mime = BuiltinMimeTypes;
        assert_eq!(mime.mime_type("logo.PNG").as_deref(), Some("image/png"));
        assert_eq!(mime.mime_type("README"), None);
        assert_eq!(mime.mime_type("archive.unknown"), None);
    }
}
