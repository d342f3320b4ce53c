//! Virtual file table
//!
//! In-memory mapping from normalized relative path to content and content
//! type. Built once per successful package load, then moved into the
//! interceptor. Nothing here ever touches disk.

use crate::archive::{mime_type_for, ArchiveEntry};
use bytes::Bytes;
use std::collections::HashMap;
use tracing::debug;

/// Served in place of an empty path or a directory path
pub const INDEX_FILE: &str = "index.html";

/// Normalize a request or archive path to a table key
///
/// Leading `./` and `/` are stripped; an empty path or one naming a
/// directory (trailing `/`) resolves to its `index.html`. Applying this
/// twice gives the same result as applying it once.
pub fn normalize_path(path: &str) -> String {
    let mut rest = path;
    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('/') {
            rest = stripped;
        } else {
            break;
        }
    }

    if rest.is_empty() || rest.ends_with('/') {
        format!("{}{}", rest, INDEX_FILE)
    } else {
        rest.to_string()
    }
}

/// A servable file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFile {
    pub bytes: Bytes,
    pub mime_type: String,
}

/// Path-keyed table of servable files
#[derive(Debug, Clone, Default)]
pub struct VirtualFileTable {
    files: HashMap<String, VirtualFile>,
}

impl VirtualFileTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold unpacked entries into a table
    ///
    /// Directory markers are skipped. When two entries normalize to the same
    /// path the later one wins.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = ArchiveEntry>,
    {
        let mut table = VirtualFileTable::new();
        for entry in entries {
            if entry.is_directory {
                continue;
            }
            let mime_type = mime_type_for(&entry.path).to_string();
            table.insert(&entry.path, Bytes::from(entry.bytes), mime_type);
        }
        table
    }

    /// Insert a file, replacing any previous entry at the same path
    pub fn insert(&mut self, path: &str, bytes: Bytes, mime_type: String) {
        let key = normalize_path(path);
        if self
            .files
            .insert(key.clone(), VirtualFile { bytes, mime_type })
            .is_some()
        {
            debug!("Duplicate path in package, keeping last: {}", key);
        }
    }

    /// Look up a file by (unnormalized) path
    pub fn get(&self, path: &str) -> Option<&VirtualFile> {
        self.files.get(&normalize_path(path))
    }

    /// Check if a path is present
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// All paths, sorted
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.files.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// Total content size in bytes
    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(|f| f.bytes.len() as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(path: &str, bytes: &[u8]) -> ArchiveEntry {
        ArchiveEntry {
            path: path.to_string(),
            bytes: bytes.to_vec(),
            is_directory: false,
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_path(""), "index.html");
        assert_eq!(normalize_path("./x"), "x");
        assert_eq!(normalize_path("/x"), "x");
        assert_eq!(normalize_path("./"), "index.html");
        assert_eq!(normalize_path("docs/"), "docs/index.html");
        assert_eq!(normalize_path("././a/b.css"), "a/b.css");
        assert_eq!(normalize_path("a/./b"), "a/./b");
    }

    proptest! {
        #[test]
        fn test_normalize_idempotent(path in "[./a-z]{0,12}") {
            let once = normalize_path(&path);
            prop_assert_eq!(normalize_path(&once), once.clone());
        }
    }

    #[test]
    fn test_from_entries() {
        let table = VirtualFileTable::from_entries(vec![
            entry("index.html", b"<html></html>"),
            entry("style.css", b"body{}"),
        ]);

        assert_eq!(table.len(), 2);
        let index = table.get("").unwrap();
        assert_eq!(index.mime_type, "text/html");
        assert_eq!(index.bytes, Bytes::from_static(b"<html></html>"));
        assert_eq!(table.get("./style.css").unwrap().mime_type, "text/css");
    }

    #[test]
    fn test_last_entry_wins() {
        let table = VirtualFileTable::from_entries(vec![
            entry("./app.js", b"old"),
            entry("app.js", b"new"),
        ]);

        assert_eq!(table.len(), 1);
        assert_eq!(table.get("app.js").unwrap().bytes, Bytes::from_static(b"new"));
    }

    #[test]
    fn test_directories_skipped() {
        let mut dir = entry("assets/", b"");
        dir.is_directory = true;

        let table = VirtualFileTable::from_entries(vec![dir, entry("assets/a.png", b"png")]);
        assert_eq!(table.paths(), vec!["assets/a.png"]);
        assert!(!table.contains("assets/"));
    }

    #[test]
    fn test_total_bytes() {
        let table = VirtualFileTable::from_entries(vec![entry("a", b"123"), entry("b", b"45")]);
        assert_eq!(table.total_bytes(), 5);
        assert!(!table.is_empty());
        assert!(VirtualFileTable::new().is_empty());
    }
}
