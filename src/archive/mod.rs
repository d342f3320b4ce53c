//! Archive module
//!
//! Turns a decrypted tar stream into servable entries. Markup and
//! stylesheets are rewritten so the build works from under the scope
//! prefix; everything else passes through byte for byte.

mod mime;
mod pack;
mod rewrite;

pub use mime::{is_markup, is_stylesheet, mime_type_for, DEFAULT_MIME_TYPE};
pub use pack::{pack_directory, pack_files};
pub use rewrite::{inject_base, rewrite_root_links};

use crate::error::{Error, Result};
use crate::vfs::normalize_path;
use std::io::{Cursor, Read};
use tracing::debug;

/// A single entry extracted from a package archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Archive-relative path, leading `./` stripped
    pub path: String,
    /// Entry content (rewritten for markup and stylesheets)
    pub bytes: Vec<u8>,
    /// Directory marker; never served
    pub is_directory: bool,
}

/// Unpack a tar byte stream into entries, in archive order
///
/// Directory entries and non-file entries (links, devices) are skipped.
/// Any structural problem with the stream fails with `CorruptArchive`.
///
/// # Arguments
/// * `plaintext` - Decrypted archive bytes
/// * `scope_prefix` - Prefix injected as the markup base path
pub fn unpack(plaintext: &[u8], scope_prefix: &str) -> Result<Vec<ArchiveEntry>> {
    let mut archive = tar::Archive::new(Cursor::new(plaintext));
    let entries = archive
        .entries()
        .map_err(|e| Error::CorruptArchive(e.to_string()))?;

    let mut out = Vec::new();
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::CorruptArchive(e.to_string()))?;

        let raw_path = entry
            .path()
            .map_err(|e| Error::CorruptArchive(e.to_string()))?
            .to_string_lossy()
            .into_owned();

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            debug!("Skipping directory entry: {}", raw_path);
            continue;
        }
        if !entry_type.is_file() {
            debug!("Skipping non-file entry: {} ({:?})", raw_path, entry_type);
            continue;
        }

        let declared = entry
            .header()
            .size()
            .map_err(|e| Error::CorruptArchive(format!("{}: {}", raw_path, e)))?;

        let mut bytes = Vec::with_capacity((declared as usize).min(plaintext.len()));
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| Error::CorruptArchive(format!("{}: {}", raw_path, e)))?;
        if bytes.len() as u64 != declared {
            return Err(Error::CorruptArchive(format!(
                "{}: truncated, expected {} bytes, got {}",
                raw_path,
                declared,
                bytes.len()
            )));
        }

        let path = normalize_path(&raw_path);
        let bytes = rewrite_entry(&path, bytes, scope_prefix);

        out.push(ArchiveEntry {
            path,
            bytes,
            is_directory: false,
        });
    }

    debug!("Unpacked {} entries", out.len());
    Ok(out)
}

fn rewrite_entry(path: &str, bytes: Vec<u8>, scope_prefix: &str) -> Vec<u8> {
    let markup = is_markup(path);
    if !markup && !is_stylesheet(path) {
        return bytes;
    }

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            debug!("{} is not UTF-8, serving unmodified", path);
            return e.into_bytes();
        }
    };

    let mut text = rewrite_root_links(&text);
    if markup {
        text = inject_base(&text, scope_prefix);
    }
    text.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCOPE: &str = "/portal-scope/";

    fn build_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
        let owned: Vec<(String, Vec<u8>)> = files
            .iter()
            .map(|(p, b)| (p.to_string(), b.to_vec()))
            .collect();
        pack_files(&owned).unwrap()
    }

    #[test]
    fn test_unpack_in_archive_order() {
        let archive = build_archive(&[
            ("index.html", b"<html><head></head></html>"),
            ("style.css", b"body{}"),
            ("img/logo.png", &[0x89, 0x50, 0x4E, 0x47]),
        ]);

        let entries = unpack(&archive, SCOPE).unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["index.html", "style.css", "img/logo.png"]);
        assert!(entries.iter().all(|e| !e.is_directory));
    }

    #[test]
    fn test_link_rewrite_and_base_injection() {
        let html = br#"<html><head><title>x</title></head><body><a href="/about.html">About</a></body></html>"#;
        let archive = build_archive(&[("index.html", html)]);

        let entries = unpack(&archive, SCOPE).unwrap();
        let text = String::from_utf8(entries[0].bytes.clone()).unwrap();

        assert!(text.contains(r#"<a href="about.html">"#));
        assert!(!text.contains(r#"href="/about.html""#));
        assert!(text.starts_with("<html><head><base href=\"/portal-scope/\"><title>"));
    }

    #[test]
    fn test_stylesheet_rewritten_without_base() {
        let archive = build_archive(&[("theme.css", b"@import url(x.css); .a{} /* src=\"/y\" */")]);
        let entries = unpack(&archive, SCOPE).unwrap();
        let text = String::from_utf8(entries[0].bytes.clone()).unwrap();
        assert!(!text.contains("<base"));
        assert!(text.contains("src=\"y\""));
    }

    #[test]
    fn test_binary_passthrough() {
        let png = [0x89u8, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, b'/', b'"'];
        let archive = build_archive(&[("logo.png", &png)]);
        let entries = unpack(&archive, SCOPE).unwrap();
        assert_eq!(entries[0].bytes, png);
    }

    #[test]
    fn test_non_utf8_markup_untouched() {
        let bytes = [b'<', b'a', b' ', 0xFF, 0xFE, b'>'];
        let archive = build_archive(&[("broken.html", &bytes)]);
        let entries = unpack(&archive, SCOPE).unwrap();
        assert_eq!(entries[0].bytes, bytes);
    }

    #[test]
    fn test_directories_skipped() {
        let mut builder = tar::Builder::new(Vec::new());

        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(tar::EntryType::Directory);
        dir.set_size(0);
        dir.set_mode(0o755);
        builder.append_data(&mut dir, "assets/", std::io::empty()).unwrap();

        let mut file = tar::Header::new_gnu();
        file.set_size(3);
        file.set_mode(0o644);
        builder.append_data(&mut file, "assets/app.js", &b"1+1"[..]).unwrap();

        let archive = builder.into_inner().unwrap();
        let entries = unpack(&archive, SCOPE).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "assets/app.js");
    }

    #[test]
    fn test_corrupt_archive() {
        let garbage = b"this is definitely not a tar archive ".repeat(32);
        let result = unpack(&garbage, SCOPE);
        assert!(matches!(result, Err(Error::CorruptArchive(_))));
    }

    #[test]
    fn test_truncated_archive() {
        let archive = build_archive(&[("index.html", &[b'x'; 2048])]);
        let result = unpack(&archive[..1024], SCOPE);
        assert!(matches!(result, Err(Error::CorruptArchive(_))));
    }
}
