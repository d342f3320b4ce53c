//! Packaging side: build the tar stream that gets sealed into an envelope

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Build a tar archive from `(path, bytes)` pairs, in the given order
pub fn pack_files(files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());

    for (path, bytes) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder
            .append_data(&mut header, path, bytes.as_slice())
            .map_err(|e| Error::Internal(format!("Failed to add {} to archive: {}", path, e)))?;
    }

    builder
        .into_inner()
        .map_err(|e| Error::Internal(format!("Failed to finish archive: {}", e)))
}

/// Archive every regular file under `dir`, paths relative to `dir`
///
/// Files are added in sorted path order so the same build directory always
/// produces the same archive.
pub fn pack_directory<P: AsRef<Path>>(dir: P) -> Result<Vec<u8>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(Error::Config(format!("Not a directory: {:?}", dir)));
    }

    let mut paths = Vec::new();
    collect_files(dir, &mut paths)?;
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let relative = path
            .strip_prefix(dir)
            .map_err(|e| Error::Internal(e.to_string()))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let bytes = fs::read(&path)?;
        debug!("Packing {} ({} bytes)", relative, bytes.len());
        files.push((relative, bytes));
    }

    info!("Packed {} files from {:?}", files.len(), dir);
    pack_files(&files)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), out)?;
        } else if file_type.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::unpack;
    use tempfile::TempDir;

    #[test]
    fn test_pack_directory_round_trip() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("css")).unwrap();
        fs::write(temp.path().join("index.html"), "<p>hi</p>").unwrap();
        fs::write(temp.path().join("css/site.css"), "p{}").unwrap();

        let archive = pack_directory(temp.path()).unwrap();
        let entries = unpack(&archive, "/s/").unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();

        assert_eq!(paths, vec!["css/site.css", "index.html"]);
    }

    #[test]
    fn test_pack_directory_deterministic() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.js"), "b").unwrap();
        fs::write(temp.path().join("a.js"), "a").unwrap();

        let first = pack_directory(temp.path()).unwrap();
        let second = pack_directory(temp.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_pack_missing_directory() {
        let temp = TempDir::new().unwrap();
        let result = pack_directory(temp.path().join("nope"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
