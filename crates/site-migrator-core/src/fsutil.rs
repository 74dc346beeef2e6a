//! Filesystem helpers: atomic writes, checksums and directory usage.
//!
//! Atomic writes follow the usual sequence:
//! 1. Write to a temp file with a unique PID+thread suffix
//! 2. fsync so the data reaches disk
//! 3. Rename over the target path

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{MigrationError, Result};

/// Write `contents` to `path` atomically, creating parent directories.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| MigrationError::io("creating directory", parent, e))?;
        }
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(
        ".{file_name}.{}.{}.tmp",
        std::process::id(),
        thread_id()
    ));

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| MigrationError::io("creating temp file", &temp_path, e))?;

        file.write_all(contents)
            .map_err(|e| MigrationError::io("writing temp file", &temp_path, e))?;

        file.sync_all()
            .map_err(|e| MigrationError::io("syncing temp file", &temp_path, e))?;
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        MigrationError::io("renaming temp file", path, e)
    })?;

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

/// Serialize `data` as pretty JSON, validating it by re-parsing.
pub fn to_json_bytes<T: Serialize>(data: &T) -> Result<Vec<u8>> {
    let serialized = serde_json::to_string_pretty(data).map_err(|e| MigrationError::Json {
        message: format!("Failed to serialize data: {e}"),
        source: Some(e),
    })?;

    serde_json::from_str::<serde_json::Value>(&serialized).map_err(|e| MigrationError::Json {
        message: format!("JSON validation failed: {e}"),
        source: Some(e),
    })?;

    Ok(serialized.into_bytes())
}

/// SHA-256 of a file as lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| MigrationError::io("opening file", path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| MigrationError::io("reading file", path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Number of regular files under `dir` and their total size.
pub fn dir_usage(dir: &Path) -> (usize, u64) {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .fold((0, 0), |(count, bytes), entry| {
            let len = entry.metadata().map(|m| m.len()).unwrap_or(0);
            (count + 1, bytes + len)
        })
}

fn thread_id() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    format!("{:?}", std::thread::current().id()).hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("metadata.json");

        atomic_write(&path, b"{}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_atomic_write_replaces_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.json");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn test_sha256_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.sql");
        fs::write(&path, "abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_dir_usage() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("sub")).unwrap();
        fs::write(temp_dir.path().join("a"), "12345").unwrap();
        fs::write(temp_dir.path().join("sub/b"), "123").unwrap();
        assert_eq!(dir_usage(temp_dir.path()), (2, 8));
    }
}
