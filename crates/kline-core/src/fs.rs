//! Atomic file writes.
//!
//! Both helpers stage the payload in a sibling temp file and fsync it before
//! making it visible, so readers observe either the old content or the new
//! content, never a torn write.

use crate::error::{CoreError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

fn io_err(path: &Path, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()))
}

fn stage(target: &Path, contents: &[u8]) -> Result<PathBuf> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
    }

    let tmp = staging_path(target);
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp)
        .map_err(|e| io_err(&tmp, e))?;
    file.write_all(contents).map_err(|e| io_err(&tmp, e))?;
    file.sync_all().map_err(|e| io_err(&tmp, e))?;
    Ok(tmp)
}

fn sync_parent(target: &Path) {
    // Directory fsync is best effort; not every platform allows opening a dir.
    if let Some(parent) = target.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

/// Replace `target` with `contents` atomically (temp file + rename).
pub fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    let tmp = stage(target, contents)?;
    if let Err(e) = fs::rename(&tmp, target) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(target, e));
    }
    sync_parent(target);
    Ok(())
}

/// Create `target` with `contents` atomically, failing if it already exists.
///
/// Returns an error of kind `AlreadyExists` when another writer created the
/// file first.
pub fn write_new_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    let tmp = stage(target, contents)?;
    // hard_link refuses to clobber an existing destination
    let linked = fs::hard_link(&tmp, target);
    let _ = fs::remove_file(&tmp);
    linked.map_err(|e| io_err(target, e))?;
    sync_parent(target);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        // No staging files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_atomic_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("state.json");
        write_atomic(&path, b"{}").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_write_new_atomic_refuses_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("00001.json");

        write_new_atomic(&path, b"one").unwrap();
        let err = write_new_atomic(&path, b"two").unwrap_err();

        match err {
            CoreError::Io { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::AlreadyExists)
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fs::read(&path).unwrap(), b"one");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
