use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::error::{PicastError, Result};

/// Atomically replaces the contents of `path` with `buf`.
///
/// Writes to a temporary file in the same directory (same filesystem, so the
/// final rename is atomic), syncs it to disk, then renames it over the
/// target.
pub fn replace_file_contents(path: &Path, buf: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(buf)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;

    tmp.persist(path)
        .map_err(|e| PicastError::Io(e.error))?;

    Ok(())
}

/// Creates an empty file at `path`, creating parent directories if needed.
///
/// Returns `Ok(true)` if the file was created, `Ok(false)` if it already
/// existed.
pub fn touch_file(path: &Path) -> Result<bool> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }

    match path.try_exists()? {
        true => Ok(false),
        false => {
            File::create(path)?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_creates_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        replace_file_contents(&path, b"{}").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{}");

        replace_file_contents(&path, b"{\"a\":1}").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{\"a\":1}");
    }

    #[test]
    fn replace_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        replace_file_contents(&path, &[0u8; 512]).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn touch_reports_creation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("media").join("manifest.json");

        assert!(touch_file(&path).unwrap());
        assert!(!touch_file(&path).unwrap());
        assert!(path.exists());
    }
}
