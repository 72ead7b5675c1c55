//! On-disk unit directory.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::UnitResult;

/// The directory unit files are written to and deleted from.
#[derive(Debug, Clone)]
pub struct UnitStore {
    dir: PathBuf,
}

impl UnitStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `content` to `path`, replacing any existing file.
    ///
    /// The content goes to a temporary sibling first and is renamed into
    /// place, so the manager never reads a half-written unit.
    pub fn write(&self, path: &Path, content: &str) -> UnitResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        if path.exists() {
            warn!(path = %path.display(), "Replacing existing unit");
        } else {
            info!(path = %path.display(), "Creating new unit");
        }

        // Random suffix so a pre-created symlink cannot be followed.
        let temp_name = format!(
            ".{}.{}.tmp",
            path.file_name().unwrap_or_default().to_string_lossy(),
            Uuid::new_v4().simple()
        );
        let temp_path = path.with_file_name(temp_name);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        let written = file
            .write_all(content.as_bytes())
            .and_then(|_| file.sync_all())
            .and_then(|_| fs::rename(&temp_path, path));
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        debug!(path = %path.display(), bytes = content.len(), "Unit written");
        Ok(())
    }

    /// Write every `(path, content)` pair.
    pub fn write_all<'a, I>(&self, files: I) -> UnitResult<()>
    where
        I: IntoIterator<Item = (&'a PathBuf, &'a String)>,
    {
        for (path, content) in files {
            self.write(path, content)?;
        }
        Ok(())
    }

    pub fn read(&self, path: &Path) -> UnitResult<String> {
        Ok(fs::read_to_string(path)?)
    }

    /// Delete `path`. Returns whether a file was removed; a missing file
    /// is not an error.
    pub fn delete(&self, path: &Path) -> UnitResult<bool> {
        match fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "Deleted unit");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Unit already absent");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_directory_and_replaces() {
        let tmp = TempDir::new().unwrap();
        let store = UnitStore::new(tmp.path().join("units"));
        let path = store.dir().join("taskflow-x.service");

        store.write(&path, "first").unwrap();
        store.write(&path, "second").unwrap();

        assert_eq!(store.read(&path).unwrap(), "second");
        // No temp files left behind.
        assert_eq!(fs::read_dir(store.dir()).unwrap().count(), 1);
    }

    #[test]
    fn test_delete_is_tolerant() {
        let tmp = TempDir::new().unwrap();
        let store = UnitStore::new(tmp.path());
        let path = tmp.path().join("taskflow-x.timer");
        fs::write(&path, "x").unwrap();

        assert!(store.delete(&path).unwrap());
        assert!(!store.delete(&path).unwrap());
    }
}
