//! Durable key-value storage for the serialized embedding store.
//!
//! The store is written as one blob under a single well-known key.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Well-known key holding the whole embedding store.
pub const DEFAULT_STORE_KEY: &str = "registeredFaces";

/// Key-value storage holding whole text blobs.
pub trait Persistence {
    /// Read the blob stored under `key`, or `None` if it was never written.
    fn get(&self, key: &str) -> io::Result<Option<String>>;

    /// Replace the blob stored under `key`.
    fn set(&self, key: &str, value: &str) -> io::Result<()>;
}

/// One `<key>.json` file per key inside a directory.
///
/// Writes go to a temporary file in the same directory which is then
/// renamed over the target, so readers never observe a partial blob.
#[derive(Debug, Clone)]
pub struct DirectoryPersistence {
    dir: PathBuf,
}

impl DirectoryPersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &str) -> io::Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid store key: {key:?}"),
            ));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl Persistence for DirectoryPersistence {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)?) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        let target = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;

        tracing::debug!(path = %target.display(), bytes = value.len(), "store blob replaced");
        Ok(())
    }
}

/// Process-local storage. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryPersistence {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory store lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl<P: Persistence + ?Sized> Persistence for Box<P> {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        (**self).set(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let p = DirectoryPersistence::new(dir.path());
        assert_eq!(p.get(DEFAULT_STORE_KEY).unwrap(), None);
    }

    #[test]
    fn test_directory_set_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let p = DirectoryPersistence::new(dir.path().join("nested"));
        p.set("faces", "{\"a\":[]}").unwrap();
        assert_eq!(p.get("faces").unwrap().as_deref(), Some("{\"a\":[]}"));
        assert!(dir.path().join("nested/faces.json").exists());
    }

    #[test]
    fn test_directory_set_overwrites_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let p = DirectoryPersistence::new(dir.path());
        p.set("faces", "first").unwrap();
        p.set("faces", "second").unwrap();
        assert_eq!(p.get("faces").unwrap().as_deref(), Some("second"));

        // Only the target file remains; the temp file was renamed over it.
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_directory_rejects_path_like_keys() {
        let p = DirectoryPersistence::new("/tmp");
        assert!(p.path_for("../etc/passwd").is_err());
        assert!(p.path_for("").is_err());
        assert!(p.path_for("..").is_err());
    }

    #[test]
    fn test_memory_roundtrip() {
        let p = MemoryPersistence::new();
        assert_eq!(p.get("k").unwrap(), None);
        p.set("k", "v").unwrap();
        assert_eq!(p.get("k").unwrap().as_deref(), Some("v"));
    }
}
