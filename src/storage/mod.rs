//! Key-value backends for persisted application data.
//!
//! [`FileStore`] keeps one file per key under a directory and survives
//! restarts. [`MemoryStore`] lives as long as the process.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Minimal string key-value interface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KvStore: Send + Sync {
    /// `Ok(None)` when the key has never been written.
    async fn get(&self, key: &str) -> io::Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> io::Result<()>;

    /// Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> io::Result<()>;
}

/// Directory-backed store, one file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> io::Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(key))
    }
}

/// Keys become file names, so only `[A-Za-z0-9_.-]` is accepted and the
/// special names `.` and `..` are refused.
pub fn validate_key(key: &str) -> io::Result<()> {
    let ok = !key.is_empty()
        && key != "."
        && key != ".."
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if ok {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid storage key: {key:?}"),
        ))
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> io::Result<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set(&self, key: &str, value: &str) -> io::Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // `~` is not a valid key character, so this never collides.
        let tmp = self.dir.join(format!("{key}.tmp~"));
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("Stored {} ({} bytes)", key, value.len());
        Ok(())
    }

    async fn remove(&self, key: &str) -> io::Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> io::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path().join("store"));

        assert_eq!(store.get("ddrive_photos").await.unwrap(), None);

        store.set("ddrive_photos", "[1,2,3]").await.unwrap();
        assert_eq!(
            store.get("ddrive_photos").await.unwrap().as_deref(),
            Some("[1,2,3]")
        );

        store.set("ddrive_photos", "[]").await.unwrap();
        assert_eq!(
            store.get("ddrive_photos").await.unwrap().as_deref(),
            Some("[]")
        );

        store.remove("ddrive_photos").await.unwrap();
        assert_eq!(store.get("ddrive_photos").await.unwrap(), None);
        store.remove("ddrive_photos").await.unwrap();
    }

    #[tokio::test]
    async fn file_store_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path());
        store.set("k", "v").await.unwrap();

        let names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["k"]);
    }

    #[tokio::test]
    async fn file_store_rejects_path_like_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path());

        for key in ["", ".", "..", "../escape", "a/b", "a\\b", "tmp~"] {
            let err = store.set(key, "x").await.unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "key {key:?}");
        }
    }

    #[test]
    fn key_charset() {
        assert!(validate_key("ddrive_albums_checksum").is_ok());
        assert!(validate_key("v1.backup-2").is_ok());
        assert!(validate_key("앨범").is_err());
        assert!(validate_key("with space").is_err());
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
