//! Checksummed persistence for application data.
//!
//! Every value is stored as canonical JSON under its key, with the SHA-256
//! of that JSON (lowercase hex) under `<key>_checksum`. A load recomputes
//! the digest from the parsed value and reports a mismatch through the
//! `valid` flag. The data is always returned; remediation is the caller's
//! call.
//!
//! Canonical means `serde_json`'s compact output of a [`Value`], whose
//! object keys are sorted. Whitespace or key-order changes in the stored
//! file therefore do not count as tampering; any change to the data does.

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::audit::{AuditAction, AuditLog, sha256_hex};
use super::error::IntegrityError;
use crate::storage::KvStore;

/// Suffix of the sibling key holding the digest.
pub const CHECKSUM_SUFFIX: &str = "_checksum";

pub fn checksum_key(key: &str) -> String {
    format!("{key}{CHECKSUM_SUFFIX}")
}

/// Result of [`IntegrityStore::load`].
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    /// False when the stored checksum does not match the data.
    pub valid: bool,
    pub data: T,
    key: String,
}

impl<T> Loaded<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The data if it passed the check, else `ChecksumMismatch`.
    pub fn verified(self) -> Result<T, IntegrityError> {
        if self.valid {
            Ok(self.data)
        } else {
            Err(IntegrityError::ChecksumMismatch { key: self.key })
        }
    }
}

impl<T: Serialize> Serialize for Loaded<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Loaded", 2)?;
        s.serialize_field("valid", &self.valid)?;
        s.serialize_field("data", &self.data)?;
        s.end()
    }
}

/// SHA-256 over the canonical JSON form of `value`.
pub fn compute_checksum(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

fn canonical_json(value: &Value) -> String {
    value.to_string()
}

pub struct IntegrityStore {
    backend: Arc<dyn KvStore>,
    // Keeps a value and its checksum from being observed half-written.
    lock: Mutex<()>,
    audit: Option<AuditLog>,
}

impl IntegrityStore {
    pub fn new(backend: Arc<dyn KvStore>) -> Self {
        Self {
            backend,
            lock: Mutex::new(()),
            audit: None,
        }
    }

    /// Record checksum mismatches in the audit log.
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Persist `value` under `key` and its digest under `<key>_checksum`.
    pub async fn save<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), IntegrityError> {
        let value = serde_json::to_value(value).map_err(|source| IntegrityError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.save_value(key, &value).await
    }

    pub async fn save_value(&self, key: &str, value: &Value) -> Result<(), IntegrityError> {
        let json = canonical_json(value);
        let checksum = sha256_hex(json.as_bytes());

        let _guard = self.lock.lock().await;
        self.backend
            .set(key, &json)
            .await
            .map_err(|source| storage_error(key, source))?;
        self.backend
            .set(&checksum_key(key), &checksum)
            .await
            .map_err(|source| storage_error(key, source))?;

        debug!("Saved {} with checksum {}", key, &checksum[..12]);
        Ok(())
    }

    /// Load and check `key` as an untyped JSON value.
    ///
    /// An absent key yields `{valid: true, data: []}`. A present key with
    /// no checksum is accepted as valid.
    pub async fn load_value(&self, key: &str) -> Result<Loaded<Value>, IntegrityError> {
        let (raw, stored_checksum) = {
            let _guard = self.lock.lock().await;
            let raw = self
                .backend
                .get(key)
                .await
                .map_err(|source| storage_error(key, source))?;
            let checksum = self
                .backend
                .get(&checksum_key(key))
                .await
                .map_err(|source| storage_error(key, source))?;
            (raw, checksum)
        };

        let Some(raw) = raw.filter(|r| !r.is_empty()) else {
            return Ok(Loaded {
                valid: true,
                data: Value::Array(Vec::new()),
                key: key.to_string(),
            });
        };

        let parsed: Value =
            serde_json::from_str(&raw).map_err(|source| IntegrityError::Malformed {
                key: key.to_string(),
                source,
            })?;

        let valid = match stored_checksum {
            None => {
                debug!("No checksum stored for {}, accepting", key);
                true
            }
            Some(stored) => {
                let valid = stored.trim().eq_ignore_ascii_case(&compute_checksum(&parsed));
                if !valid {
                    warn!(
                        "Data integrity check failed for \"{}\". Data may have been tampered with.",
                        key
                    );
                    if let Some(ref audit) = self.audit {
                        audit.record(AuditAction::TamperDetected, Some(key));
                    }
                }
                valid
            }
        };

        Ok(Loaded {
            valid,
            data: parsed,
            key: key.to_string(),
        })
    }

    /// Typed load. An absent key yields `T::default()`.
    pub async fn load<T>(&self, key: &str) -> Result<Loaded<T>, IntegrityError>
    where
        T: DeserializeOwned + Default,
    {
        let loaded = self.load_value(key).await?;
        let is_empty_default = matches!(&loaded.data, Value::Array(items) if items.is_empty());

        let data = match serde_json::from_value(loaded.data) {
            Ok(data) => data,
            // `[]` is the "nothing stored" shape; types that are not lists get their default.
            Err(_) if is_empty_default => T::default(),
            Err(source) => {
                return Err(IntegrityError::Malformed {
                    key: key.to_string(),
                    source,
                });
            }
        };

        Ok(Loaded {
            valid: loaded.valid,
            data,
            key: loaded.key,
        })
    }

    /// Delete a value together with its checksum.
    pub async fn remove(&self, key: &str) -> Result<(), IntegrityError> {
        let _guard = self.lock.lock().await;
        self.backend
            .remove(key)
            .await
            .map_err(|source| storage_error(key, source))?;
        self.backend
            .remove(&checksum_key(key))
            .await
            .map_err(|source| storage_error(key, source))
    }
}

fn storage_error(key: &str, source: std::io::Error) -> IntegrityError {
    IntegrityError::Storage {
        key: key.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStore, MemoryStore, MockKvStore};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Album {
        id: u32,
        name: String,
        photos: Vec<String>,
    }

    fn memory_store() -> (Arc<MemoryStore>, IntegrityStore) {
        let backend = Arc::new(MemoryStore::new());
        let store = IntegrityStore::new(backend.clone());
        (backend, store)
    }

    #[tokio::test]
    async fn save_then_load_is_valid() {
        let (_, store) = memory_store();
        let albums = vec![Album {
            id: 1,
            name: "Summer".into(),
            photos: vec!["a.jpg".into(), "b.jpg".into()],
        }];

        store.save("ddrive_albums", &albums).await.unwrap();
        let loaded: Loaded<Vec<Album>> = store.load("ddrive_albums").await.unwrap();

        assert!(loaded.valid);
        assert_eq!(loaded.data, albums);
    }

    #[tokio::test]
    async fn checksum_stored_under_sibling_key() {
        let (backend, store) = memory_store();
        store.save("ddrive_photos", &json!([1, 2])).await.unwrap();

        let stored = backend.get("ddrive_photos_checksum").await.unwrap().unwrap();
        assert_eq!(stored.len(), 64);
        assert_eq!(stored, sha256_hex(b"[1,2]"));
    }

    #[tokio::test]
    async fn tampered_data_is_flagged_but_returned() {
        let (backend, store) = memory_store();
        store
            .save("ddrive_photos", &json!([{"title": "cat"}]))
            .await
            .unwrap();

        backend
            .set("ddrive_photos", r#"[{"title":"dog"}]"#)
            .await
            .unwrap();

        let loaded = store.load_value("ddrive_photos").await.unwrap();
        assert!(!loaded.valid);
        assert_eq!(loaded.data, json!([{"title": "dog"}]));

        let err = loaded.verified().unwrap_err();
        assert!(matches!(err, IntegrityError::ChecksumMismatch { ref key } if key == "ddrive_photos"));
    }

    #[tokio::test]
    async fn formatting_changes_are_not_tampering() {
        let (backend, store) = memory_store();
        store.save("k", &json!({"b": 1, "a": [true]})).await.unwrap();

        backend
            .set("k", "{\n  \"a\": [ true ],\n  \"b\": 1\n}")
            .await
            .unwrap();

        assert!(store.load_value("k").await.unwrap().valid);
    }

    #[tokio::test]
    async fn missing_checksum_is_accepted() {
        let (backend, store) = memory_store();
        backend.set("legacy", r#"["x"]"#).await.unwrap();

        let loaded: Loaded<Vec<String>> = store.load("legacy").await.unwrap();
        assert!(loaded.valid);
        assert_eq!(loaded.data, vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn absent_key_is_empty_and_valid() {
        let (_, store) = memory_store();

        let raw = store.load_value("nothing").await.unwrap();
        assert!(raw.valid);
        assert_eq!(raw.data, json!([]));

        let typed: Loaded<Vec<Album>> = store.load("nothing").await.unwrap();
        assert!(typed.valid && typed.data.is_empty());

        let album: Loaded<Album> = store.load("nothing").await.unwrap();
        assert_eq!(album.data, Album::default());
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let (backend, store) = memory_store();
        backend.set("k", "{not json").await.unwrap();

        let err = store.load_value("k").await.unwrap_err();
        assert!(matches!(err, IntegrityError::Malformed { .. }));
    }

    #[tokio::test]
    async fn wrong_shape_is_malformed() {
        let (_, store) = memory_store();
        store.save("k", &json!({"id": "not a number"})).await.unwrap();

        let err = store.load::<Album>("k").await.unwrap_err();
        assert!(matches!(err, IntegrityError::Malformed { .. }));
    }

    #[tokio::test]
    async fn remove_deletes_both_keys() {
        let (backend, store) = memory_store();
        store.save("k", &json!(1)).await.unwrap();
        store.remove("k").await.unwrap();

        assert_eq!(backend.get("k").await.unwrap(), None);
        assert_eq!(backend.get("k_checksum").await.unwrap(), None);
    }

    #[tokio::test]
    async fn storage_errors_carry_the_key() {
        let mut mock = MockKvStore::new();
        mock.expect_set()
            .returning(|_, _| Err(std::io::Error::other("disk full")));
        mock.expect_get()
            .returning(|_| Err(std::io::Error::other("unreadable")));

        let store = IntegrityStore::new(Arc::new(mock));

        let err = store.save("photos", &json!([])).await.unwrap_err();
        assert!(matches!(err, IntegrityError::Storage { ref key, .. } if key == "photos"));

        let err = store.load_value("photos").await.unwrap_err();
        assert!(err.to_string().contains("unreadable"));
    }

    #[tokio::test]
    async fn tamper_is_audited() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(FileStore::new(tmp.path().join("store")));
        let audit = AuditLog::in_dir(tmp.path());
        let store = IntegrityStore::new(backend.clone()).with_audit(audit.clone());

        store.save("ddrive_albums", &json!(["a"])).await.unwrap();
        backend.set("ddrive_albums", r#"["b"]"#).await.unwrap();
        assert!(!store.load_value("ddrive_albums").await.unwrap().valid);

        let entries = audit.read().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::TamperDetected);
        assert_eq!(entries[0].detail.as_deref(), Some("ddrive_albums"));
    }

    #[test]
    fn loaded_serializes_valid_and_data_only() {
        let loaded = Loaded {
            valid: false,
            data: json!([1]),
            key: "k".into(),
        };
        assert_eq!(
            serde_json::to_value(&loaded).unwrap(),
            json!({"valid": false, "data": [1]})
        );
    }
}
