//! Session-scoped key/value storage.
//!
//! Mirrors the browser's `sessionStorage`: synchronous, string-valued, and
//! scoped to one session. Two backends are provided:
//!
//! - [`MemorySessionStore`] - lives as long as the process
//! - [`FileSessionStore`] - one JSON document per session id, so separate
//!   invocations of the CLI within the same session share state
//!
//! Access is short and keyed on a handful of well-known names; no locking
//! beyond read-before-write within a single call is required.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Errors raised by session storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store lock was poisoned by a panicking writer.
    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Synchronous string key/value store scoped to a session.
pub trait SessionStore: Send + Sync {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes `key`; removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Reads and deserializes a JSON value stored under `key`.
pub fn read_json<T: DeserializeOwned>(
    store: &dyn SessionStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serializes `value` as JSON and stores it under `key`.
pub fn write_json<T: Serialize + ?Sized>(
    store: &dyn SessionStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Process-local session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: DashMap<String, String>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

// ============================================================================
// File backend
// ============================================================================

/// Session store persisted as `session.<id>.json` in a directory.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    /// Opens (or prepares) the store for `session_id` inside `dir`.
    ///
    /// The directory is created if it does not exist; the file itself is
    /// only written on the first `set`.
    pub fn open(dir: impl AsRef<Path>, session_id: &str) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(format!("session.{session_id}.json")),
            lock: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the whole session.
    pub fn clear(&self) -> Result<bool, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::{LAUNCH_PARAMS_KEY, LaunchContext};
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_memory_store_basic_operations() {
        let store = MemorySessionStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get("missing").unwrap(), None);

        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
        assert_eq!(store.len(), 1);

        store.remove("k").unwrap();
        assert_ok!(store.remove("k"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_json_helpers() {
        let store = MemorySessionStore::new();
        let ctx = LaunchContext::with_patient("standalone-patient", "123");

        write_json(&store, LAUNCH_PARAMS_KEY, &ctx).unwrap();
        let back: Option<LaunchContext> = read_json(&store, LAUNCH_PARAMS_KEY).unwrap();
        assert_eq!(back, Some(ctx));

        store.set(LAUNCH_PARAMS_KEY, "{not json").unwrap();
        assert_err!(read_json::<LaunchContext>(&store, LAUNCH_PARAMS_KEY));
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let store = FileSessionStore::open(dir.path(), "tab-1").unwrap();
        assert!(!store.path().exists());
        store.set(LAUNCH_PARAMS_KEY, "{\"patient\":\"123\"}").unwrap();
        store.set("other", "x").unwrap();

        let reopened = FileSessionStore::open(dir.path(), "tab-1").unwrap();
        assert_eq!(
            reopened.get(LAUNCH_PARAMS_KEY).unwrap().as_deref(),
            Some("{\"patient\":\"123\"}")
        );

        // A different session does not see it.
        let other = FileSessionStore::open(dir.path(), "tab-2").unwrap();
        assert_eq!(other.get(LAUNCH_PARAMS_KEY).unwrap(), None);

        reopened.remove("other").unwrap();
        assert_eq!(store.get("other").unwrap(), None);

        assert!(store.clear().unwrap());
        assert!(!store.clear().unwrap());
        assert_eq!(reopened.get(LAUNCH_PARAMS_KEY).unwrap(), None);
    }
}
