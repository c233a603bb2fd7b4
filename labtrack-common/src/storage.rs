//! Persisted key/value store
//!
//! The client keeps its auth artifacts (`authToken`, `refreshToken`, `user`)
//! and the last completed analysis in a flat string map. Every consumer
//! re-reads from here after an `AuthStateChanged` broadcast; nothing caches a
//! mutable copy. Last writer wins.

use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

/// Key holding the bearer token
pub const AUTH_TOKEN_KEY: &str = "authToken";

/// Key holding the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Key holding the serialized user profile
pub const USER_KEY: &str = "user";

/// Key holding the last completed analysis result
pub const LAST_ANALYSIS_KEY: &str = "lastAnalysis";

/// Flat string key/value store shared by every client component
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if absent
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value; removing an absent key is not an error
    fn remove(&self, key: &str) -> Result<()>;

    /// All keys currently present
    fn keys(&self) -> Vec<String>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::Storage("memory store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::Storage("memory store lock poisoned".to_string()))?;
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Store backed by a single JSON file
///
/// The whole map is loaded on open and rewritten on every mutation
/// (temp file + rename). A missing file opens as an empty store; an
/// unreadable one is logged and treated as empty.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<HashMap<String, String>>(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Session file unreadable, starting empty");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        debug!(path = %path.display(), keys = entries.len(), "Opened session store");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(entries)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::Storage("file store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::Storage("file store lock poisoned".to_string()))?;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get(AUTH_TOKEN_KEY), None);

        store.set(AUTH_TOKEN_KEY, "abc").unwrap();
        assert_eq!(store.get(AUTH_TOKEN_KEY).as_deref(), Some("abc"));

        store.set(AUTH_TOKEN_KEY, "def").unwrap();
        assert_eq!(store.get(AUTH_TOKEN_KEY).as_deref(), Some("def"));

        store.remove(AUTH_TOKEN_KEY).unwrap();
        assert_eq!(store.get(AUTH_TOKEN_KEY), None);

        // Removing again is a no-op
        store.remove(AUTH_TOKEN_KEY).unwrap();
        assert!(store.keys().is_empty());
    }

    #[test]
    fn test_json_file_store_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.set(AUTH_TOKEN_KEY, "token-1").unwrap();
            store.set(USER_KEY, r#"{"email":"a@b.c"}"#).unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get(AUTH_TOKEN_KEY).as_deref(), Some("token-1"));
        assert_eq!(reopened.get(USER_KEY).as_deref(), Some(r#"{"email":"a@b.c"}"#));

        reopened.remove(AUTH_TOKEN_KEY).unwrap();
        let again = JsonFileStore::open(&path).unwrap();
        assert_eq!(again.get(AUTH_TOKEN_KEY), None);
    }

    #[test]
    fn test_json_file_store_corrupt_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json at all").unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert!(store.keys().is_empty());
    }
}
