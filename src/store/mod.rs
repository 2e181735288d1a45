//! Durable storage for the persisted credential pair.
//!
//! A failure to persist must never crash the caller: every operation catches
//! and logs the underlying error, degrading to "the session will not survive
//! a restart".

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

/// Storage key for the short-lived bearer credential.
pub const ACCESS_TOKEN_KEY: &str = "petasync_access_token";
/// Storage key for the long-lived refresh credential.
pub const REFRESH_TOKEN_KEY: &str = "petasync_refresh_token";
/// Storage key for the cached user snapshot (optimistic UI only, never
/// trusted as an auth source).
pub const AUTH_STATE_KEY: &str = "petasync_auth_state";

/// Key/value storage for tokens and the cached identity snapshot.
///
/// Implementations swallow storage errors; `set` and `remove` are best
/// effort by contract.
pub trait TokenStore: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: &str);
    fn remove(&self, name: &str);
}

/// File-backed store: a flat JSON object at a configurable path.
pub struct FileTokenStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileTokenStore {
    /// Open the store, loading any existing entries. A missing or unreadable
    /// file starts empty.
    #[must_use]
    pub fn open(path: PathBuf) -> Self {
        let entries = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Map<String, Value>>(&bytes) {
                Ok(map) => map
                    .into_iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
                    .collect(),
                Err(err) => {
                    warn!("Ignoring malformed token store {}: {err}", path.display());
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn flush(&self, entries: &BTreeMap<String, String>) {
        let map: Map<String, Value> = entries
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        // serde_json::to_vec of a string map cannot fail; the write can.
        match serde_json::to_vec_pretty(&Value::Object(map)) {
            Ok(bytes) => {
                if let Err(err) = std::fs::write(&self.path, bytes) {
                    warn!("Failed to persist tokens to {}: {err}", self.path.display());
                }
            }
            Err(err) => warn!("Failed to serialize token store: {err}"),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        // A poisoned lock only means a previous writer panicked mid-update;
        // the map itself is still a plain string map.
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) {
        let mut entries = self.lock();
        entries.insert(name.to_string(), value.to_string());
        self.flush(&entries);
    }

    fn remove(&self, name: &str) {
        let mut entries = self.lock();
        if entries.remove(name).is_some() {
            self.flush(&entries);
        }
    }
}

/// In-memory store, used by tests and as a no-persistence fallback.
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, name: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn set(&self, name: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(name.to_string(), value.to_string());
    }

    fn remove(&self, name: &str) {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trips_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tokens.json");

        let store = FileTokenStore::open(path.clone());
        store.set(ACCESS_TOKEN_KEY, "T1");
        store.set(REFRESH_TOKEN_KEY, "R1");
        assert_eq!(store.get(ACCESS_TOKEN_KEY).as_deref(), Some("T1"));

        let reopened = FileTokenStore::open(path);
        assert_eq!(reopened.get(ACCESS_TOKEN_KEY).as_deref(), Some("T1"));
        assert_eq!(reopened.get(REFRESH_TOKEN_KEY).as_deref(), Some("R1"));
    }

    #[test]
    fn file_store_remove_deletes_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tokens.json");

        let store = FileTokenStore::open(path.clone());
        store.set(ACCESS_TOKEN_KEY, "T1");
        store.remove(ACCESS_TOKEN_KEY);
        assert_eq!(store.get(ACCESS_TOKEN_KEY), None);

        let reopened = FileTokenStore::open(path);
        assert_eq!(reopened.get(ACCESS_TOKEN_KEY), None);
    }

    #[test]
    fn file_store_swallows_unwritable_path() {
        let store = FileTokenStore::open(PathBuf::from("/nonexistent-dir/tokens.json"));
        // Write fails on flush but the caller must not observe it.
        store.set(ACCESS_TOKEN_KEY, "T1");
        // The in-memory view still serves the value for this process.
        assert_eq!(store.get(ACCESS_TOKEN_KEY).as_deref(), Some("T1"));
    }

    #[test]
    fn file_store_ignores_malformed_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, b"not json").expect("write");

        let store = FileTokenStore::open(path);
        assert_eq!(store.get(ACCESS_TOKEN_KEY), None);
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.get(ACCESS_TOKEN_KEY), None);
        store.set(ACCESS_TOKEN_KEY, "T1");
        assert_eq!(store.get(ACCESS_TOKEN_KEY).as_deref(), Some("T1"));
        store.remove(ACCESS_TOKEN_KEY);
        assert_eq!(store.get(ACCESS_TOKEN_KEY), None);
    }
}
