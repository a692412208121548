//! Key-value backends for the registry.
//!
//! - `JsonFileStore`: one JSON document on disk, rewritten through a temp
//!   file and an atomic rename on every mutation
//! - `MemoryStore`: process-local map used by the tests

use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{AppError, Result};

pub trait StateStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<Value>>;
    fn write(&self, key: &str, value: Value) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Persist `entries` without ever leaving a half-written document behind.
    fn flush(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, Value>),
    {
        let mut entries = self.entries.lock().map_err(|_| AppError::poisoned())?;
        let mut next = entries.clone();
        f(&mut next);
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn read(&self, key: &str) -> Result<Option<Value>> {
        let entries = self.entries.lock().map_err(|_| AppError::poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: Value) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.lock().map_err(|_| AppError::poisoned())?;
        Ok(entries.keys().cloned().collect())
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl StateStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<Value>> {
        let entries = self.entries.lock().map_err(|_| AppError::poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| AppError::poisoned())?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| AppError::poisoned())?;
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.lock().map_err(|_| AppError::poisoned())?;
        Ok(entries.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_json_store_survives_reopen() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state/registry.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.write("errbotio/err-git", json!({ "main": "a".repeat(40) })).unwrap();
        store.write("other/repo", json!({})).unwrap();
        store.remove("other/repo").unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.keys().unwrap(), vec!["errbotio/err-git".to_string()]);
        assert_eq!(
            reopened.read("errbotio/err-git").unwrap(),
            Some(json!({ "main": "a".repeat(40) }))
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_json_store_rejects_unreadable_document() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("registry.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(JsonFileStore::open(&path), Err(AppError::Json(_))));
    }

    #[test]
    fn test_memory_store_basics() {
        let store = MemoryStore::new();
        assert_eq!(store.read("missing").unwrap(), None);

        store.write("b", json!(1)).unwrap();
        store.write("a", json!(2)).unwrap();
        assert_eq!(store.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);

        store.remove("a").unwrap();
        assert_eq!(store.read("a").unwrap(), None);
    }
}
