//! Persistent map from RepoId to the followed branches and their last-seen
//! revisions.
//!
//! Absence of an entry means "not followed". Every read-modify-write of an
//! entry, whether from a follow command or from a poll, runs inside
//! `with_repo_lock` for that RepoId so the two can never interleave.

pub mod store;

pub use store::{JsonFileStore, StateStore};
#[cfg(test)]
pub use store::MemoryStore;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{AppError, Result};
use crate::models::{FollowedState, RepoId};

pub struct Registry {
    store: Box<dyn StateStore>,
    locks: Mutex<HashMap<RepoId, Arc<Mutex<()>>>>,
}

impl Registry {
    pub fn new(store: impl StateStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Read the entry for `id`. A malformed entry is reported as
    /// `RegistryCorruption` and left in place.
    pub fn get(&self, id: &RepoId) -> Result<Option<FollowedState>> {
        let Some(value) = self.store.read(id.as_str())? else {
            return Ok(None);
        };

        serde_json::from_value(value).map(Some).map_err(|e| {
            tracing::error!("Entry of {} is unreadable: {}", id, e);
            AppError::RegistryCorruption(id.to_string())
        })
    }

    /// Like `get`, but a malformed entry is deleted and reported as absent:
    /// the repository has to be followed again. Only call this inside
    /// `with_repo_lock` for `id`.
    pub fn get_or_discard(&self, id: &RepoId) -> Result<Option<FollowedState>> {
        match self.get(id) {
            Err(AppError::RegistryCorruption(_)) => {
                tracing::error!("Discarding the entry of {}; follow it again to resume", id);
                self.store.remove(id.as_str())?;
                Ok(None)
            }
            other => other,
        }
    }

    pub fn set(&self, id: &RepoId, state: &FollowedState) -> Result<()> {
        self.store.write(id.as_str(), serde_json::to_value(state)?)
    }

    pub fn delete(&self, id: &RepoId) -> Result<()> {
        self.store.remove(id.as_str())
    }

    /// Followed repositories in RepoId order.
    pub fn list(&self) -> Result<Vec<RepoId>> {
        let mut ids = Vec::new();
        for key in self.store.keys()? {
            match RepoId::new(key.clone()) {
                Ok(id) => ids.push(id),
                Err(_) => tracing::error!("Ignoring registry key {:?}: not a repository name", key),
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Run `f` while holding the critical section for `id`.
    pub fn with_repo_lock<F, T>(&self, id: &RepoId, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let lock = {
            let mut locks = self.locks.lock().map_err(|_| AppError::poisoned())?;
            locks.entry(id.clone()).or_default().clone()
        };

        let result = {
            let _guard = lock.lock().map_err(|_| AppError::poisoned())?;
            f()
        };

        // Only the map and this call hold the lock: nobody is waiting on it.
        let mut locks = self.locks.lock().map_err(|_| AppError::poisoned())?;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }
        result
    }
}
