mod cache;

pub use cache::{
    LocalCache, StorageChange, ACTIVE_TASK_ID_KEY, ACTIVE_TASK_KEY, LOCAL_STATS_KEY,
    SESSION_STATE_KEY, TASK_LIST_KEY,
};

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};

/// Persistent key/value storage that survives reloads.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local store. Clones share the same map, like two tabs sharing an origin.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        guard.remove(key);
        Ok(())
    }
}
