use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};

use crate::models::{ActiveTask, LocalStats, TaskSummary};
use crate::timer::SessionState;

use super::KeyValueStore;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_warn};

pub const SESSION_STATE_KEY: &str = "pomodoro.sessionState";
pub const ACTIVE_TASK_KEY: &str = "pomodoro.activeTask";
pub const ACTIVE_TASK_ID_KEY: &str = "pomodoro.activeTaskId";
pub const TASK_LIST_KEY: &str = "pomodoro.tasks";
pub const LOCAL_STATS_KEY: &str = "pomodoro.localStats";

/// A key written by another window sharing the same store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    pub new_value: Option<String>,
}

/// Typed view over the persistent key/value store.
///
/// Reads never fail: unreadable keys are logged and treated as absent, and
/// corrupt JSON is removed so the next load starts from defaults.
#[derive(Clone)]
pub struct LocalCache {
    store: Arc<dyn KeyValueStore>,
}

impl LocalCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                log_error!("Failed to read {} from local cache: {:#}", key, err);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                log_warn!("Discarding corrupt cache entry {}: {}", key, err);
                if let Err(remove_err) = self.store.remove(key) {
                    log_error!("Failed to remove corrupt entry {}: {:#}", key, remove_err);
                }
                None
            }
        }
    }

    pub fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let serialized =
            serde_json::to_string(value).with_context(|| format!("failed to serialize {key}"))?;
        self.store
            .set(key, &serialized)
            .with_context(|| format!("failed to write {key}"))
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.store
            .remove(key)
            .with_context(|| format!("failed to remove {key}"))
    }

    pub fn load_session(&self) -> Option<SessionState> {
        self.read_json(SESSION_STATE_KEY)
    }

    pub fn save_session(&self, state: &SessionState) -> Result<()> {
        self.write_json(SESSION_STATE_KEY, state)
    }

    pub fn active_task(&self) -> Option<ActiveTask> {
        self.read_json(ACTIVE_TASK_KEY)
    }

    pub fn active_task_id(&self) -> Option<String> {
        self.read_json::<Option<String>>(ACTIVE_TASK_ID_KEY).flatten()
    }

    /// Writes the task and its id key together; an empty task clears both.
    pub fn save_active_task(&self, task: &ActiveTask) -> Result<()> {
        if task.is_empty() {
            return self.clear_active_task();
        }
        self.write_json(ACTIVE_TASK_KEY, task)?;
        self.write_json(ACTIVE_TASK_ID_KEY, &task.id)
    }

    pub fn clear_active_task(&self) -> Result<()> {
        self.remove(ACTIVE_TASK_KEY)?;
        self.remove(ACTIVE_TASK_ID_KEY)
    }

    pub fn task_list(&self) -> Vec<TaskSummary> {
        self.read_json(TASK_LIST_KEY).unwrap_or_default()
    }

    pub fn save_task_list(&self, tasks: &[TaskSummary]) -> Result<()> {
        self.write_json(TASK_LIST_KEY, &tasks)
    }

    pub fn local_stats(&self) -> LocalStats {
        self.read_json(LOCAL_STATS_KEY).unwrap_or_default()
    }

    pub fn save_local_stats(&self, stats: &LocalStats) -> Result<()> {
        self.write_json(LOCAL_STATS_KEY, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn cache() -> (MemoryStore, LocalCache) {
        let store = MemoryStore::new();
        let cache = LocalCache::new(Arc::new(store.clone()));
        (store, cache)
    }

    #[test]
    fn corrupt_entry_is_discarded() {
        let (store, cache) = cache();
        store.set(SESSION_STATE_KEY, "{\"phase\":").unwrap();

        assert!(cache.load_session().is_none());
        assert_eq!(store.get(SESSION_STATE_KEY).unwrap(), None);
    }

    #[test]
    fn active_task_writes_both_keys() {
        let (store, cache) = cache();
        let task = ActiveTask {
            id: Some("t1".into()),
            project_id: Some("p1".into()),
            title: Some("Write report".into()),
            project_title: Some("Q3".into()),
        };

        cache.save_active_task(&task).unwrap();
        assert_eq!(cache.active_task(), Some(task));
        assert_eq!(cache.active_task_id().as_deref(), Some("t1"));

        cache.save_active_task(&ActiveTask::empty()).unwrap();
        assert_eq!(store.get(ACTIVE_TASK_KEY).unwrap(), None);
        assert_eq!(cache.active_task_id(), None);
    }

    #[test]
    fn missing_task_list_is_empty() {
        let (_, cache) = cache();
        assert!(cache.task_list().is_empty());
        assert_eq!(cache.local_stats(), LocalStats::default());
    }
}
