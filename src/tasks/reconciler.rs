use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, RwLock,
};

use anyhow::Result;
use tokio::task::JoinHandle;

use crate::events::{EngineEvent, EventBus};
use crate::models::{ActiveTask, TaskSummary};
use crate::remote::RemoteRecords;
use crate::store::{LocalCache, StorageChange, ACTIVE_TASK_KEY, TASK_LIST_KEY};

use super::resolve::{resolve_active_task, RemoteLookup, Resolution};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Keeps the in-memory, cached and remote copies of the active task convergent.
///
/// Every change to the in-memory value bumps `generation` while holding the
/// `current` lock, so async work that started before a change can detect that
/// its result is stale and drop it.
pub struct ActiveTaskReconciler {
    current: Mutex<ActiveTask>,
    generation: AtomicU64,
    cache: LocalCache,
    remote: RwLock<Option<Arc<dyn RemoteRecords>>>,
    bus: EventBus,
}

impl ActiveTaskReconciler {
    pub fn new(cache: LocalCache, bus: EventBus, remote: Option<Arc<dyn RemoteRecords>>) -> Self {
        Self {
            current: Mutex::new(ActiveTask::empty()),
            generation: AtomicU64::new(0),
            cache,
            remote: RwLock::new(remote),
            bus,
        }
    }

    fn lock_current(&self) -> MutexGuard<'_, ActiveTask> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The active task as of right now.
    pub fn current(&self) -> ActiveTask {
        self.lock_current().clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn remote(&self) -> Option<Arc<dyn RemoteRecords>> {
        match self.remote.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.remote().is_some()
    }

    pub fn cache_task_list(&self, tasks: &[TaskSummary]) -> Result<()> {
        self.cache.save_task_list(tasks)
    }

    /// Sets the in-memory value and returns the new generation.
    fn set_current(&self, task: ActiveTask) -> u64 {
        let mut current = self.lock_current();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *current = task;
        generation
    }

    /// Resolves the active task from remote, cache and task list, in that order.
    ///
    /// If the active task is switched while the remote lookup is in flight,
    /// the lookup's result is discarded and the newer value is kept.
    pub async fn load(&self) -> ActiveTask {
        let started_generation = self.generation();

        let lookup = match self.remote() {
            None => RemoteLookup::Unauthenticated,
            Some(remote) => match remote.get_active_task().await {
                Ok(task) => RemoteLookup::Found(task.map(ActiveTask::from)),
                Err(err) => {
                    log_error!(
                        "Failed to fetch remote active task, falling back to local cache: {:#}",
                        err
                    );
                    RemoteLookup::Failed
                }
            },
        };

        let resolution = {
            let mut current = self.lock_current();
            if self.generation.load(Ordering::SeqCst) != started_generation {
                log_info!("Active task changed during load; keeping the newer value");
                return current.clone();
            }

            let last_known_id = self.cache.active_task_id().or_else(|| current.id.clone());
            let resolution: Resolution = resolve_active_task(
                lookup,
                self.cache.active_task(),
                last_known_id.as_deref(),
                &self.cache.task_list(),
            );

            if resolution.writes_cache() {
                if let Err(err) = self.cache.save_active_task(&resolution.task) {
                    log_error!("Failed to cache resolved active task: {:#}", err);
                }
            }

            if *current == resolution.task {
                return resolution.task;
            }
            self.generation.fetch_add(1, Ordering::SeqCst);
            *current = resolution.task.clone();
            resolution
        };

        log_debug!("Active task resolved from {:?}", resolution.source);
        self.bus.emit(EngineEvent::ActiveTaskChanged {
            task: resolution.task.clone(),
        });
        resolution.task
    }

    /// Switches the active task.
    ///
    /// The in-memory value changes before this returns. Persistence runs in
    /// the returned task: the remote record first (when signed in), then the
    /// local cache. A remote failure is logged and the in-memory value is kept.
    pub fn switch_task(self: &Arc<Self>, task: ActiveTask) -> JoinHandle<()> {
        let generation = self.set_current(task.clone());
        self.bus.emit(EngineEvent::ActiveTaskChanged { task: task.clone() });

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.persist_switch(task, generation).await;
        })
    }

    pub fn clear(self: &Arc<Self>) -> JoinHandle<()> {
        self.switch_task(ActiveTask::empty())
    }

    async fn persist_switch(&self, task: ActiveTask, generation: u64) {
        if let Some(remote) = self.remote() {
            if let Err(err) = remote.set_active_task(task.id.as_deref()).await {
                log_error!(
                    "Failed to persist active task remotely, falling back to local cache: {:#}",
                    err
                );
            }
        }

        // Hold the lock so a newer switch cannot interleave with the write.
        let _current = self.lock_current();
        if self.generation.load(Ordering::SeqCst) != generation {
            log_debug!("Skipping cache write for superseded active task switch");
            return;
        }
        if let Err(err) = self.cache.save_active_task(&task) {
            log_error!("Failed to cache active task: {:#}", err);
        }
    }

    /// Replaces the signed-in user (or signs out with `None`).
    ///
    /// The previous user's active task and task list are dropped before the
    /// new user's data is resolved.
    pub async fn on_auth_changed(&self, remote: Option<Arc<dyn RemoteRecords>>) -> ActiveTask {
        {
            let mut current = self.lock_current();
            self.generation.fetch_add(1, Ordering::SeqCst);
            *current = ActiveTask::empty();
            if let Err(err) = self.cache.clear_active_task() {
                log_error!("Failed to clear cached active task: {:#}", err);
            }
            if let Err(err) = self.cache.remove(TASK_LIST_KEY) {
                log_error!("Failed to clear cached task list: {:#}", err);
            }
        }

        match self.remote.write() {
            Ok(mut guard) => *guard = remote,
            Err(poisoned) => *poisoned.into_inner() = remote,
        }

        self.bus.emit(EngineEvent::ActiveTaskChanged {
            task: ActiveTask::empty(),
        });
        self.load().await
    }

    /// Applies a cache write made by another window sharing the store.
    pub fn on_storage_change(&self, change: &StorageChange) {
        if change.key != ACTIVE_TASK_KEY {
            return;
        }

        let task = match &change.new_value {
            None => ActiveTask::empty(),
            Some(raw) => match serde_json::from_str::<ActiveTask>(raw) {
                Ok(task) => task,
                Err(err) => {
                    log_warn!("Ignoring unreadable active task from another window: {}", err);
                    return;
                }
            },
        };

        {
            let mut current = self.lock_current();
            if *current == task {
                return;
            }
            self.generation.fetch_add(1, Ordering::SeqCst);
            *current = task.clone();
        }

        self.bus.emit(EngineEvent::ActiveTaskChanged { task });
    }
}
