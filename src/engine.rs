use std::sync::Arc;

use tokio::{sync::broadcast, task::JoinHandle};

use crate::completion::CompletionDispatcher;
use crate::events::{EngineEvent, EventBus};
use crate::models::{ActiveTask, LocalStats};
use crate::remote::RemoteRecords;
use crate::settings::{SharedSettings, TimerSettings};
use crate::store::{KeyValueStore, LocalCache, MemoryStore, StorageChange};
use crate::tasks::ActiveTaskReconciler;
use crate::time::{SystemTimeSource, TimeSource};
use crate::timer::{SessionState, TimerController};

const ENABLE_LOGS: bool = true;

use crate::log_info;

pub const TIMER_TAB: &str = "timer";

/// Everything a UI shell needs, wired together around one store and one bus.
pub struct PomodoroEngine {
    settings: SharedSettings,
    cache: LocalCache,
    bus: EventBus,
    reconciler: Arc<ActiveTaskReconciler>,
    dispatcher: Arc<CompletionDispatcher>,
    timer: TimerController,
}

#[derive(Default)]
pub struct EngineBuilder {
    store: Option<Arc<dyn KeyValueStore>>,
    remote: Option<Arc<dyn RemoteRecords>>,
    time: Option<Arc<dyn TimeSource>>,
    settings: TimerSettings,
    tick_interval_ms: Option<i64>,
}

impl EngineBuilder {
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn remote(mut self, remote: Arc<dyn RemoteRecords>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn settings(mut self, settings: TimerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn tick_interval_ms(mut self, interval_ms: i64) -> Self {
        self.tick_interval_ms = Some(interval_ms);
        self
    }

    pub fn build(self) -> PomodoroEngine {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let time = self.time.unwrap_or_else(|| Arc::new(SystemTimeSource));

        let settings = SharedSettings::new(self.settings);
        let cache = LocalCache::new(store);
        let bus = EventBus::new();
        let reconciler = Arc::new(ActiveTaskReconciler::new(
            cache.clone(),
            bus.clone(),
            self.remote,
        ));
        let dispatcher = Arc::new(CompletionDispatcher::new(
            reconciler.clone(),
            cache.clone(),
            bus.clone(),
            settings.clone(),
        ));
        let mut timer = TimerController::new(
            settings.clone(),
            cache.clone(),
            dispatcher.clone(),
            bus.clone(),
            time,
        );
        if let Some(interval_ms) = self.tick_interval_ms {
            timer = timer.with_tick_interval_ms(interval_ms);
        }

        PomodoroEngine {
            settings,
            cache,
            bus,
            reconciler,
            dispatcher,
            timer,
        }
    }
}

impl PomodoroEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Restores the session and resolves the active task for a fresh view.
    pub async fn mount(&self) -> (SessionState, ActiveTask) {
        let session = self.timer.load().await;
        let task = self.reconciler.load().await;
        log_info!(
            "Engine mounted: {:?}, active task {}",
            session.phase,
            task.id.as_deref().unwrap_or("none")
        );
        (session, task)
    }

    /// Cancels the clock; nothing ticks after this returns.
    pub async fn unmount(&self) {
        self.timer.shutdown().await;
    }

    pub fn timer(&self) -> &TimerController {
        &self.timer
    }

    pub fn active_tasks(&self) -> &Arc<ActiveTaskReconciler> {
        &self.reconciler
    }

    pub fn dispatcher(&self) -> &CompletionDispatcher {
        &self.dispatcher
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn settings(&self) -> TimerSettings {
        self.settings.get()
    }

    pub fn local_stats(&self) -> LocalStats {
        self.cache.local_stats()
    }

    pub async fn update_settings(&self, settings: TimerSettings) -> SessionState {
        self.settings.set(settings);
        self.timer.apply_settings().await
    }

    /// Makes `task` active and asks the shell to show the timer.
    pub fn focus_task(&self, task: ActiveTask) -> JoinHandle<()> {
        let persistence = self.reconciler.switch_task(task);
        self.bus.request_tab(TIMER_TAB);
        persistence
    }

    pub async fn on_auth_changed(&self, remote: Option<Arc<dyn RemoteRecords>>) -> ActiveTask {
        self.reconciler.on_auth_changed(remote).await
    }

    pub fn on_storage_change(&self, change: &StorageChange) {
        self.reconciler.on_storage_change(change);
    }
}
