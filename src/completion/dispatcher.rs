use std::sync::{Arc, Mutex};

use chrono::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::events::{EngineEvent, EventBus};
use crate::models::{CompletionNotice, CompletionRecord};
use crate::remote::RemoteRecords;
use crate::settings::SharedSettings;
use crate::store::LocalCache;
use crate::tasks::ActiveTaskReconciler;
use crate::timer::{CompletionKind, Phase, PhaseCompletion};

use super::guard::DispatchGuard;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

#[derive(Debug)]
pub enum DispatchOutcome {
    /// A record was created; `persistence` finishes saving it in the background.
    Dispatched {
        record: CompletionRecord,
        persistence: JoinHandle<()>,
    },
    Skipped,
    Abandoned,
    BreakPhase,
    /// Another call site already dispatched this completion.
    Duplicate,
}

impl DispatchOutcome {
    pub fn record(&self) -> Option<&CompletionRecord> {
        match self {
            DispatchOutcome::Dispatched { record, .. } => Some(record),
            _ => None,
        }
    }
}

/// Turns finished work sessions into at most one completion record each.
pub struct CompletionDispatcher {
    guard: DispatchGuard,
    reconciler: Arc<ActiveTaskReconciler>,
    cache: LocalCache,
    bus: EventBus,
    settings: SharedSettings,
    stats_lock: Arc<Mutex<()>>,
}

impl CompletionDispatcher {
    pub fn new(
        reconciler: Arc<ActiveTaskReconciler>,
        cache: LocalCache,
        bus: EventBus,
        settings: SharedSettings,
    ) -> Self {
        let guard = DispatchGuard::from_seconds(settings.get().duplicate_guard_seconds);
        Self {
            guard,
            reconciler,
            cache,
            bus,
            settings,
            stats_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn guard(&self) -> &DispatchGuard {
        &self.guard
    }

    /// Decides whether `completion` earns a record and, if so, builds it from
    /// the active task as of this call, notifies listeners and starts
    /// persisting it.
    ///
    /// Never blocks on the network.
    pub fn dispatch(&self, completion: &PhaseCompletion) -> DispatchOutcome {
        match completion.kind {
            CompletionKind::Skipped => {
                log_debug!("Skipped {:?} phase is not credited", completion.phase);
                return DispatchOutcome::Skipped;
            }
            CompletionKind::Abandoned => {
                log_debug!("Abandoned {:?} phase is not credited", completion.phase);
                return DispatchOutcome::Abandoned;
            }
            CompletionKind::Finished => {}
        }

        if completion.phase != Phase::Work {
            return DispatchOutcome::BreakPhase;
        }

        let settings = self.settings.get();
        self.guard.set_window(Duration::seconds(i64::from(
            settings.duplicate_guard_seconds,
        )));
        if !self.guard.try_dispatch(completion.ended_at) {
            log_debug!(
                "Ignoring duplicate completion at {} (guard window {}s)",
                completion.ended_at,
                settings.duplicate_guard_seconds
            );
            return DispatchOutcome::Duplicate;
        }

        let task = self.reconciler.current();
        let record = CompletionRecord {
            id: Uuid::new_v4().to_string(),
            task_id: task.id.clone(),
            project_id: task.project_id.clone(),
            start_time: completion.started_at,
            end_time: completion.ended_at,
            duration_minutes: completion.planned_minutes,
            was_interrupted: completion.was_interrupted,
        };

        log_info!(
            "Pomodoro completed (task {})",
            record.task_id.as_deref().unwrap_or("none")
        );

        self.bus.emit(EngineEvent::PomodoroCompleted {
            notice: CompletionNotice {
                record: record.clone(),
                task,
                cycle_position: completion.cycle_position,
                long_break_interval: settings.effective_long_break_interval(),
            },
        });

        let persistence = self.spawn_persistence(record.clone());
        DispatchOutcome::Dispatched {
            record,
            persistence,
        }
    }

    fn spawn_persistence(&self, record: CompletionRecord) -> JoinHandle<()> {
        let remote = self.reconciler.remote();
        let cache = self.cache.clone();
        let stats_lock = self.stats_lock.clone();

        tokio::spawn(async move {
            if let Some(remote) = remote {
                if persist_remote(remote.as_ref(), &record).await {
                    return;
                }
            }
            fold_into_local_stats(&cache, &stats_lock, &record);
        })
    }
}

async fn persist_remote(remote: &dyn RemoteRecords, record: &CompletionRecord) -> bool {
    match remote.create_completion_record(record).await {
        Ok(saved) => {
            log_debug!("Completion record {} saved remotely", saved.id);
            true
        }
        Err(err) => {
            log_error!(
                "Failed to save completion record remotely, falling back to local stats: {:#}",
                err
            );
            false
        }
    }
}

fn fold_into_local_stats(cache: &LocalCache, stats_lock: &Mutex<()>, record: &CompletionRecord) {
    let _guard = match stats_lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let mut stats = cache.local_stats();
    stats.fold(record);
    if let Err(err) = cache.save_local_stats(&stats) {
        log_error!("Failed to save local stats: {:#}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActiveTask, TaskSummary};
    use crate::settings::TimerSettings;
    use crate::store::MemoryStore;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    struct FailingRemote;

    #[async_trait]
    impl RemoteRecords for FailingRemote {
        async fn get_active_task(&self) -> Result<Option<TaskSummary>> {
            Err(anyhow!("offline"))
        }

        async fn set_active_task(&self, _task_id: Option<&str>) -> Result<Option<TaskSummary>> {
            Err(anyhow!("offline"))
        }

        async fn create_completion_record(
            &self,
            _record: &CompletionRecord,
        ) -> Result<CompletionRecord> {
            Err(anyhow!("offline"))
        }
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    fn completion(phase: Phase, kind: CompletionKind, ended_at: DateTime<Utc>) -> PhaseCompletion {
        PhaseCompletion {
            phase,
            kind,
            started_at: ended_at - Duration::minutes(25),
            ended_at,
            planned_minutes: 25,
            was_interrupted: false,
            cycle_position: 1,
        }
    }

    fn finished_work(ended_at: DateTime<Utc>) -> PhaseCompletion {
        completion(Phase::Work, CompletionKind::Finished, ended_at)
    }

    fn setup(
        remote: Option<Arc<dyn RemoteRecords>>,
    ) -> (LocalCache, Arc<ActiveTaskReconciler>, EventBus, CompletionDispatcher) {
        let cache = LocalCache::new(Arc::new(MemoryStore::new()));
        let bus = EventBus::new();
        let reconciler = Arc::new(ActiveTaskReconciler::new(cache.clone(), bus.clone(), remote));
        let dispatcher = CompletionDispatcher::new(
            reconciler.clone(),
            cache.clone(),
            bus.clone(),
            SharedSettings::new(TimerSettings::default()),
        );
        (cache, reconciler, bus, dispatcher)
    }

    #[tokio::test]
    async fn two_completions_within_guard_window_yield_one_record() {
        let (cache, _, _, dispatcher) = setup(None);

        let first = dispatcher.dispatch(&completion(Phase::Work, CompletionKind::Finished, at(0)));
        let second = dispatcher.dispatch(&completion(Phase::Work, CompletionKind::Finished, at(3)));

        assert!(first.record().is_some());
        assert!(matches!(second, DispatchOutcome::Duplicate));
        if let DispatchOutcome::Dispatched { persistence, .. } = first {
            persistence.await.unwrap();
        }
        assert_eq!(cache.local_stats().total_pomodoros, 1);
    }

    #[tokio::test]
    async fn skips_abandons_and_breaks_never_produce_records() {
        let (cache, _, _, dispatcher) = setup(None);

        let outcomes = [
            dispatcher.dispatch(&completion(Phase::Work, CompletionKind::Skipped, at(0))),
            dispatcher.dispatch(&completion(Phase::Work, CompletionKind::Abandoned, at(100))),
            dispatcher.dispatch(&completion(Phase::ShortBreak, CompletionKind::Finished, at(200))),
            dispatcher.dispatch(&completion(Phase::LongBreak, CompletionKind::Finished, at(300))),
        ];

        assert!(outcomes.iter().all(|outcome| outcome.record().is_none()));
        assert_eq!(dispatcher.guard().last_dispatched(), None);
        assert_eq!(cache.local_stats().total_pomodoros, 0);
    }

    #[tokio::test]
    async fn record_uses_active_task_at_dispatch_time() {
        let (_, reconciler, bus, dispatcher) = setup(None);
        let mut events = bus.subscribe();
        reconciler
            .switch_task(ActiveTask {
                id: Some("t1".into()),
                project_id: Some("p1".into()),
                title: Some("Write".into()),
                project_title: Some("Docs".into()),
            })
            .await
            .unwrap();

        let outcome = dispatcher.dispatch(&finished_work(at(0)));
        let record = outcome.record().cloned().unwrap();
        assert_eq!(record.task_id.as_deref(), Some("t1"));
        assert_eq!(record.project_id.as_deref(), Some("p1"));

        loop {
            match events.recv().await.unwrap() {
                EngineEvent::PomodoroCompleted { notice } => {
                    assert_eq!(notice.record, record);
                    assert_eq!(notice.task.title.as_deref(), Some("Write"));
                    assert_eq!(notice.long_break_interval, 4);
                    break;
                }
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn missing_task_produces_unattributed_record() {
        let (_, _, _, dispatcher) = setup(None);
        let outcome = dispatcher.dispatch(&finished_work(at(0)));
        let record = outcome.record().unwrap();
        assert_eq!(record.task_id, None);
        assert_eq!(record.duration_minutes, 25);
    }

    #[tokio::test]
    async fn remote_failure_folds_into_local_stats() {
        let remote: Arc<dyn RemoteRecords> = Arc::new(FailingRemote);
        let (cache, _, _, dispatcher) = setup(Some(remote));

        let outcome = dispatcher.dispatch(&finished_work(at(0)));
        match outcome {
            DispatchOutcome::Dispatched { persistence, .. } => persistence.await.unwrap(),
            other => panic!("expected dispatch, got {other:?}"),
        }

        let stats = cache.local_stats();
        assert_eq!(stats.total_pomodoros, 1);
        assert_eq!(stats.total_focus_minutes, 25);
    }
}
