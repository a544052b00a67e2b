use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::completion::CompletionDispatcher;
use crate::events::{EngineEvent, EventBus};
use crate::settings::{SharedSettings, TimerSettings};
use crate::store::LocalCache;
use crate::time::TimeSource;

use super::clock::DEFAULT_INTERVAL_MS;
use super::state::{CompletionKind, Phase, SessionState, TickOutcome};
use super::ticker::{TickDisposition, TickerHandle};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

struct Engine {
    session: SessionState,
    /// Bumped whenever the clock is started or stopped; a tick carrying an
    /// older epoch belongs to a cancelled clock and is ignored.
    clock_epoch: u64,
}

/// Owns the single `SessionState` and the clock that drives it.
///
/// All transitions run under one lock, so a tick never interleaves with a
/// manual action or another tick.
#[derive(Clone)]
pub struct TimerController {
    engine: Arc<Mutex<Engine>>,
    ticker: Arc<StdMutex<Option<TickerHandle>>>,
    settings: SharedSettings,
    cache: LocalCache,
    dispatcher: Arc<CompletionDispatcher>,
    bus: EventBus,
    time: Arc<dyn TimeSource>,
    tick_interval_ms: i64,
}

impl TimerController {
    pub fn new(
        settings: SharedSettings,
        cache: LocalCache,
        dispatcher: Arc<CompletionDispatcher>,
        bus: EventBus,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let session = SessionState::new(&settings.get(), time.now());
        Self {
            engine: Arc::new(Mutex::new(Engine {
                session,
                clock_epoch: 0,
            })),
            ticker: Arc::new(StdMutex::new(None)),
            settings,
            cache,
            dispatcher,
            bus,
            time,
            tick_interval_ms: DEFAULT_INTERVAL_MS,
        }
    }

    /// Overrides the one-second cadence (tests and accelerated demos).
    pub fn with_tick_interval_ms(mut self, interval_ms: i64) -> Self {
        self.tick_interval_ms = interval_ms.max(1);
        self
    }

    pub async fn get_state(&self) -> SessionState {
        self.engine.lock().await.session.clone()
    }

    pub fn is_clock_running(&self) -> bool {
        self.lock_ticker()
            .as_ref()
            .map(|ticker| !ticker.is_finished())
            .unwrap_or(false)
    }

    /// Replaces the in-memory state with the sanitized cached copy.
    pub async fn load(&self) -> SessionState {
        let settings = self.settings.get();
        let mut engine = self.engine.lock().await;
        self.stop_clock(&mut engine);

        let stored = self.cache.load_session();
        engine.session = SessionState::rehydrate(stored, &settings, self.time.now());
        log_debug!(
            "Session restored: {:?} with {}s remaining",
            engine.session.phase,
            engine.session.remaining_seconds
        );

        self.persist_and_emit(&engine.session);
        engine.session.clone()
    }

    pub async fn start(&self) -> SessionState {
        let mut engine = self.engine.lock().await;
        if engine.session.is_running {
            return engine.session.clone();
        }

        engine.session.start(self.time.now());
        self.start_clock(&mut engine);
        log_info!("Timer started ({:?})", engine.session.phase);

        self.persist_and_emit(&engine.session);
        engine.session.clone()
    }

    pub async fn pause(&self) -> SessionState {
        let mut engine = self.engine.lock().await;
        if !engine.session.is_running {
            return engine.session.clone();
        }

        self.stop_clock(&mut engine);
        engine.session.pause(self.time.now());

        self.persist_and_emit(&engine.session);
        engine.session.clone()
    }

    pub async fn reset(&self) -> SessionState {
        let settings = self.settings.get();
        let mut engine = self.engine.lock().await;

        self.stop_clock(&mut engine);
        engine.session.reset(&settings, self.time.now());

        self.persist_and_emit(&engine.session);
        engine.session.clone()
    }

    /// Ends a work session early without crediting it.
    pub async fn abandon(&self) -> SessionState {
        let settings = self.settings.get();
        let mut engine = self.engine.lock().await;
        if engine.session.phase != Phase::Work || !engine.session.has_progress(&settings) {
            return engine.session.clone();
        }

        self.stop_clock(&mut engine);
        let now = self.time.now();
        let completion = engine.session.completion(&settings, CompletionKind::Abandoned, now);
        self.dispatcher.dispatch(&completion);
        engine.session.reset(&settings, now);
        log_info!("Work session abandoned");

        self.persist_and_emit(&engine.session);
        engine.session.clone()
    }

    /// Jumps to the next phase. Follows the natural transition rules but is
    /// never credited as a completed pomodoro.
    pub async fn skip(&self) -> SessionState {
        let mut engine = self.engine.lock().await;
        self.stop_clock(&mut engine);
        if self.finish_phase(&mut engine, CompletionKind::Skipped, self.time.now()) {
            self.start_clock(&mut engine);
        }
        engine.session.clone()
    }

    /// Re-reads settings and refreshes an untouched countdown to the new duration.
    pub async fn apply_settings(&self) -> SessionState {
        let settings = self.settings.get();
        let mut engine = self.engine.lock().await;
        if !engine.session.is_running && !engine.session.is_paused {
            engine.session.reset(&settings, self.time.now());
            self.persist_and_emit(&engine.session);
        }
        engine.session.clone()
    }

    /// Cancels the clock when the owning view goes away. State is persisted
    /// as-is; the next `load` will not resume it.
    pub async fn shutdown(&self) {
        let mut engine = self.engine.lock().await;
        self.stop_clock(&mut engine);
        if let Err(err) = self.cache.save_session(&engine.session) {
            log_error!("Failed to persist session state on shutdown: {:#}", err);
        }
    }

    /// One clock callback. Runs with the state lock held for its whole
    /// duration, including the zero-crossing transition.
    async fn handle_tick(&self, epoch: u64) -> TickDisposition {
        let mut engine = self.engine.lock().await;
        if engine.clock_epoch != epoch || !engine.session.is_running {
            return TickDisposition::Stop;
        }

        let now = self.time.now();
        match engine.session.tick(now) {
            TickOutcome::Counting => {
                self.persist_and_emit(&engine.session);
                TickDisposition::Continue
            }
            TickOutcome::Expired => {
                if self.finish_phase(&mut engine, CompletionKind::Finished, now) {
                    TickDisposition::Restart
                } else {
                    TickDisposition::Stop
                }
            }
        }
    }

    /// Credits (or not) the phase that just ended, then loads the next one.
    ///
    /// The completion is captured and dispatched before the state is
    /// overwritten. Returns whether the next phase auto-started; the caller
    /// owns restarting the clock.
    fn finish_phase(
        &self,
        engine: &mut Engine,
        kind: CompletionKind,
        now: DateTime<Utc>,
    ) -> bool {
        let settings: TimerSettings = self.settings.get();
        let from = engine.session.phase;

        let completion = engine.session.completion(&settings, kind, now);
        if from == Phase::Work {
            self.dispatcher.dispatch(&completion);
        }

        let auto_start = settings.auto_start_next_session;
        let transition = engine.session.advance(&settings, auto_start, now);

        log_info!(
            "Phase {:?} -> {:?}{}",
            from,
            transition.next,
            if kind == CompletionKind::Skipped { " (skipped)" } else { "" }
        );

        self.bus.emit(EngineEvent::PhaseChanged {
            from,
            to: transition.next,
            skipped: kind == CompletionKind::Skipped,
        });
        self.persist_and_emit(&engine.session);
        auto_start
    }

    fn lock_ticker(&self) -> StdMutexGuard<'_, Option<TickerHandle>> {
        match self.ticker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Cancels any previous clock and starts a fresh one.
    fn start_clock(&self, engine: &mut Engine) {
        engine.clock_epoch += 1;
        let epoch = engine.clock_epoch;

        let controller = self.clone();
        let handle = TickerHandle::spawn(self.time.clone(), self.tick_interval_ms, move || {
            let controller = controller.clone();
            async move { controller.handle_tick(epoch).await }
        });

        // Dropping the previous handle cancels its task.
        *self.lock_ticker() = Some(handle);
    }

    fn stop_clock(&self, engine: &mut Engine) {
        engine.clock_epoch += 1;
        if let Some(handle) = self.lock_ticker().take() {
            handle.cancel();
        }
    }

    fn persist_and_emit(&self, session: &SessionState) {
        if let Err(err) = self.cache.save_session(session) {
            log_error!("Failed to persist session state: {:#}", err);
        }
        self.bus.emit(EngineEvent::TimerStateChanged {
            state: session.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::tasks::ActiveTaskReconciler;
    use crate::time::MonotonicTimeSource;
    use std::time::Duration;
    use tokio::time::sleep;

    fn controller(settings: TimerSettings) -> (TimerController, LocalCache) {
        let cache = LocalCache::new(Arc::new(MemoryStore::new()));
        let bus = EventBus::new();
        let shared = SharedSettings::new(settings);
        let reconciler = Arc::new(ActiveTaskReconciler::new(cache.clone(), bus.clone(), None));
        let dispatcher = Arc::new(CompletionDispatcher::new(
            reconciler,
            cache.clone(),
            bus.clone(),
            shared.clone(),
        ));
        let time: Arc<dyn TimeSource> = Arc::new(MonotonicTimeSource::new());
        let controller = TimerController::new(shared, cache.clone(), dispatcher, bus, time);
        (controller, cache)
    }

    fn one_minute_phases() -> TimerSettings {
        TimerSettings {
            work_duration_minutes: 1,
            short_break_duration_minutes: 1,
            long_break_duration_minutes: 1,
            ..TimerSettings::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn counts_down_once_per_second_and_pause_freezes() {
        let (timer, cache) = controller(TimerSettings::default());

        timer.start().await;
        sleep(Duration::from_millis(10_500)).await;
        let state = timer.get_state().await;
        assert_eq!(state.remaining_seconds, 1_490);
        assert!(state.is_running);

        let paused = timer.pause().await;
        assert!(paused.is_paused && paused.was_interrupted);
        sleep(Duration::from_secs(30)).await;
        assert_eq!(timer.get_state().await.remaining_seconds, 1_490);
        assert!(!timer.is_clock_running());
        assert_eq!(cache.load_session().unwrap().remaining_seconds, 1_490);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_moves_to_break_and_credits_one_pomodoro() {
        let (timer, cache) = controller(one_minute_phases());

        timer.start().await;
        sleep(Duration::from_millis(60_500)).await;

        let state = timer.get_state().await;
        assert_eq!(state.phase, Phase::ShortBreak);
        assert_eq!(state.completed_work_sessions, 1);
        assert!(!state.is_running);
        assert_eq!(state.remaining_seconds, 60);

        tokio::task::yield_now().await;
        assert_eq!(cache.local_stats().total_pomodoros, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_start_keeps_the_clock_going_across_phases() {
        let (timer, cache) = controller(TimerSettings {
            auto_start_next_session: true,
            ..one_minute_phases()
        });

        timer.start().await;
        sleep(Duration::from_millis(60_500)).await;
        let state = timer.get_state().await;
        assert_eq!(state.phase, Phase::ShortBreak);
        assert!(state.is_running);

        sleep(Duration::from_secs(60)).await;
        let state = timer.get_state().await;
        assert_eq!(state.phase, Phase::Work);
        assert!(state.is_running);
        assert_eq!(state.remaining_seconds, 60);
        assert_eq!(cache.local_stats().total_pomodoros, 1);

        timer.shutdown().await;
        assert!(!timer.is_clock_running());
    }

    #[tokio::test(start_paused = true)]
    async fn skip_advances_without_credit() {
        let (timer, cache) = controller(TimerSettings::default());

        timer.start().await;
        sleep(Duration::from_millis(3_500)).await;
        let state = timer.skip().await;

        assert_eq!(state.phase, Phase::ShortBreak);
        assert_eq!(state.completed_work_sessions, 1);
        assert!(!state.is_running);
        assert!(!timer.is_clock_running());
        tokio::task::yield_now().await;
        assert_eq!(cache.local_stats().total_pomodoros, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abandon_resets_work_without_credit() {
        let (timer, cache) = controller(TimerSettings::default());

        timer.start().await;
        sleep(Duration::from_millis(5_500)).await;
        let state = timer.abandon().await;

        assert_eq!(state.phase, Phase::Work);
        assert_eq!(state.remaining_seconds, 1_500);
        assert!(!state.is_running && !state.is_paused);
        tokio::task::yield_now().await;
        assert_eq!(cache.local_stats().total_pomodoros, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn load_never_resumes_a_running_timer() {
        let (timer, cache) = controller(TimerSettings::default());
        let mut stored = SessionState::new(&TimerSettings::default(), Utc::now());
        stored.is_running = true;
        stored.remaining_seconds = 700;
        cache.save_session(&stored).unwrap();

        let state = timer.load().await;
        assert!(!state.is_running);
        assert!(state.is_paused);
        assert_eq!(state.remaining_seconds, 700);
        assert!(!timer.is_clock_running());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_from_a_cancelled_clock_are_ignored() {
        let (timer, _) = controller(TimerSettings::default());
        timer.start().await;
        let stale_epoch = timer.engine.lock().await.clock_epoch;

        timer.pause().await;
        timer.start().await;
        let before = timer.get_state().await.remaining_seconds;

        assert_eq!(timer.handle_tick(stale_epoch).await, TickDisposition::Stop);
        assert_eq!(timer.get_state().await.remaining_seconds, before);
        timer.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn settings_change_refreshes_idle_countdown_only() {
        let (timer, _) = controller(TimerSettings::default());
        timer.settings.set(TimerSettings {
            work_duration_minutes: 50,
            ..TimerSettings::default()
        });
        assert_eq!(timer.apply_settings().await.remaining_seconds, 3_000);

        timer.start().await;
        sleep(Duration::from_millis(1_500)).await;
        timer.pause().await;
        timer.settings.set(TimerSettings::default());
        assert_eq!(timer.apply_settings().await.remaining_seconds, 2_999);
    }
}
