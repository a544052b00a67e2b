use serde::Serialize;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};

use crate::models::{ActiveTask, CompletionNotice};
use crate::timer::{Phase, SessionState};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

const EVENT_BUS_CAPACITY: usize = 256;

pub const TIMER_STATE_CHANGED: &str = "timer-state-changed";
pub const PHASE_CHANGED: &str = "phase-changed";
pub const ACTIVE_TASK_CHANGED: &str = "active-task-changed";
pub const POMODORO_COMPLETED: &str = "pomodoro-completed";
pub const TAB_CHANGE_REQUESTED: &str = "tab-change-requested";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    TimerStateChanged {
        state: SessionState,
    },
    PhaseChanged {
        from: Phase,
        to: Phase,
        skipped: bool,
    },
    ActiveTaskChanged {
        task: ActiveTask,
    },
    PomodoroCompleted {
        notice: CompletionNotice,
    },
    TabChangeRequested {
        tab: String,
    },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::TimerStateChanged { .. } => TIMER_STATE_CHANGED,
            EngineEvent::PhaseChanged { .. } => PHASE_CHANGED,
            EngineEvent::ActiveTaskChanged { .. } => ACTIVE_TASK_CHANGED,
            EngineEvent::PomodoroCompleted { .. } => POMODORO_COMPLETED,
            EngineEvent::TabChangeRequested { .. } => TAB_CHANGE_REQUESTED,
        }
    }
}

/// Typed notification bus shared by the engine's components.
///
/// Emitting with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { sender }
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn request_tab(&self, tab: impl Into<String>) {
        self.emit(EngineEvent::TabChangeRequested { tab: tab.into() });
    }

    /// Runs `handler` for every event named `name` until the bus is dropped.
    pub fn on<F>(&self, name: &'static str, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(EngineEvent) + Send + 'static,
    {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.name() == name => handler(event),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        log_warn!("Listener for {} lagged, skipped {} events", name, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
