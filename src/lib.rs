//! Pomodoro timer and active-task sync engine.
//!
//! A `PomodoroEngine` owns one timer session, the task the user is focused
//! on, and the path from a finished work session to a saved completion
//! record. UI shells drive it through the engine and listen on its event bus.

pub mod completion;
pub mod db;
pub mod engine;
pub mod events;
pub mod models;
pub mod remote;
pub mod settings;
pub mod store;
pub mod tasks;
pub mod time;
pub mod timer;
mod utils;

pub use completion::{CompletionDispatcher, DispatchGuard, DispatchOutcome};
pub use db::SqliteStore;
pub use engine::{EngineBuilder, PomodoroEngine};
pub use events::{EngineEvent, EventBus};
pub use models::{ActiveTask, CompletionNotice, CompletionRecord, LocalStats, TaskSummary};
pub use remote::RemoteRecords;
pub use settings::{SettingsStore, SharedSettings, TimerSettings};
pub use store::{KeyValueStore, LocalCache, MemoryStore, StorageChange};
pub use tasks::ActiveTaskReconciler;
pub use time::{ManualTimeSource, MonotonicTimeSource, SystemTimeSource, TimeSource};
pub use timer::{Phase, SessionState, TimerController};
pub use utils::init_logging;
