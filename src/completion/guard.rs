use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

struct GuardState {
    window: Duration,
    last_dispatched: Option<DateTime<Utc>>,
}

/// Collapses completions that land within `window` of the last accepted one.
///
/// Several call sites can observe the same physical completion; only the
/// first one through here gets to create a record.
pub struct DispatchGuard {
    state: Mutex<GuardState>,
}

impl DispatchGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            state: Mutex::new(GuardState {
                window,
                last_dispatched: None,
            }),
        }
    }

    pub fn from_seconds(seconds: u32) -> Self {
        Self::new(Duration::seconds(i64::from(seconds)))
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set_window(&self, window: Duration) {
        self.lock().window = window;
    }

    pub fn window(&self) -> Duration {
        self.lock().window
    }

    pub fn last_dispatched(&self) -> Option<DateTime<Utc>> {
        self.lock().last_dispatched
    }

    /// Returns `true` and records `timestamp` if no accepted completion is
    /// within the window; otherwise returns `false` and changes nothing.
    pub fn try_dispatch(&self, timestamp: DateTime<Utc>) -> bool {
        let mut state = self.lock();
        if let Some(previous) = state.last_dispatched {
            if (timestamp - previous).abs() < state.window {
                return false;
            }
        }
        state.last_dispatched = Some(timestamp);
        true
    }
}
