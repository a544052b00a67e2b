use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::time::Instant;

/// Source of "now" for everything that schedules or stamps time.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall-clock origin plus elapsed time on tokio's monotonic clock.
///
/// Follows `tokio::time::pause()`/`advance()` in tests, and is immune to
/// wall-clock adjustments while the process is alive.
#[derive(Debug, Clone)]
pub struct MonotonicTimeSource {
    origin_wall: DateTime<Utc>,
    origin: Instant,
}

impl MonotonicTimeSource {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(origin_wall: DateTime<Utc>) -> Self {
        Self {
            origin_wall,
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTimeSource {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = ChronoDuration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| ChronoDuration::zero());
        self.origin_wall + elapsed
    }
}

/// Time that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualTimeSource {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualTimeSource {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, value: DateTime<Utc>) {
        let mut guard = match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = value;
    }

    pub fn advance_ms(&self, ms: i64) {
        let mut guard = match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard += ChronoDuration::milliseconds(ms);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
