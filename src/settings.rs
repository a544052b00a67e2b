use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{Arc, RwLock},
};

use crate::timer::Phase;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerSettings {
    pub work_duration_minutes: u32,
    pub short_break_duration_minutes: u32,
    pub long_break_duration_minutes: u32,
    /// Every n-th completed work session is followed by a long break.
    pub long_break_interval: u32,
    pub auto_start_next_session: bool,
    /// Completions closer together than this are treated as the same event.
    pub duplicate_guard_seconds: u32,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            work_duration_minutes: 25,
            short_break_duration_minutes: 5,
            long_break_duration_minutes: 15,
            long_break_interval: 4,
            auto_start_next_session: false,
            duplicate_guard_seconds: 5,
        }
    }
}

impl TimerSettings {
    pub fn duration_minutes(&self, phase: Phase) -> u32 {
        let minutes = match phase {
            Phase::Work => self.work_duration_minutes,
            Phase::ShortBreak => self.short_break_duration_minutes,
            Phase::LongBreak => self.long_break_duration_minutes,
        };
        minutes.max(1)
    }

    pub fn duration_seconds(&self, phase: Phase) -> u32 {
        self.duration_minutes(phase).saturating_mul(60)
    }

    pub fn effective_long_break_interval(&self) -> u32 {
        self.long_break_interval.max(1)
    }
}

/// Settings shared between the engine's components; always read at the moment of use.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<TimerSettings>>,
}

impl SharedSettings {
    pub fn new(settings: TimerSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn get(&self) -> TimerSettings {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set(&self, settings: TimerSettings) {
        match self.inner.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    timer: TimerSettings,
}

/// JSON-file backed settings, cached in memory.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn timer(&self) -> TimerSettings {
        match self.data.read() {
            Ok(guard) => guard.timer.clone(),
            Err(poisoned) => poisoned.into_inner().timer.clone(),
        }
    }

    pub fn update_timer(&self, settings: TimerSettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.timer = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: UserSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings in {}", self.path.display()))?;
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = data;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
