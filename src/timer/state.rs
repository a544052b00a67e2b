use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::TimerSettings;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Work,
    ShortBreak,
    LongBreak,
}

impl Phase {
    pub fn is_break(self) -> bool {
        !matches!(self, Phase::Work)
    }
}

/// How a phase came to an end.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CompletionKind {
    /// The countdown reached zero.
    Finished,
    /// The user jumped to the next phase.
    Skipped,
    /// The session was ended before reaching zero and not credited.
    Abandoned,
}

/// Everything about a phase that just ended, captured before the state is
/// overwritten with the next phase's defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseCompletion {
    pub phase: Phase,
    pub kind: CompletionKind,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub planned_minutes: u32,
    pub was_interrupted: bool,
    /// Work sessions completed in the current cycle, counting this one when it is work.
    pub cycle_position: u32,
}

/// Result of the pure transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: Phase,
    pub completed_work_sessions: u32,
}

/// Computes the phase that follows `current`.
///
/// `completed_work_sessions` rotates: it resets to zero whenever a long break
/// is chosen.
pub fn next_phase(
    current: Phase,
    completed_work_sessions: u32,
    long_break_interval: u32,
) -> Transition {
    match current {
        Phase::Work => {
            let counter = completed_work_sessions.saturating_add(1);
            if counter % long_break_interval.max(1) == 0 {
                Transition {
                    next: Phase::LongBreak,
                    completed_work_sessions: 0,
                }
            } else {
                Transition {
                    next: Phase::ShortBreak,
                    completed_work_sessions: counter,
                }
            }
        }
        Phase::ShortBreak | Phase::LongBreak => Transition {
            next: Phase::Work,
            completed_work_sessions,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The countdown moved (or was already idle) and has time left.
    Counting,
    /// This tick brought the countdown to zero.
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub phase: Phase,
    pub is_running: bool,
    /// Stopped mid-phase with elapsed time retained (as opposed to reset).
    pub is_paused: bool,
    pub remaining_seconds: u32,
    pub completed_work_sessions: u32,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub phase_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub was_interrupted: bool,
}

impl SessionState {
    pub fn new(settings: &TimerSettings, now: DateTime<Utc>) -> Self {
        Self {
            phase: Phase::Work,
            is_running: false,
            is_paused: false,
            remaining_seconds: settings.duration_seconds(Phase::Work),
            completed_work_sessions: 0,
            last_updated: now,
            phase_started_at: None,
            was_interrupted: false,
        }
    }

    /// Restores a cached state for a fresh mount.
    ///
    /// A running timer is never resumed, and a stored break phase is replaced
    /// by a fresh work phase so breaks do not silently continue after a reload.
    pub fn rehydrate(
        stored: Option<SessionState>,
        settings: &TimerSettings,
        now: DateTime<Utc>,
    ) -> Self {
        let Some(mut state) = stored else {
            return Self::new(settings, now);
        };

        if state.phase.is_break() {
            let completed_work_sessions = state.completed_work_sessions;
            let mut fresh = Self::new(settings, now);
            fresh.completed_work_sessions = completed_work_sessions;
            return fresh;
        }

        if state.is_running {
            state.is_running = false;
            state.is_paused = true;
        }
        let full = settings.duration_seconds(state.phase);
        if state.remaining_seconds == 0 || state.remaining_seconds > full {
            state.remaining_seconds = full;
            state.is_paused = false;
            state.phase_started_at = None;
        }
        state.last_updated = now;
        state
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        if self.is_running {
            return;
        }
        self.is_running = true;
        self.is_paused = false;
        if self.phase_started_at.is_none() {
            self.phase_started_at = Some(now);
        }
        self.last_updated = now;
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        if !self.is_running {
            return;
        }
        self.is_running = false;
        self.is_paused = true;
        if self.phase == Phase::Work {
            self.was_interrupted = true;
        }
        self.last_updated = now;
    }

    pub fn reset(&mut self, settings: &TimerSettings, now: DateTime<Utc>) {
        self.remaining_seconds = settings.duration_seconds(self.phase);
        self.is_running = false;
        self.is_paused = false;
        self.phase_started_at = None;
        self.was_interrupted = false;
        self.last_updated = now;
    }

    /// Whether the current phase has any elapsed time to lose.
    pub fn has_progress(&self, settings: &TimerSettings) -> bool {
        self.is_running
            || self.is_paused
            || self.remaining_seconds < settings.duration_seconds(self.phase)
    }

    /// Decrements by one second while running. Never goes below zero.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        if !self.is_running || self.remaining_seconds == 0 {
            return TickOutcome::Counting;
        }
        self.remaining_seconds -= 1;
        self.last_updated = now;
        if self.remaining_seconds == 0 {
            TickOutcome::Expired
        } else {
            TickOutcome::Counting
        }
    }

    /// Snapshot of the phase that is about to end. Does not mutate.
    pub fn completion(
        &self,
        settings: &TimerSettings,
        kind: CompletionKind,
        now: DateTime<Utc>,
    ) -> PhaseCompletion {
        let planned_minutes = settings.duration_minutes(self.phase);
        let started_at = self.phase_started_at.unwrap_or_else(|| {
            let full = settings.duration_seconds(self.phase);
            let elapsed = i64::from(full.saturating_sub(self.remaining_seconds));
            now - chrono::Duration::seconds(elapsed)
        });
        let cycle_position = match self.phase {
            Phase::Work if kind != CompletionKind::Abandoned => {
                self.completed_work_sessions.saturating_add(1)
            }
            _ => self.completed_work_sessions,
        };
        PhaseCompletion {
            phase: self.phase,
            kind,
            started_at,
            ended_at: now,
            planned_minutes,
            was_interrupted: self.was_interrupted,
            cycle_position,
        }
    }

    /// Moves to the next phase and loads its defaults.
    ///
    /// `keep_running` carries the running flag into the new phase (auto-start).
    pub fn advance(
        &mut self,
        settings: &TimerSettings,
        keep_running: bool,
        now: DateTime<Utc>,
    ) -> Transition {
        let transition = next_phase(
            self.phase,
            self.completed_work_sessions,
            settings.effective_long_break_interval(),
        );
        self.phase = transition.next;
        self.completed_work_sessions = transition.completed_work_sessions;
        self.remaining_seconds = settings.duration_seconds(transition.next);
        self.is_running = keep_running;
        self.is_paused = false;
        self.was_interrupted = false;
        self.phase_started_at = if keep_running { Some(now) } else { None };
        self.last_updated = now;
        transition
    }
}
