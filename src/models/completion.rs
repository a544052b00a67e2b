use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ActiveTask;

/// One finished work session. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub id: String,
    pub task_id: Option<String>,
    pub project_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: u32,
    pub was_interrupted: bool,
}

/// Payload of the `pomodoro-completed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionNotice {
    pub record: CompletionRecord,
    pub task: ActiveTask,
    /// Work sessions completed in the current long-break cycle, including this one.
    pub cycle_position: u32,
    pub long_break_interval: u32,
}

/// Aggregate counters kept in the local cache when nothing remote is available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalStats {
    pub total_pomodoros: u64,
    pub total_focus_minutes: u64,
    pub per_task: HashMap<String, u64>,
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl LocalStats {
    pub fn fold(&mut self, record: &CompletionRecord) {
        self.total_pomodoros += 1;
        self.total_focus_minutes += u64::from(record.duration_minutes);
        if let Some(task_id) = &record.task_id {
            *self.per_task.entry(task_id.clone()).or_insert(0) += 1;
        }
        self.last_completed_at = Some(match self.last_completed_at {
            Some(previous) if previous > record.end_time => previous,
            _ => record.end_time,
        });
    }
}
