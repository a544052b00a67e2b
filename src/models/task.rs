use serde::{Deserialize, Serialize};

/// The task currently credited with focus time. Every field may be empty.
///
/// Titles are captured when the task is assigned so completion notices never
/// need a second lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActiveTask {
    pub id: Option<String>,
    pub project_id: Option<String>,
    pub title: Option<String>,
    pub project_title: Option<String>,
}

impl ActiveTask {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none()
    }

    pub fn has_id(&self, id: &str) -> bool {
        self.id.as_deref() == Some(id)
    }
}

/// A task as it appears in the cached task list or in the remote record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub project_title: Option<String>,
}

impl From<TaskSummary> for ActiveTask {
    fn from(task: TaskSummary) -> Self {
        Self {
            id: Some(task.id),
            project_id: task.project_id,
            title: Some(task.title),
            project_title: task.project_title,
        }
    }
}

impl From<&TaskSummary> for ActiveTask {
    fn from(task: &TaskSummary) -> Self {
        task.clone().into()
    }
}
