use crate::models::{ActiveTask, TaskSummary};

/// What the remote record said, if we could ask it at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteLookup {
    Unauthenticated,
    Failed,
    Found(Option<ActiveTask>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Remote,
    Cache,
    TaskList,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub task: ActiveTask,
    pub source: ResolutionSource,
}

impl Resolution {
    /// Whether the local cache must be rewritten to match.
    pub fn writes_cache(&self) -> bool {
        matches!(
            self.source,
            ResolutionSource::Remote | ResolutionSource::TaskList | ResolutionSource::Empty
        )
    }
}

/// Picks the active task from the three stored copies.
///
/// 1. A task returned by the remote record wins.
/// 2. Otherwise the cached task, when its id matches `last_known_id`
///    (or no id is known at all).
/// 3. Otherwise `last_known_id` looked up in the cached task list.
/// 4. Otherwise nothing is active.
pub fn resolve_active_task(
    remote: RemoteLookup,
    cached: Option<ActiveTask>,
    last_known_id: Option<&str>,
    task_list: &[TaskSummary],
) -> Resolution {
    if let RemoteLookup::Found(Some(task)) = remote {
        if !task.is_empty() {
            return Resolution {
                task,
                source: ResolutionSource::Remote,
            };
        }
    }

    if let Some(task) = cached.filter(|task| !task.is_empty()) {
        let matches = match last_known_id {
            Some(id) => task.has_id(id),
            None => true,
        };
        if matches {
            return Resolution {
                task,
                source: ResolutionSource::Cache,
            };
        }
    }

    if let Some(id) = last_known_id {
        if let Some(found) = task_list.iter().find(|task| task.id == id) {
            return Resolution {
                task: found.into(),
                source: ResolutionSource::TaskList,
            };
        }
    }

    Resolution {
        task: ActiveTask::empty(),
        source: ResolutionSource::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str) -> ActiveTask {
        ActiveTask {
            id: Some(id.to_string()),
            project_id: Some(format!("proj-{id}")),
            title: Some(format!("Task {id}")),
            project_title: None,
        }
    }

    fn summary(id: &str) -> TaskSummary {
        TaskSummary {
            id: id.to_string(),
            title: format!("Listed {id}"),
            project_id: None,
            project_title: None,
        }
    }

    struct Case {
        name: &'static str,
        remote: RemoteLookup,
        cached: Option<ActiveTask>,
        last_known: Option<&'static str>,
        list: Vec<TaskSummary>,
        expected_id: Option<&'static str>,
        expected_source: ResolutionSource,
    }

    #[test]
    fn precedence_table() {
        let cases = vec![
            Case {
                name: "remote wins over cache",
                remote: RemoteLookup::Found(Some(task("r"))),
                cached: Some(task("c")),
                last_known: Some("c"),
                list: vec![summary("c")],
                expected_id: Some("r"),
                expected_source: ResolutionSource::Remote,
            },
            Case {
                name: "remote without task falls through to cache",
                remote: RemoteLookup::Found(None),
                cached: Some(task("c")),
                last_known: Some("c"),
                list: vec![],
                expected_id: Some("c"),
                expected_source: ResolutionSource::Cache,
            },
            Case {
                name: "remote failure falls back to cache",
                remote: RemoteLookup::Failed,
                cached: Some(task("c")),
                last_known: Some("c"),
                list: vec![],
                expected_id: Some("c"),
                expected_source: ResolutionSource::Cache,
            },
            Case {
                name: "cached task with no known id is trusted",
                remote: RemoteLookup::Unauthenticated,
                cached: Some(task("c")),
                last_known: None,
                list: vec![],
                expected_id: Some("c"),
                expected_source: ResolutionSource::Cache,
            },
            Case {
                name: "mismatched cache uses task list",
                remote: RemoteLookup::Unauthenticated,
                cached: Some(task("c")),
                last_known: Some("l"),
                list: vec![summary("x"), summary("l")],
                expected_id: Some("l"),
                expected_source: ResolutionSource::TaskList,
            },
            Case {
                name: "empty cache uses task list",
                remote: RemoteLookup::Failed,
                cached: None,
                last_known: Some("l"),
                list: vec![summary("l")],
                expected_id: Some("l"),
                expected_source: ResolutionSource::TaskList,
            },
            Case {
                name: "unknown id resolves to empty",
                remote: RemoteLookup::Unauthenticated,
                cached: Some(task("c")),
                last_known: Some("gone"),
                list: vec![summary("x")],
                expected_id: None,
                expected_source: ResolutionSource::Empty,
            },
            Case {
                name: "nothing anywhere",
                remote: RemoteLookup::Unauthenticated,
                cached: None,
                last_known: None,
                list: vec![],
                expected_id: None,
                expected_source: ResolutionSource::Empty,
            },
        ];

        for case in cases {
            let resolution =
                resolve_active_task(case.remote, case.cached, case.last_known, &case.list);
            assert_eq!(
                resolution.task.id.as_deref(),
                case.expected_id,
                "{}",
                case.name
            );
            assert_eq!(resolution.source, case.expected_source, "{}", case.name);
        }
    }

    #[test]
    fn task_list_hit_carries_titles() {
        let resolution = resolve_active_task(
            RemoteLookup::Unauthenticated,
            None,
            Some("l"),
            &[summary("l")],
        );
        assert_eq!(resolution.task.title.as_deref(), Some("Listed l"));
        assert!(resolution.writes_cache());
    }
}
