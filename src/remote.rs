use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CompletionRecord, TaskSummary};

/// The authenticated user's server-side records.
///
/// Every call is a network round trip that may fail; callers treat them as
/// best-effort and fall back to the local cache.
#[async_trait]
pub trait RemoteRecords: Send + Sync {
    async fn get_active_task(&self) -> Result<Option<TaskSummary>>;

    async fn set_active_task(&self, task_id: Option<&str>) -> Result<Option<TaskSummary>>;

    async fn create_completion_record(&self, record: &CompletionRecord)
        -> Result<CompletionRecord>;
}
