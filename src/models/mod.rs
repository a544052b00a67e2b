mod completion;
mod task;

pub use completion::{CompletionNotice, CompletionRecord, LocalStats};
pub use task::{ActiveTask, TaskSummary};
