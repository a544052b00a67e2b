mod reconciler;
mod resolve;

pub use reconciler::ActiveTaskReconciler;
pub use resolve::{resolve_active_task, RemoteLookup, Resolution, ResolutionSource};
