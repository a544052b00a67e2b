mod dispatcher;
mod guard;

pub use dispatcher::{CompletionDispatcher, DispatchOutcome};
pub use guard::DispatchGuard;
