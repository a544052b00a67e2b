pub mod clock;
pub mod controller;
pub mod state;
pub mod ticker;

pub use clock::{DriftCorrectedInterval, Fire};
pub use controller::TimerController;
pub use state::{
    next_phase, CompletionKind, Phase, PhaseCompletion, SessionState, TickOutcome, Transition,
};
pub use ticker::{TickDisposition, TickerHandle};
