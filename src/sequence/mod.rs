pub mod controller;
pub mod state;

pub use controller::{AdvanceOutcome, PersistFailure, PersistTarget, SequenceChange, SequenceController};
pub use state::{SequenceState, NO_STEP};
