pub mod engine;
pub mod state;

pub use engine::{StartKind, TimerEngine, TimerEvent, TimerSnapshot};
pub use state::{Stopwatch, TimerKey, TimerStatus};
