//! State-misuse errors.
//!
//! These are expected outcomes of UI races (double clicks, stale buttons) and
//! are returned as values. Infrastructure failures go through `anyhow`.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    #[error("timer is already running")]
    AlreadyRunning,

    #[error("timer is not running")]
    NotRunning,

    #[error("timers are suspended while setup mode is active")]
    Suspended,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceError {
    #[error("sequence mode is not enabled or the process has no subprocesses")]
    NotEnabled,

    #[error("sequence index {0} does not point at a subprocess")]
    InvalidIndex(i64),

    #[error("an advance is already in progress for this process")]
    AdvanceInFlight,
}
