use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex as StdMutex},
};

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::errors::{SequenceError, TimerError};
use crate::models::{Process, Reading, ReadingForm};
use crate::store::StudyStore;
use crate::timer::{StartKind, TimerEngine, TimerKey};

use super::SequenceState;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PersistTarget {
    Reading,
    SequenceState,
}

/// A store write that failed after the engine had already moved on.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistFailure {
    pub target: PersistTarget,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceChange {
    pub state: SequenceState,
    pub stopped: usize,
    pub persist_failures: Vec<PersistFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdvanceOutcome {
    /// Step whose running time was captured, with the captured reading.
    pub captured: Option<(TimerKey, Reading)>,
    pub previous_index: usize,
    pub current_index: usize,
    pub started_key: TimerKey,
    /// Failing to start the next timer does not undo the step boundary.
    pub started: Result<StartKind, TimerError>,
    pub persist_failures: Vec<PersistFailure>,
}

impl AdvanceOutcome {
    pub fn reading(&self) -> Option<&Reading> {
        self.captured.as_ref().map(|(_, reading)| reading)
    }
}

/// Removes the process from the in-flight set when an advance ends.
struct InFlight {
    set: Arc<StdMutex<HashSet<String>>>,
    process_id: String,
}

impl InFlight {
    fn acquire(set: &Arc<StdMutex<HashSet<String>>>, process_id: &str) -> Option<Self> {
        let mut guard = match set.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !guard.insert(process_id.to_string()) {
            return None;
        }
        Some(Self {
            set: set.clone(),
            process_id: process_id.to_string(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut guard = match self.set.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.remove(&self.process_id);
    }
}

/// Drives a process's subprocesses one step at a time on top of the engine.
///
/// Holds only `SequenceState` per process; every timer change goes through
/// the engine's public operations. State changes of one process run one at
/// a time, store writes included.
pub struct SequenceController {
    engine: TimerEngine,
    store: Arc<dyn StudyStore>,
    states: Mutex<HashMap<String, SequenceState>>,
    in_flight: Arc<StdMutex<HashSet<String>>>,
    process_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SequenceController {
    pub fn new(engine: TimerEngine, store: Arc<dyn StudyStore>) -> Self {
        Self {
            engine,
            store,
            states: Mutex::new(HashMap::new()),
            in_flight: Arc::new(StdMutex::new(HashSet::new())),
            process_locks: StdMutex::new(HashMap::new()),
        }
    }

    async fn serialize(&self, process_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.process_locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks.entry(process_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Adopt the persisted state of a freshly loaded process, repairing an
    /// index that no longer fits its subprocess list.
    pub async fn load(&self, process: &Process) -> SequenceChange {
        let _serial = self.serialize(&process.id).await;
        let healed = process.sequence.healed(process.step_count());
        let mut persist_failures = Vec::new();

        if healed != process.sequence {
            log_warn!(
                "Process {} had sequence index {} for {} step(s); reset to {}",
                process.id,
                process.sequence.current_index,
                process.step_count(),
                healed.current_index
            );
            self.persist_state(&process.id, healed, &mut persist_failures)
                .await;
        }

        self.states.lock().await.insert(process.id.clone(), healed);
        SequenceChange {
            state: healed,
            stopped: 0,
            persist_failures,
        }
    }

    pub async fn state(&self, process_id: &str) -> Option<SequenceState> {
        self.states.lock().await.get(process_id).copied()
    }

    pub async fn enable(&self, process: &Process) -> SequenceChange {
        let _serial = self.serialize(&process.id).await;
        let stopped = self.engine.pause_process(&process.id, None).await.len();
        let state = SequenceState::enabled_for(process.step_count());
        self.states.lock().await.insert(process.id.clone(), state);
        log_info!(
            "Sequence mode enabled for process {} ({} step(s))",
            process.id,
            process.step_count()
        );

        let mut persist_failures = Vec::new();
        self.persist_state(&process.id, state, &mut persist_failures)
            .await;
        SequenceChange {
            state,
            stopped,
            persist_failures,
        }
    }

    pub async fn disable(&self, process: &Process) -> SequenceChange {
        let _serial = self.serialize(&process.id).await;
        let stopped = self.engine.pause_process(&process.id, None).await.len();
        let state = SequenceState::disabled();
        self.states.lock().await.insert(process.id.clone(), state);
        log_info!("Sequence mode disabled for process {}", process.id);

        let mut persist_failures = Vec::new();
        self.persist_state(&process.id, state, &mut persist_failures)
            .await;
        SequenceChange {
            state,
            stopped,
            persist_failures,
        }
    }

    /// Point the sequence at a specific step without starting it.
    pub async fn select_step(
        &self,
        process: &Process,
        index: usize,
    ) -> Result<SequenceChange, SequenceError> {
        let _serial = self.serialize(&process.id).await;
        let current = self.current_state(process).await;
        if current.step(process.step_count()).is_none() {
            return Err(SequenceError::NotEnabled);
        }
        if index >= process.step_count() {
            return Err(SequenceError::InvalidIndex(index as i64));
        }

        let stopped = self.engine.pause_process(&process.id, None).await.len();
        let state = SequenceState::at(index);
        self.states.lock().await.insert(process.id.clone(), state);
        log_info!("Process {} sequence moved to step {}", process.id, index);

        let mut persist_failures = Vec::new();
        self.persist_state(&process.id, state, &mut persist_failures)
            .await;
        Ok(SequenceChange {
            state,
            stopped,
            persist_failures,
        })
    }

    /// Close the current step and open the next one.
    ///
    /// A running current step is paused and its reading recorded as a
    /// completed measurement; a step that was never started is skipped
    /// without a reading. Every other timer of the process is stopped and the
    /// next step (wrapping after the last) starts from zero.
    ///
    /// The next step is reset before it starts, so its lap history and last
    /// recorded time are cleared at every step boundary.
    pub async fn advance(
        &self,
        process: &Process,
        form: &ReadingForm,
    ) -> Result<AdvanceOutcome, SequenceError> {
        let _in_flight =
            InFlight::acquire(&self.in_flight, &process.id).ok_or(SequenceError::AdvanceInFlight)?;
        let _serial = self.serialize(&process.id).await;

        let state = self.current_state(process).await;
        let step_count = process.step_count();
        let index = state.step(step_count).ok_or(SequenceError::NotEnabled)?;
        if usize::try_from(state.current_index).ok() != Some(index) {
            log_warn!(
                "Process {} sequence index {} out of range; using step 0",
                process.id,
                state.current_index
            );
        }

        let current_key = process
            .timer_key(index)
            .ok_or(SequenceError::InvalidIndex(index as i64))?;
        let next_index = (index + 1) % step_count;
        let next_key = process
            .timer_key(next_index)
            .ok_or(SequenceError::InvalidIndex(next_index as i64))?;

        let captured = if self.engine.is_running(&current_key).await {
            match self.engine.pause(&current_key).await {
                Ok(reading) => Some((current_key.clone(), reading.into_persisted())),
                Err(err) => {
                    log_warn!("Step {current_key} stopped before capture: {err}");
                    None
                }
            }
        } else {
            log_info!("Step {current_key} was not running; no reading captured");
            None
        };

        self.engine.pause_process(&process.id, None).await;
        self.engine.reset(&next_key).await;
        let started = self.engine.start(&next_key).await;
        if let Err(err) = started {
            log_error!("Failed to start step {next_key}: {err}");
        }

        let new_state = SequenceState::at(next_index);
        self.states
            .lock()
            .await
            .insert(process.id.clone(), new_state);
        log_info!(
            "Process {} advanced from step {} to step {}",
            process.id,
            index,
            next_index
        );

        let mut persist_failures = Vec::new();
        if let Some((key, reading)) = &captured {
            if let Err(err) = self
                .store
                .record_reading(&key.process_id, &key.subprocess_id, reading, form)
                .await
            {
                log_error!("Failed to record reading for step {key}: {err:#}");
                persist_failures.push(PersistFailure {
                    target: PersistTarget::Reading,
                    message: format!("{err:#}"),
                });
            }
        }
        self.persist_state(&process.id, new_state, &mut persist_failures)
            .await;

        Ok(AdvanceOutcome {
            captured,
            previous_index: index,
            current_index: next_index,
            started_key: next_key,
            started,
            persist_failures,
        })
    }

    async fn current_state(&self, process: &Process) -> SequenceState {
        self.states
            .lock()
            .await
            .get(&process.id)
            .copied()
            .unwrap_or(process.sequence)
    }

    async fn persist_state(
        &self,
        process_id: &str,
        state: SequenceState,
        failures: &mut Vec<PersistFailure>,
    ) {
        if let Err(err) = self
            .store
            .update_process_sequence_state(process_id, state)
            .await
        {
            log_error!("Failed to persist sequence state for process {process_id}: {err:#}");
            failures.push(PersistFailure {
                target: PersistTarget::SequenceState,
                message: format!("{err:#}"),
            });
        }
    }
}
