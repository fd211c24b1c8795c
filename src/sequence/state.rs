use serde::{Deserialize, Serialize};

/// `current_index` value meaning "no valid step".
pub const NO_STEP: i64 = -1;

/// Per-process sequence position, persisted next to the process record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SequenceState {
    pub enabled: bool,
    pub current_index: i64,
}

impl Default for SequenceState {
    fn default() -> Self {
        Self::disabled()
    }
}

impl SequenceState {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            current_index: NO_STEP,
        }
    }

    /// Freshly enabled: first step, or inert when there are no steps.
    pub fn enabled_for(step_count: usize) -> Self {
        Self {
            enabled: true,
            current_index: if step_count > 0 { 0 } else { NO_STEP },
        }
    }

    pub fn at(index: usize) -> Self {
        Self {
            enabled: true,
            current_index: index as i64,
        }
    }

    /// The step this state points at, if sequence mode can act at all.
    /// An out-of-range index is read as step 0.
    pub fn step(&self, step_count: usize) -> Option<usize> {
        if !self.enabled || step_count == 0 {
            return None;
        }
        match usize::try_from(self.current_index) {
            Ok(index) if index < step_count => Some(index),
            _ => Some(0),
        }
    }

    /// Repair a persisted state against the current subprocess list.
    pub fn healed(self, step_count: usize) -> Self {
        if !self.enabled {
            return Self::disabled();
        }
        match self.step(step_count) {
            Some(index) => Self::at(index),
            None => Self::enabled_for(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabling_without_steps_is_inert() {
        let state = SequenceState::enabled_for(0);
        assert!(state.enabled);
        assert_eq!(state.current_index, NO_STEP);
        assert_eq!(state.step(0), None);
    }

    #[test]
    fn out_of_range_index_heals_to_first_step() {
        let stale = SequenceState {
            enabled: true,
            current_index: 5,
        };
        assert_eq!(stale.step(3), Some(0));
        assert_eq!(stale.healed(3), SequenceState::at(0));

        let negative = SequenceState {
            enabled: true,
            current_index: NO_STEP,
        };
        assert_eq!(negative.healed(2), SequenceState::at(0));
    }

    #[test]
    fn healing_keeps_valid_and_disabled_states() {
        assert_eq!(SequenceState::at(2).healed(3), SequenceState::at(2));
        assert_eq!(SequenceState::at(2).healed(0), SequenceState::enabled_for(0));
        let odd = SequenceState {
            enabled: false,
            current_index: 4,
        };
        assert_eq!(odd.healed(6), SequenceState::disabled());
    }
}
