use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sequence::SequenceState;
use crate::timer::TimerKey;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subprocess {
    pub id: String,
    pub process_id: String,
    pub name: String,
    pub position: u32,
}

/// A unit of work with its subprocesses in step order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub id: String,
    pub name: String,
    pub subprocesses: Vec<Subprocess>,
    pub sequence: SequenceState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Process {
    pub fn step_count(&self) -> usize {
        self.subprocesses.len()
    }

    pub fn timer_key(&self, index: usize) -> Option<TimerKey> {
        self.subprocesses
            .get(index)
            .map(|sub| TimerKey::new(&self.id, &sub.id))
    }

    pub fn subprocess(&self, subprocess_id: &str) -> Option<&Subprocess> {
        self.subprocesses.iter().find(|sub| sub.id == subprocess_id)
    }
}
