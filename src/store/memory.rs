use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard,
    },
};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{Process, Reading, ReadingForm, StoredReading, Subprocess};
use crate::sequence::SequenceState;

use super::StudyStore;

#[derive(Default)]
struct MemoryData {
    processes: HashMap<String, Process>,
    readings: Vec<StoredReading>,
}

/// In-process store. Writes can be made to fail to exercise the
/// optimistic-update paths.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<MemoryData>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, `record_reading` and `update_process_sequence_state` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, MemoryData> {
        match self.data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("store unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl StudyStore for MemoryStore {
    async fn create_process(&self, name: &str) -> Result<Process> {
        let now = Utc::now();
        let process = Process {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            subprocesses: Vec::new(),
            sequence: SequenceState::default(),
            created_at: now,
            updated_at: now,
        };
        self.lock()
            .processes
            .insert(process.id.clone(), process.clone());
        Ok(process)
    }

    async fn add_subprocess(&self, process_id: &str, name: &str) -> Result<Subprocess> {
        let mut data = self.lock();
        let process = data
            .processes
            .get_mut(process_id)
            .ok_or_else(|| anyhow!("process {process_id} not found"))?;

        let position = process
            .subprocesses
            .last()
            .map(|sub| sub.position + 1)
            .unwrap_or(0);
        let subprocess = Subprocess {
            id: Uuid::new_v4().to_string(),
            process_id: process_id.to_string(),
            name: name.to_string(),
            position,
        };
        process.subprocesses.push(subprocess.clone());
        process.updated_at = Utc::now();
        Ok(subprocess)
    }

    async fn remove_subprocess(&self, process_id: &str, subprocess_id: &str) -> Result<()> {
        let mut data = self.lock();
        let process = data
            .processes
            .get_mut(process_id)
            .ok_or_else(|| anyhow!("process {process_id} not found"))?;
        process.subprocesses.retain(|sub| sub.id != subprocess_id);
        process.updated_at = Utc::now();
        Ok(())
    }

    async fn get_process(&self, process_id: &str) -> Result<Process> {
        self.lock()
            .processes
            .get(process_id)
            .cloned()
            .ok_or_else(|| anyhow!("process {process_id} not found"))
    }

    async fn record_reading(
        &self,
        process_id: &str,
        subprocess_id: &str,
        reading: &Reading,
        form: &ReadingForm,
    ) -> Result<()> {
        self.check_writable()?;
        if !reading.should_persist {
            bail!("display-only reading cannot be recorded");
        }

        self.lock().readings.push(StoredReading {
            id: Uuid::new_v4().to_string(),
            process_id: process_id.to_string(),
            subprocess_id: subprocess_id.to_string(),
            reading: reading.clone(),
            form: form.clone(),
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_readings(&self, process_id: &str) -> Result<Vec<StoredReading>> {
        Ok(self
            .lock()
            .readings
            .iter()
            .filter(|stored| stored.process_id == process_id)
            .cloned()
            .collect())
    }

    async fn update_process_sequence_state(
        &self,
        process_id: &str,
        state: SequenceState,
    ) -> Result<()> {
        self.check_writable()?;
        let mut data = self.lock();
        let process = data
            .processes
            .get_mut(process_id)
            .ok_or_else(|| anyhow!("process {process_id} not found"))?;
        process.sequence = state;
        process.updated_at = Utc::now();
        Ok(())
    }
}
