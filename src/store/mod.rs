//! Persistence collaborator.
//!
//! The engine never waits on a store to change its own state; callers hand
//! captured readings and sequence positions over after the fact.

mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Process, Reading, ReadingForm, StoredReading, Subprocess};
use crate::sequence::SequenceState;

pub use memory::MemoryStore;

#[async_trait]
pub trait StudyStore: Send + Sync {
    async fn create_process(&self, name: &str) -> Result<Process>;

    /// Appends a step at the end of the process.
    async fn add_subprocess(&self, process_id: &str, name: &str) -> Result<Subprocess>;

    async fn remove_subprocess(&self, process_id: &str, subprocess_id: &str) -> Result<()>;

    /// The process with its subprocesses in step order.
    async fn get_process(&self, process_id: &str) -> Result<Process>;

    /// Store one completed measurement. Fails for display-only readings.
    /// No deduplication happens here.
    async fn record_reading(
        &self,
        process_id: &str,
        subprocess_id: &str,
        reading: &Reading,
        form: &ReadingForm,
    ) -> Result<()>;

    async fn list_readings(&self, process_id: &str) -> Result<Vec<StoredReading>>;

    async fn update_process_sequence_state(
        &self,
        process_id: &str,
        state: SequenceState,
    ) -> Result<()>;
}
