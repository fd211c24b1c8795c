//! Stopwatch and sequencing engine for time-and-motion studies.
//!
//! [`timer::TimerEngine`] keeps one stopwatch per (process, subprocess) and
//! [`sequence::SequenceController`] walks a process through its steps on top
//! of it. [`workbench::Workbench`] is the glue a study screen talks to.

pub mod db;
pub mod errors;
pub mod models;
pub mod notify;
pub mod sequence;
pub mod settings;
pub mod store;
pub mod timer;
pub mod utils;
pub mod workbench;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};

pub use db::Database;
pub use errors::{SequenceError, TimerError};
pub use models::{ActivityKind, Process, Reading, ReadingForm, StoredReading, Subprocess};
pub use notify::{LogNotifier, Notice, NoticeKind, NoticeLog, Notifier};
pub use sequence::{AdvanceOutcome, SequenceController, SequenceState};
pub use settings::{SettingsStore, TimerSettings};
pub use store::{MemoryStore, StudyStore};
pub use timer::{StartKind, TimerEngine, TimerEvent, TimerKey, TimerSnapshot, TimerStatus};
pub use workbench::{LapOutcome, Workbench};

/// Initialise `env_logger` (reads `RUST_LOG`, defaults to info).
/// Later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

/// Build a workbench over an on-disk study directory: `timestudy.sqlite3`
/// for processes and readings, `settings.json` for timer settings.
pub fn open_workbench(data_dir: &Path, notifier: Arc<dyn Notifier>) -> Result<Workbench> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let database = Database::new(data_dir.join("timestudy.sqlite3"))?;
    let settings = SettingsStore::new(data_dir.join("settings.json"))?;

    log::info!("Time study workbench opened at {}", data_dir.display());
    Ok(Workbench::new(settings.timer(), Arc::new(database), notifier))
}
