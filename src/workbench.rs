//! Caller-side glue: the operations a study screen triggers, each paired
//! with a notice and, for laps, a store write.

use std::sync::Arc;

use anyhow::Result;

use crate::errors::{SequenceError, TimerError};
use crate::models::{Process, Reading, ReadingForm};
use crate::notify::{NoticeKind, Notifier};
use crate::sequence::{AdvanceOutcome, PersistFailure, PersistTarget, SequenceChange, SequenceController};
use crate::settings::TimerSettings;
use crate::store::StudyStore;
use crate::timer::{StartKind, TimerEngine, TimerKey};

#[derive(Debug, Clone, PartialEq)]
pub struct LapOutcome {
    pub reading: Reading,
    pub persist_failure: Option<PersistFailure>,
}

pub struct Workbench {
    engine: TimerEngine,
    sequence: SequenceController,
    store: Arc<dyn StudyStore>,
    notifier: Arc<dyn Notifier>,
}

impl Workbench {
    pub fn new(
        settings: TimerSettings,
        store: Arc<dyn StudyStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let engine = TimerEngine::new(settings);
        let sequence = SequenceController::new(engine.clone(), store.clone());
        Self {
            engine,
            sequence,
            store,
            notifier,
        }
    }

    pub fn engine(&self) -> &TimerEngine {
        &self.engine
    }

    pub fn sequence(&self) -> &SequenceController {
        &self.sequence
    }

    pub fn store(&self) -> &Arc<dyn StudyStore> {
        &self.store
    }

    /// Load a process and adopt its (healed) sequence state.
    pub async fn open_process(&self, process_id: &str) -> Result<Process> {
        let mut process = self.store.get_process(process_id).await?;
        let change = self.sequence.load(&process).await;
        self.report_persist_failures(&change.persist_failures);
        process.sequence = change.state;
        Ok(process)
    }

    pub async fn start(&self, key: &TimerKey) -> Result<StartKind, TimerError> {
        let result = self.engine.start(key).await;
        match result {
            Ok(StartKind::Fresh) => self.notify(NoticeKind::Success, "Timer started", &key.to_string()),
            Ok(StartKind::Resumed) => self.notify(NoticeKind::Success, "Timer resumed", &key.to_string()),
            Err(err) => self.notify(NoticeKind::Error, "Cannot start timer", &err.to_string()),
        }
        result
    }

    pub async fn pause(&self, key: &TimerKey) -> Result<Reading, TimerError> {
        let result = self.engine.pause(key).await;
        match &result {
            Ok(reading) => self.notify(NoticeKind::Success, "Timer paused", &reading.formatted_time),
            Err(err) => self.notify(NoticeKind::Error, "Cannot pause timer", &err.to_string()),
        }
        result
    }

    /// Record a lap and hand it to the store. A failed write is reported,
    /// the timer keeps running from zero either way.
    pub async fn lap(&self, key: &TimerKey, form: &ReadingForm) -> Result<LapOutcome, TimerError> {
        let reading = match self.engine.lap(key).await {
            Ok(reading) => reading,
            Err(err) => {
                self.notify(NoticeKind::Error, "Cannot record lap", &err.to_string());
                return Err(err);
            }
        };

        let persist_failure = match self
            .store
            .record_reading(&key.process_id, &key.subprocess_id, &reading, form)
            .await
        {
            Ok(()) => {
                self.notify(NoticeKind::Success, "Lap recorded", &reading.formatted_time);
                None
            }
            Err(err) => {
                let failure = PersistFailure {
                    target: PersistTarget::Reading,
                    message: format!("{err:#}"),
                };
                self.report_persist_failures(std::slice::from_ref(&failure));
                Some(failure)
            }
        };

        Ok(LapOutcome {
            reading,
            persist_failure,
        })
    }

    pub async fn reset(&self, key: &TimerKey) -> bool {
        let removed = self.engine.reset(key).await;
        if removed {
            self.notify(NoticeKind::Info, "Timer reset", &key.to_string());
        } else {
            self.notify(NoticeKind::Info, "Timer already at zero", &key.to_string());
        }
        removed
    }

    pub async fn advance(
        &self,
        process: &Process,
        form: &ReadingForm,
    ) -> Result<AdvanceOutcome, SequenceError> {
        let outcome = match self.sequence.advance(process, form).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.notify(NoticeKind::Error, "Cannot advance", &err.to_string());
                return Err(err);
            }
        };

        let step_name = process
            .subprocesses
            .get(outcome.current_index)
            .map(|sub| sub.name.as_str())
            .unwrap_or_default();
        match (&outcome.started, outcome.reading()) {
            (Err(err), _) => self.notify(
                NoticeKind::Error,
                "Advanced without timer",
                &format!("{step_name}: {err}"),
            ),
            (Ok(_), Some(reading)) => self.notify(
                NoticeKind::Success,
                "Step recorded",
                &format!("{} - now timing {step_name}", reading.formatted_time),
            ),
            (Ok(_), None) => self.notify(
                NoticeKind::Info,
                "Step skipped",
                &format!("now timing {step_name}"),
            ),
        }
        self.report_persist_failures(&outcome.persist_failures);
        Ok(outcome)
    }

    pub async fn set_sequence(&self, process: &Process, enabled: bool) -> SequenceChange {
        let change = if enabled {
            self.sequence.enable(process).await
        } else {
            self.sequence.disable(process).await
        };

        let title = if enabled {
            "Sequence mode on"
        } else {
            "Sequence mode off"
        };
        self.notify(NoticeKind::Info, title, &process.name);
        self.report_persist_failures(&change.persist_failures);
        change
    }

    /// Pause everything and block starts until `exit_setup_mode`.
    pub async fn enter_setup_mode(&self) -> usize {
        let paused = self.engine.suspend_all().await.len();
        self.notify(
            NoticeKind::Info,
            "Setup mode",
            &format!("{paused} timer(s) paused"),
        );
        paused
    }

    pub async fn exit_setup_mode(&self) {
        self.engine.release().await;
        self.notify(NoticeKind::Info, "Setup mode", "timers available again");
    }

    fn report_persist_failures(&self, failures: &[PersistFailure]) {
        for failure in failures {
            let title = match failure.target {
                PersistTarget::Reading => "Reading not saved",
                PersistTarget::SequenceState => "Sequence position not saved",
            };
            self.notify(NoticeKind::Error, title, &failure.message);
        }
    }

    fn notify(&self, kind: NoticeKind, title: &str, message: &str) {
        self.notifier.notify(kind, title, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoticeLog;
    use crate::store::MemoryStore;
    use std::time::Duration;
    use tokio::time;

    fn bench() -> (Workbench, Arc<MemoryStore>, Arc<NoticeLog>) {
        let store = Arc::new(MemoryStore::new());
        let notices = Arc::new(NoticeLog::new());
        let bench = Workbench::new(TimerSettings::default(), store.clone(), notices.clone());
        (bench, store, notices)
    }

    #[tokio::test(start_paused = true)]
    async fn lap_is_persisted_once_with_form() {
        let (bench, store, notices) = bench();
        let process = store.create_process("Assembly").await.unwrap();
        let pick = store.add_subprocess(&process.id, "Pick").await.unwrap();
        let key = TimerKey::new(&process.id, &pick.id);
        let form = ReadingForm {
            remarks: Some("first cycle".into()),
            ..ReadingForm::default()
        };

        bench.start(&key).await.unwrap();
        time::sleep(Duration::from_millis(2_500)).await;
        let outcome = bench.lap(&key, &form).await.unwrap();

        assert!(outcome.persist_failure.is_none());
        let stored = store.list_readings(&process.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].reading, outcome.reading);
        assert_eq!(stored[0].form, form);

        let kinds: Vec<_> = notices.take().into_iter().map(|n| n.kind).collect();
        assert_eq!(kinds, [NoticeKind::Success, NoticeKind::Success]);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_never_touches_the_store() {
        let (bench, store, _) = bench();
        let process = store.create_process("Assembly").await.unwrap();
        let pick = store.add_subprocess(&process.id, "Pick").await.unwrap();
        let key = TimerKey::new(&process.id, &pick.id);

        bench.start(&key).await.unwrap();
        bench.pause(&key).await.unwrap();

        assert!(store.list_readings(&process.id).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn misuse_yields_error_notices() {
        let (bench, _, notices) = bench();
        let key = TimerKey::new("assembly", "pick");

        assert_eq!(bench.pause(&key).await, Err(TimerError::NotRunning));
        bench.enter_setup_mode().await;
        assert_eq!(bench.start(&key).await, Err(TimerError::Suspended));
        bench.exit_setup_mode().await;
        assert_eq!(bench.start(&key).await, Ok(StartKind::Fresh));

        let titles: Vec<_> = notices.take().into_iter().map(|n| n.title).collect();
        assert_eq!(
            titles,
            [
                "Cannot pause timer",
                "Setup mode",
                "Cannot start timer",
                "Setup mode",
                "Timer started"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_lap_write_keeps_timer_running() {
        let (bench, store, notices) = bench();
        let key = TimerKey::new("assembly", "pick");
        store.set_fail_writes(true);

        bench.start(&key).await.unwrap();
        let outcome = bench.lap(&key, &ReadingForm::default()).await.unwrap();

        assert!(outcome.persist_failure.is_some());
        assert!(bench.engine().is_running(&key).await);
        let last = notices.take().pop().unwrap();
        assert_eq!(last.kind, NoticeKind::Error);
        assert_eq!(last.title, "Reading not saved");
    }

    #[tokio::test(start_paused = true)]
    async fn open_process_heals_removed_steps() {
        let (bench, store, _) = bench();
        let process = store.create_process("Assembly").await.unwrap();
        let pick = store.add_subprocess(&process.id, "Pick").await.unwrap();
        let place = store.add_subprocess(&process.id, "Place").await.unwrap();
        store
            .update_process_sequence_state(&process.id, crate::sequence::SequenceState::at(1))
            .await
            .unwrap();
        store.remove_subprocess(&process.id, &place.id).await.unwrap();

        let opened = bench.open_process(&process.id).await.unwrap();

        assert_eq!(opened.sequence.current_index, 0);
        assert_eq!(opened.subprocesses, vec![pick]);
    }

    #[tokio::test(start_paused = true)]
    async fn every_reset_is_announced() {
        let (bench, _, notices) = bench();
        let pick = TimerKey::new("assembly", "pick");

        bench.start(&pick).await.unwrap();
        notices.take();
        assert!(bench.reset(&pick).await);
        assert!(!bench.reset(&pick).await);

        let titles: Vec<_> = notices.take().into_iter().map(|n| (n.kind, n.title)).collect();
        assert_eq!(
            titles,
            [
                (NoticeKind::Info, "Timer reset".to_string()),
                (NoticeKind::Info, "Timer already at zero".to_string()),
            ]
        );
    }
}
