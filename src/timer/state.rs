use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::models::Reading;
use crate::utils::DisplayPrecision;

/// Identifies one stopwatch: a subprocess inside a process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerKey {
    pub process_id: String,
    pub subprocess_id: String,
}

impl TimerKey {
    pub fn new(process_id: impl Into<String>, subprocess_id: impl Into<String>) -> Self {
        Self {
            process_id: process_id.into(),
            subprocess_id: subprocess_id.into(),
        }
    }

    pub fn belongs_to(&self, process_id: &str) -> bool {
        self.process_id == process_id
    }
}

impl fmt::Display for TimerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.process_id, self.subprocess_id)
    }
}

/// `Idle` is never stored: an absent table entry is the idle timer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    Idle,
    Running,
    Paused,
}

impl Default for TimerStatus {
    fn default() -> Self {
        TimerStatus::Idle
    }
}

/// One entry of the engine's timer table.
#[derive(Debug, Clone)]
pub struct Stopwatch {
    pub status: TimerStatus,
    /// Virtual start: `now - anchor` is the elapsed time while running.
    /// Rewritten on resume and on lap so no separate accumulator is needed.
    pub anchor: Instant,
    pub elapsed_ms: u64,
    pub laps: Vec<Reading>,
    pub last_recorded: Option<String>,
}

impl Stopwatch {
    pub fn started(now: Instant) -> Self {
        Self {
            status: TimerStatus::Running,
            anchor: now,
            elapsed_ms: 0,
            laps: Vec::new(),
            last_recorded: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    pub fn current_elapsed_ms(&self, now: Instant) -> u64 {
        if self.is_running() {
            now.saturating_duration_since(self.anchor).as_millis() as u64
        } else {
            self.elapsed_ms
        }
    }

    pub fn sync_elapsed(&mut self, now: Instant) {
        if self.is_running() {
            self.elapsed_ms = self.current_elapsed_ms(now);
        }
    }

    /// Move the anchor back by the frozen elapsed time and run again.
    pub fn resume(&mut self, now: Instant) {
        let frozen = std::time::Duration::from_millis(self.elapsed_ms);
        self.anchor = now.checked_sub(frozen).unwrap_or(now);
        self.status = TimerStatus::Running;
    }

    pub fn pause(
        &mut self,
        now: Instant,
        wall_now: DateTime<Utc>,
        precision: DisplayPrecision,
    ) -> Reading {
        self.sync_elapsed(now);
        self.status = TimerStatus::Paused;
        let reading = Reading::capture(self.elapsed_ms, wall_now, precision, false);
        self.last_recorded = Some(reading.formatted_time.clone());
        reading
    }

    /// Record the running time and restart from zero in the same step.
    pub fn lap(
        &mut self,
        now: Instant,
        wall_now: DateTime<Utc>,
        precision: DisplayPrecision,
    ) -> Reading {
        let elapsed_ms = self.current_elapsed_ms(now);
        let reading = Reading::capture(elapsed_ms, wall_now, precision, true);
        self.laps.push(reading.clone());
        self.last_recorded = Some(reading.formatted_time.clone());
        self.anchor = now;
        self.elapsed_ms = 0;
        reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn resume_keeps_elapsed_continuous() {
        let t0 = Instant::now();
        let mut watch = Stopwatch::started(t0);

        watch.pause(t0 + Duration::from_millis(700), Utc::now(), DisplayPrecision::Seconds);
        assert_eq!(watch.elapsed_ms, 700);

        let resumed_at = t0 + Duration::from_secs(10);
        watch.resume(resumed_at);
        assert_eq!(
            watch.current_elapsed_ms(resumed_at + Duration::from_millis(300)),
            1_000
        );
    }

    #[test]
    fn lap_restarts_from_zero_and_keeps_running() {
        let t0 = Instant::now();
        let mut watch = Stopwatch::started(t0);
        let at = t0 + Duration::from_millis(1_250);

        let reading = watch.lap(at, Utc::now(), DisplayPrecision::Centiseconds);

        assert_eq!(reading.elapsed_ms, 1_250);
        assert!(reading.should_persist);
        assert!(watch.is_running());
        assert_eq!(watch.current_elapsed_ms(at), 0);
        assert_eq!(watch.laps.len(), 1);
        assert_eq!(watch.last_recorded.as_deref(), Some("00:00:01.25"));
    }

    #[test]
    fn paused_elapsed_does_not_advance() {
        let t0 = Instant::now();
        let mut watch = Stopwatch::started(t0);
        let reading = watch.pause(t0 + Duration::from_millis(90), Utc::now(), DisplayPrecision::Seconds);

        assert!(!reading.should_persist);
        assert_eq!(watch.current_elapsed_ms(t0 + Duration::from_secs(60)), 90);
    }
}
