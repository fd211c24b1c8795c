use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::{format_elapsed, DisplayPrecision};

/// A captured elapsed-time measurement. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub elapsed_ms: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub formatted_time: String,
    /// `false` for display-only data (pause), `true` for data that must be
    /// handed to the store exactly once (lap, sequence advance).
    pub should_persist: bool,
}

impl Reading {
    pub(crate) fn capture(
        elapsed_ms: u64,
        ended_at: DateTime<Utc>,
        precision: DisplayPrecision,
        should_persist: bool,
    ) -> Self {
        let span = Duration::milliseconds(i64::try_from(elapsed_ms).unwrap_or(i64::MAX));
        let started_at = ended_at.checked_sub_signed(span).unwrap_or(ended_at);

        Self {
            elapsed_ms,
            started_at,
            ended_at,
            formatted_time: format_elapsed(elapsed_ms, precision),
            should_persist,
        }
    }

    /// Same measurement, marked as a completed step result.
    ///
    /// Used where a pause ends a measured step (sequence advance).
    pub fn into_persisted(self) -> Self {
        Self {
            should_persist: true,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ActivityKind {
    ValueAdded,
    NonValueAdded,
    Waiting,
    Other,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::ValueAdded => "ValueAdded",
            ActivityKind::NonValueAdded => "NonValueAdded",
            ActivityKind::Waiting => "Waiting",
            ActivityKind::Other => "Other",
        }
    }
}

impl Default for ActivityKind {
    fn default() -> Self {
        ActivityKind::ValueAdded
    }
}

/// Context the observer fills in alongside a reading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadingForm {
    pub activity: ActivityKind,
    pub person_count: u32,
    pub production_quantity: u32,
    /// Efficiency rating in percent; 100 is normal pace.
    pub rating: u32,
    pub remarks: Option<String>,
}

impl Default for ReadingForm {
    fn default() -> Self {
        Self {
            activity: ActivityKind::default(),
            person_count: 1,
            production_quantity: 1,
            rating: 100,
            remarks: None,
        }
    }
}

/// A reading as it comes back out of the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReading {
    pub id: String,
    pub process_id: String,
    pub subprocess_id: String,
    pub reading: Reading,
    pub form: ReadingForm,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_back_dates_start() {
        let ended_at = Utc::now();
        let reading = Reading::capture(1_500, ended_at, DisplayPrecision::Centiseconds, false);

        assert_eq!(reading.ended_at - reading.started_at, Duration::milliseconds(1_500));
        assert_eq!(reading.formatted_time, "00:00:01.50");
        assert!(!reading.should_persist);
    }

    #[test]
    fn into_persisted_only_flips_the_flag() {
        let reading = Reading::capture(42, Utc::now(), DisplayPrecision::Seconds, false);
        let persisted = reading.clone().into_persisted();

        assert!(persisted.should_persist);
        assert_eq!(persisted.elapsed_ms, reading.elapsed_ms);
        assert_eq!(persisted.started_at, reading.started_at);
    }
}
