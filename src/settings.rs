use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::utils::DisplayPrecision;

const MIN_REFRESH_MS: u64 = 10;
const MAX_REFRESH_MS: u64 = 1_000;
const REFRESH_ENV: &str = "TIMESTUDY_REFRESH_MS";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerSettings {
    /// How often a running timer republishes its live display.
    pub refresh_interval_ms: u64,
    pub precision: DisplayPrecision,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 50,
            precision: DisplayPrecision::Seconds,
        }
    }
}

impl TimerSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(
            self.refresh_interval_ms
                .clamp(MIN_REFRESH_MS, MAX_REFRESH_MS),
        )
    }

    fn with_env_override(mut self) -> Self {
        if let Ok(raw) = std::env::var(REFRESH_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.refresh_interval_ms = ms,
                Err(_) => warn!("Ignoring {REFRESH_ENV}={raw:?}: not a number of milliseconds"),
            }
        }
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    timer: TimerSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "Settings at {} are unreadable ({err}); using defaults",
                    path.display()
                );
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Stored timer settings with the environment override applied.
    pub fn timer(&self) -> TimerSettings {
        let guard = match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.timer.with_env_override()
    }

    pub fn update_timer(&self, settings: TimerSettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.timer = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();

        assert_eq!(store.data.read().unwrap().timer, TimerSettings::default());
    }

    #[test]
    fn update_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let settings = TimerSettings {
            refresh_interval_ms: 100,
            precision: DisplayPrecision::Centiseconds,
        };
        store.update_timer(settings).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.data.read().unwrap().timer, settings);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.data.read().unwrap().timer, TimerSettings::default());
    }

    #[test]
    fn refresh_interval_is_clamped() {
        let fast = TimerSettings {
            refresh_interval_ms: 1,
            ..TimerSettings::default()
        };
        let slow = TimerSettings {
            refresh_interval_ms: 60_000,
            ..TimerSettings::default()
        };

        assert_eq!(fast.refresh_interval(), Duration::from_millis(10));
        assert_eq!(slow.refresh_interval(), Duration::from_millis(1_000));
    }
}
