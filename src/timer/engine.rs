use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use serde::Serialize;
use tokio::{
    sync::{broadcast, watch, Mutex},
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::errors::TimerError;
use crate::models::Reading;
use crate::settings::TimerSettings;
use crate::utils::{format_elapsed, DisplayPrecision};

use super::{Stopwatch, TimerKey, TimerStatus};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

const EVENT_CAPACITY: usize = 64;

/// What a display observer sees for one key.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub key: TimerKey,
    pub status: TimerStatus,
    pub elapsed_ms: u64,
    pub display: String,
    pub last_recorded: Option<String>,
    pub lap_count: usize,
}

impl TimerSnapshot {
    fn idle(key: &TimerKey, precision: DisplayPrecision) -> Self {
        Self {
            key: key.clone(),
            status: TimerStatus::Idle,
            elapsed_ms: 0,
            display: format_elapsed(0, precision),
            last_recorded: None,
            lap_count: 0,
        }
    }

    fn of(key: &TimerKey, stopwatch: &Stopwatch, now: Instant, precision: DisplayPrecision) -> Self {
        let elapsed_ms = stopwatch.current_elapsed_ms(now);
        Self {
            key: key.clone(),
            status: stopwatch.status,
            elapsed_ms,
            display: format_elapsed(elapsed_ms, precision),
            last_recorded: stopwatch.last_recorded.clone(),
            lap_count: stopwatch.laps.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TimerEvent {
    Started { key: TimerKey },
    Resumed { key: TimerKey },
    Paused { key: TimerKey, reading: Reading },
    Lapped { key: TimerKey, reading: Reading },
    Reset { key: TimerKey },
    Suspended { paused: usize },
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartKind {
    Fresh,
    Resumed,
}

#[derive(Default)]
struct EngineInner {
    timers: HashMap<TimerKey, Stopwatch>,
    refreshers: HashMap<TimerKey, CancellationToken>,
    displays: HashMap<TimerKey, watch::Sender<TimerSnapshot>>,
    suspended: bool,
}

impl EngineInner {
    /// Push the current snapshot to the key's display, dropping the channel
    /// once nobody watches it.
    fn publish(&mut self, key: &TimerKey, now: Instant, precision: DisplayPrecision) {
        let Some(tx) = self.displays.get(key) else {
            return;
        };
        if tx.receiver_count() == 0 {
            self.displays.remove(key);
            return;
        }
        let snapshot = match self.timers.get(key) {
            Some(stopwatch) => TimerSnapshot::of(key, stopwatch, now, precision),
            None => TimerSnapshot::idle(key, precision),
        };
        tx.send_replace(snapshot);
    }

    fn cancel_refresher(&mut self, key: &TimerKey) {
        if let Some(token) = self.refreshers.remove(key) {
            token.cancel();
        }
    }

    fn pause_entry(&mut self, key: &TimerKey, now: Instant, precision: DisplayPrecision) -> Option<Reading> {
        let stopwatch = self.timers.get_mut(key)?;
        if !stopwatch.is_running() {
            return None;
        }
        let reading = stopwatch.pause(now, Utc::now(), precision);
        self.cancel_refresher(key);
        self.publish(key, now, precision);
        Some(reading)
    }
}

/// Table of independent stopwatches, one per (process, subprocess).
///
/// Every operation runs to completion under one lock. Running timers get a
/// background refresh task that republishes their display; the task is
/// cancelled as soon as the timer leaves `Running`.
#[derive(Clone)]
pub struct TimerEngine {
    inner: Arc<Mutex<EngineInner>>,
    events: broadcast::Sender<TimerEvent>,
    settings: TimerSettings,
}

impl TimerEngine {
    pub fn new(settings: TimerSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(EngineInner::default())),
            events,
            settings,
        }
    }

    pub fn precision(&self) -> DisplayPrecision {
        self.settings.precision
    }

    /// Start a fresh timer, or resume a paused one where it left off.
    pub async fn start(&self, key: &TimerKey) -> Result<StartKind, TimerError> {
        let mut guard = self.inner.lock().await;
        if guard.suspended {
            return Err(TimerError::Suspended);
        }

        let inner = &mut *guard;
        let now = Instant::now();
        let kind = match inner.timers.get_mut(key) {
            Some(stopwatch) if stopwatch.is_running() => return Err(TimerError::AlreadyRunning),
            Some(stopwatch) => {
                stopwatch.resume(now);
                StartKind::Resumed
            }
            None => {
                inner.timers.insert(key.clone(), Stopwatch::started(now));
                StartKind::Fresh
            }
        };

        self.spawn_refresher(inner, key);
        inner.publish(key, now, self.precision());
        drop(guard);

        match kind {
            StartKind::Fresh => {
                log_info!("Timer {key} started");
                self.emit(TimerEvent::Started { key: key.clone() });
            }
            StartKind::Resumed => {
                log_info!("Timer {key} resumed");
                self.emit(TimerEvent::Resumed { key: key.clone() });
            }
        }
        Ok(kind)
    }

    /// Freeze a running timer. The returned reading is display-only.
    pub async fn pause(&self, key: &TimerKey) -> Result<Reading, TimerError> {
        let reading = {
            let mut guard = self.inner.lock().await;
            guard
                .pause_entry(key, Instant::now(), self.precision())
                .ok_or(TimerError::NotRunning)?
        };

        log_info!("Timer {key} paused at {}", reading.formatted_time);
        self.emit(TimerEvent::Paused {
            key: key.clone(),
            reading: reading.clone(),
        });
        Ok(reading)
    }

    /// Record the running time and restart the same timer from zero.
    ///
    /// The refresh task is left alone, so the live display never sees a gap.
    /// The caller owns persisting the returned reading.
    pub async fn lap(&self, key: &TimerKey) -> Result<Reading, TimerError> {
        let reading = {
            let mut guard = self.inner.lock().await;
            let now = Instant::now();
            let stopwatch = guard
                .timers
                .get_mut(key)
                .filter(|stopwatch| stopwatch.is_running())
                .ok_or(TimerError::NotRunning)?;
            let reading = stopwatch.lap(now, Utc::now(), self.precision());
            guard.publish(key, now, self.precision());
            reading
        };

        log_info!("Timer {key} lap recorded: {}", reading.formatted_time);
        self.emit(TimerEvent::Lapped {
            key: key.clone(),
            reading: reading.clone(),
        });
        Ok(reading)
    }

    /// Drop the timer entirely. Returns whether anything was removed.
    pub async fn reset(&self, key: &TimerKey) -> bool {
        let removed = {
            let mut guard = self.inner.lock().await;
            guard.cancel_refresher(key);
            let removed = guard.timers.remove(key).is_some();
            guard.publish(key, Instant::now(), self.precision());
            removed
        };

        if removed {
            log_info!("Timer {key} reset");
            self.emit(TimerEvent::Reset { key: key.clone() });
        }
        removed
    }

    /// Pause every running timer of a process, except `keep` if given.
    pub async fn pause_process(
        &self,
        process_id: &str,
        keep: Option<&TimerKey>,
    ) -> Vec<(TimerKey, Reading)> {
        let paused = {
            let mut guard = self.inner.lock().await;
            let now = Instant::now();
            let keys: Vec<TimerKey> = guard
                .timers
                .iter()
                .filter(|(key, stopwatch)| {
                    key.belongs_to(process_id) && stopwatch.is_running() && Some(*key) != keep
                })
                .map(|(key, _)| key.clone())
                .collect();

            let paused: Vec<(TimerKey, Reading)> = keys
                .into_iter()
                .filter_map(|key| {
                    let reading = guard.pause_entry(&key, now, self.precision())?;
                    Some((key, reading))
                })
                .collect();
            paused
        };

        for (key, reading) in &paused {
            log_info!("Timer {key} paused with its process at {}", reading.formatted_time);
            self.emit(TimerEvent::Paused {
                key: key.clone(),
                reading: reading.clone(),
            });
        }
        paused
    }

    /// Enter setup mode: pause everything and refuse new starts until `release`.
    pub async fn suspend_all(&self) -> Vec<(TimerKey, Reading)> {
        let paused = {
            let mut guard = self.inner.lock().await;
            guard.suspended = true;
            let now = Instant::now();
            let keys: Vec<TimerKey> = guard
                .timers
                .iter()
                .filter(|(_, stopwatch)| stopwatch.is_running())
                .map(|(key, _)| key.clone())
                .collect();

            let paused: Vec<(TimerKey, Reading)> = keys
                .into_iter()
                .filter_map(|key| {
                    let reading = guard.pause_entry(&key, now, self.precision())?;
                    Some((key, reading))
                })
                .collect();

            for token in guard.refreshers.drain().map(|(_, token)| token) {
                token.cancel();
            }
            paused
        };

        log_info!("Setup mode engaged; {} timer(s) paused", paused.len());
        for (key, reading) in &paused {
            self.emit(TimerEvent::Paused {
                key: key.clone(),
                reading: reading.clone(),
            });
        }
        self.emit(TimerEvent::Suspended {
            paused: paused.len(),
        });
        paused
    }

    pub async fn release(&self) {
        let was_suspended = {
            let mut guard = self.inner.lock().await;
            std::mem::replace(&mut guard.suspended, false)
        };
        if was_suspended {
            log_info!("Setup mode released");
            self.emit(TimerEvent::Released);
        }
    }

    pub async fn is_suspended(&self) -> bool {
        self.inner.lock().await.suspended
    }

    pub async fn status(&self, key: &TimerKey) -> TimerStatus {
        self.inner
            .lock()
            .await
            .timers
            .get(key)
            .map(|stopwatch| stopwatch.status)
            .unwrap_or_default()
    }

    pub async fn is_running(&self, key: &TimerKey) -> bool {
        self.status(key).await == TimerStatus::Running
    }

    pub async fn is_paused(&self, key: &TimerKey) -> bool {
        self.status(key).await == TimerStatus::Paused
    }

    pub async fn elapsed_ms(&self, key: &TimerKey) -> u64 {
        self.inner
            .lock()
            .await
            .timers
            .get(key)
            .map(|stopwatch| stopwatch.current_elapsed_ms(Instant::now()))
            .unwrap_or(0)
    }

    pub async fn display(&self, key: &TimerKey) -> String {
        self.snapshot(key).await.display
    }

    pub async fn last_recorded_time(&self, key: &TimerKey) -> Option<String> {
        self.inner
            .lock()
            .await
            .timers
            .get(key)
            .and_then(|stopwatch| stopwatch.last_recorded.clone())
    }

    pub async fn laps(&self, key: &TimerKey) -> Vec<Reading> {
        self.inner
            .lock()
            .await
            .timers
            .get(key)
            .map(|stopwatch| stopwatch.laps.clone())
            .unwrap_or_default()
    }

    pub async fn snapshot(&self, key: &TimerKey) -> TimerSnapshot {
        let guard = self.inner.lock().await;
        match guard.timers.get(key) {
            Some(stopwatch) => TimerSnapshot::of(key, stopwatch, Instant::now(), self.precision()),
            None => TimerSnapshot::idle(key, self.precision()),
        }
    }

    pub async fn running_keys(&self, process_id: &str) -> Vec<TimerKey> {
        let guard = self.inner.lock().await;
        let mut keys: Vec<TimerKey> = guard
            .timers
            .iter()
            .filter(|(key, stopwatch)| key.belongs_to(process_id) && stopwatch.is_running())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Live display for one key. The channel outlives resets and is dropped
    /// on the next update after its last receiver goes away.
    pub async fn watch(&self, key: &TimerKey) -> watch::Receiver<TimerSnapshot> {
        let mut guard = self.inner.lock().await;
        if let Some(tx) = guard.displays.get(key) {
            return tx.subscribe();
        }
        let initial = match guard.timers.get(key) {
            Some(stopwatch) => TimerSnapshot::of(key, stopwatch, Instant::now(), self.precision()),
            None => TimerSnapshot::idle(key, self.precision()),
        };
        let (tx, rx) = watch::channel(initial);
        guard.displays.insert(key.clone(), tx);
        rx
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: TimerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn spawn_refresher(&self, inner: &mut EngineInner, key: &TimerKey) {
        inner.cancel_refresher(key);

        let token = CancellationToken::new();
        tokio::spawn(refresh_loop(
            self.inner.clone(),
            key.clone(),
            self.settings,
            token.clone(),
        ));
        inner.refreshers.insert(key.clone(), token);
    }
}

async fn refresh_loop(
    inner: Arc<Mutex<EngineInner>>,
    key: TimerKey,
    settings: TimerSettings,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(settings.refresh_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut guard = inner.lock().await;
                if cancel.is_cancelled() {
                    break;
                }
                let now = Instant::now();
                let Some(stopwatch) = guard.timers.get(&key) else {
                    break;
                };
                if !stopwatch.is_running() {
                    break;
                }
                log_debug!("Timer {key} tick at {}ms", stopwatch.current_elapsed_ms(now));
                guard.publish(&key, now, settings.precision);
            }
            _ = cancel.cancelled() => break,
        }
    }
}
