use std::sync::Mutex;

use log::{error, info};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NoticeKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
}

/// Short-lived user-facing notices. Fire-and-forget.
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NoticeKind, title: &str, message: &str);
}

/// Writes notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, kind: NoticeKind, title: &str, message: &str) {
        match kind {
            NoticeKind::Error => error!("[notice] {title}: {message}"),
            NoticeKind::Success | NoticeKind::Info => info!("[notice] {title}: {message}"),
        }
    }
}

/// Keeps every notice; handy for callers that render a notice list.
#[derive(Debug, Default)]
pub struct NoticeLog {
    notices: Mutex<Vec<Notice>>,
}

impl NoticeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Notice> {
        let mut guard = match self.notices.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *guard)
    }
}

impl Notifier for NoticeLog {
    fn notify(&self, kind: NoticeKind, title: &str, message: &str) {
        let mut guard = match self.notices.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(Notice {
            kind,
            title: title.to_string(),
            message: message.to_string(),
        });
    }
}
