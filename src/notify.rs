//! Operator notification surface. The capture controller emits exactly one
//! notice per submission outcome; how that notice is shown is up to the
//! `Notifier` implementation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NoticeKind {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub posted_at: DateTime<Utc>,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NoticeKind, message: &str);
}

/// Writes notices to the log. Used by the CLI and anywhere no transient
/// display exists.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        match kind {
            NoticeKind::Success => info!("{message}"),
            NoticeKind::Error => error!("{message}"),
        }
    }
}

/// Holds the current transient notice and clears it after a fixed interval.
/// A generation counter ties each dismissal timer to the notice it was
/// spawned for, so a newer notice is never clobbered by an older timer.
#[derive(Clone)]
pub struct NoticeBoard {
    slot: Arc<Mutex<(u64, Option<Notice>)>>,
    dismiss_after: Duration,
}

impl NoticeBoard {
    pub fn new(dismiss_after: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new((0, None))),
            dismiss_after,
        }
    }

    pub fn current(&self) -> Option<Notice> {
        self.slot.lock().unwrap().1.clone()
    }
}

impl Notifier for NoticeBoard {
    fn notify(&self, kind: NoticeKind, message: &str) {
        let notice = Notice {
            kind,
            message: message.to_string(),
            posted_at: Utc::now(),
        };

        let generation = {
            let mut guard = self.slot.lock().unwrap();
            guard.0 += 1;
            guard.1 = Some(notice);
            guard.0
        };

        let slot = Arc::clone(&self.slot);
        let dismiss_after = self.dismiss_after;
        tokio::spawn(async move {
            tokio::time::sleep(dismiss_after).await;
            let mut guard = slot.lock().unwrap();
            if guard.0 == generation {
                guard.1 = None;
            }
        });
    }
}
