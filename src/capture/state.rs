use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CaptureStatus {
    Idle,
    Scanning,
    Decoded,
}

impl Default for CaptureStatus {
    fn default() -> Self {
        CaptureStatus::Idle
    }
}

/// Snapshot of the capture state machine. `Idle` is both the initial state
/// and the terminal state of every session; decode misses never leave
/// `Scanning` on their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureState {
    pub status: CaptureStatus,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl Default for CaptureState {
    fn default() -> Self {
        Self {
            status: CaptureStatus::Idle,
            session_id: None,
            started_at: None,
        }
    }
}

impl CaptureState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_session(&mut self, session_id: String, started_at: DateTime<Utc>) {
        *self = Self {
            status: CaptureStatus::Scanning,
            session_id: Some(session_id),
            started_at: Some(started_at),
        };
    }

    pub fn mark_decoded(&mut self) {
        if self.status == CaptureStatus::Scanning {
            self.status = CaptureStatus::Decoded;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
