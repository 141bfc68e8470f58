//! Scan data models shared across the capture, api and db modules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque string read from a scannable code, plus the instant it was obtained.
/// Produced once (by the decoder or a manual entry) and consumed once by the
/// submission handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedPayload {
    pub text: String,
    pub decoded_at: DateTime<Utc>,
}

impl DecodedPayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            decoded_at: Utc::now(),
        }
    }
}

/// Outcome of one submission handshake with the attendance service.
///
/// An application-level rejection (`Rejected`) and a transport-level failure
/// (`TransportFailure`) are distinct outcomes and map to different history
/// entries. None of these are retried automatically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SubmissionResult {
    Accepted { message: String },
    Rejected { reason: String },
    TransportFailure { detail: String },
}

impl SubmissionResult {
    pub fn outcome(&self) -> ScanOutcome {
        match self {
            SubmissionResult::Accepted { .. } => ScanOutcome::Success,
            SubmissionResult::Rejected { .. } => ScanOutcome::Failed,
            SubmissionResult::TransportFailure { .. } => ScanOutcome::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScanOutcome {
    Success,
    Failed,
    Error,
}

impl ScanOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanOutcome::Success => "Success",
            ScanOutcome::Failed => "Failed",
            ScanOutcome::Error => "Error",
        }
    }
}

/// Append-only log entry written after every submission attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanHistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: ScanOutcome,
    pub detail: String,
    pub payload: Option<String>,
}

impl ScanHistoryEntry {
    pub fn record(result: &SubmissionResult, payload: &DecodedPayload) -> Self {
        let detail = match result {
            SubmissionResult::Accepted { message } => message.clone(),
            SubmissionResult::Rejected { reason } => reason.clone(),
            SubmissionResult::TransportFailure { detail } => detail.clone(),
        };

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            outcome: result.outcome(),
            detail,
            payload: Some(payload.text.clone()),
        }
    }
}
