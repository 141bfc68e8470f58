pub mod http;

pub use http::HttpAttendanceClient;

use chrono::{DateTime, Utc};

use crate::models::SubmissionResult;

/// The attendance service, reachable over a request/response transport.
/// Every outcome is a value: transport problems come back as
/// `SubmissionResult::TransportFailure`, never as an error the caller has
/// to unwind.
#[async_trait::async_trait]
pub trait AttendanceApi: Send + Sync {
    async fn mark_attendance(
        &self,
        payload: &str,
        scanned_at: DateTime<Utc>,
    ) -> SubmissionResult;
}
