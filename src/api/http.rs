use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::AttendanceApi;
use crate::models::SubmissionResult;

/// Shown to the operator when the service cannot be reached or answers with
/// something other than the expected result shape.
const TRANSPORT_FAILURE_DETAIL: &str = "Attendance service unreachable";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkAttendanceRequest<'a> {
    payload: &'a str,
    scanned_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkAttendanceResponse {
    accepted: bool,
    message: String,
}

/// JSON client for the attendance service.
pub struct HttpAttendanceClient {
    client: reqwest::Client,
    mark_url: String,
}

impl HttpAttendanceClient {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            mark_url: format!("{}/api/attendance/scan", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait::async_trait]
impl AttendanceApi for HttpAttendanceClient {
    async fn mark_attendance(
        &self,
        payload: &str,
        scanned_at: DateTime<Utc>,
    ) -> SubmissionResult {
        let request = MarkAttendanceRequest {
            payload,
            scanned_at,
        };

        let response = match self.client.post(&self.mark_url).json(&request).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!("attendance request failed to send: {err}");
                return SubmissionResult::TransportFailure {
                    detail: TRANSPORT_FAILURE_DETAIL.to_string(),
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("attendance service answered {status}");
            return SubmissionResult::TransportFailure {
                detail: TRANSPORT_FAILURE_DETAIL.to_string(),
            };
        }

        match response.json::<MarkAttendanceResponse>().await {
            Ok(body) => {
                debug!("attendance service: accepted={} {}", body.accepted, body.message);
                if body.accepted {
                    SubmissionResult::Accepted {
                        message: body.message,
                    }
                } else {
                    SubmissionResult::Rejected {
                        reason: body.message,
                    }
                }
            }
            Err(err) => {
                warn!("attendance response body was not the expected shape: {err}");
                SubmissionResult::TransportFailure {
                    detail: TRANSPORT_FAILURE_DETAIL.to_string(),
                }
            }
        }
    }
}
