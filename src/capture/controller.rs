//! Capture session life cycle: exclusive device ownership, the cancellable
//! scan task, and the submission handshake.

use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::AttendanceApi;
use crate::db::Database;
use crate::decode::FrameDecoder;
use crate::models::{DecodedPayload, ScanHistoryEntry, SubmissionResult};
use crate::notify::{NoticeKind, Notifier};

use super::loop_worker::{scan_loop, ScanEnd, ScanLoopConfig};
use super::source::{CameraFacing, Frame, VideoDevice};
use super::state::CaptureState;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no usable camera: {0}")]
    DeviceUnavailable(String),

    #[error("a capture session is already active")]
    AlreadyActive,

    #[error("code must not be empty")]
    EmptyCode,

    #[error("no readable code in the image")]
    NoCodeInImage,
}

struct SessionHandle {
    id: String,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns at most one capture session at a time. All submission outcomes are
/// resolved here into one notification plus one history entry; nothing
/// propagates past this boundary, and the state machine always lands back
/// on `Idle`.
#[derive(Clone)]
pub struct CaptureController {
    state: Arc<Mutex<CaptureState>>,
    session: Arc<Mutex<Option<SessionHandle>>>,
    device: Arc<dyn VideoDevice>,
    decoder: Arc<dyn FrameDecoder>,
    api: Arc<dyn AttendanceApi>,
    notifier: Arc<dyn Notifier>,
    db: Database,
    preferred_facing: CameraFacing,
    loop_config: ScanLoopConfig,
}

impl CaptureController {
    pub fn new(
        device: Arc<dyn VideoDevice>,
        decoder: Arc<dyn FrameDecoder>,
        api: Arc<dyn AttendanceApi>,
        notifier: Arc<dyn Notifier>,
        db: Database,
        loop_config: ScanLoopConfig,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(CaptureState::new())),
            session: Arc::new(Mutex::new(None)),
            device,
            decoder,
            api,
            notifier,
            db,
            preferred_facing: CameraFacing::Environment,
            loop_config,
        }
    }

    pub fn with_facing(mut self, facing: CameraFacing) -> Self {
        self.preferred_facing = facing;
        self
    }

    pub async fn state(&self) -> CaptureState {
        self.state.lock().await.clone()
    }

    /// Opens the camera and starts the scan loop. A duplicate start leaves
    /// the running session and its device handle untouched.
    pub async fn start(&self) -> Result<(), CaptureError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            warn!("start requested while a capture session is active; ignoring");
            return Err(CaptureError::AlreadyActive);
        }

        let source = match self.device.open(self.preferred_facing).await {
            Ok(source) => source,
            Err(err) => {
                self.notifier.notify(
                    NoticeKind::Error,
                    "Camera unavailable. Enter the code manually or scan a photo.",
                );
                return Err(CaptureError::DeviceUnavailable(err.to_string()));
            }
        };

        let session_id = Uuid::new_v4().to_string();
        self.state
            .lock()
            .await
            .begin_session(session_id.clone(), Utc::now());

        let cancel_token = CancellationToken::new();
        let task = tokio::spawn({
            let controller = self.clone();
            let decoder = Arc::clone(&self.decoder);
            let config = self.loop_config.clone();
            let token = cancel_token.clone();
            let id = session_id.clone();
            async move {
                let end = scan_loop(id.clone(), source, decoder, config, token).await;
                controller.finish_session(&id, end).await;
            }
        });

        info!("capture session {session_id} scanning");
        *session = Some(SessionHandle {
            id: session_id,
            cancel_token,
            task,
        });
        Ok(())
    }

    /// Cancels the scan loop and waits for the task to finish, so no decode
    /// attempt runs after this returns. Idempotent when nothing is scanning.
    pub async fn stop(&self) {
        let Some(handle) = self.session.lock().await.take() else {
            return;
        };

        handle.cancel_token.cancel();
        if let Err(err) = handle.task.await {
            error!("scan task failed to join: {err}");
        }

        // The task resets shared state on its way out; cover the panic path.
        let mut state = self.state.lock().await;
        if state.session_id.as_deref() == Some(handle.id.as_str()) {
            state.reset();
        }
        info!("capture session {} stopped", handle.id);
    }

    /// Manual fallback for when no camera is available. Empty input is
    /// rejected locally, before any network call.
    pub async fn submit_manual_code(&self, text: &str) -> Result<(), CaptureError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CaptureError::EmptyCode);
        }

        self.submit(DecodedPayload::new(trimmed)).await;
        Ok(())
    }

    /// Runs one decode attempt against a still image. A miss surfaces an
    /// error and writes no history entry; a match follows the normal
    /// submission handshake.
    pub async fn submit_image(&self, image: &image::DynamicImage) -> Result<(), CaptureError> {
        let frame = Frame::from_image(image);
        let decoded = tokio::task::spawn_blocking({
            let decoder = Arc::clone(&self.decoder);
            move || decoder.decode(&frame)
        })
        .await
        .map_err(|err| {
            error!("decode worker join failed: {err}");
            CaptureError::NoCodeInImage
        })?;

        match decoded {
            Some(text) => {
                self.submit(DecodedPayload::new(text)).await;
                Ok(())
            }
            None => {
                self.notifier
                    .notify(NoticeKind::Error, "No readable code found in the image.");
                Err(CaptureError::NoCodeInImage)
            }
        }
    }

    /// Runs on the scan task after the loop exits. By this point the loop has
    /// returned, so the device handle is already released; a decoded payload
    /// is submitted exactly once before the state returns to `Idle`. A device
    /// failure is reported once; cancellation ends quietly since the operator
    /// asked for it.
    async fn finish_session(&self, session_id: &str, end: ScanEnd) {
        match end {
            ScanEnd::Decoded(payload) => {
                self.state.lock().await.mark_decoded();
                self.release_session_slot(session_id).await;
                self.submit(payload).await;
            }
            ScanEnd::Cancelled => {
                self.release_session_slot(session_id).await;
            }
            ScanEnd::DeviceFailed => {
                self.release_session_slot(session_id).await;
                self.notifier.notify(
                    NoticeKind::Error,
                    "Camera stopped working. Restart scanning or enter the code manually.",
                );
            }
        }

        let mut state = self.state.lock().await;
        if state.session_id.as_deref() == Some(session_id) {
            state.reset();
        }
    }

    async fn release_session_slot(&self, session_id: &str) {
        let mut session = self.session.lock().await;
        if session
            .as_ref()
            .map(|handle| handle.id == session_id)
            .unwrap_or(false)
        {
            // Dropping the handle detaches our own join handle; `stop()` has
            // nothing left to cancel.
            *session = None;
        }
    }

    /// The submission handshake: one API exchange, one history entry, one
    /// notification. Failures are values here; nothing is retried and
    /// nothing escapes.
    async fn submit(&self, payload: DecodedPayload) {
        let result = self.api.mark_attendance(&payload.text, payload.decoded_at).await;

        let (kind, message) = match &result {
            SubmissionResult::Accepted { message } => (NoticeKind::Success, message.clone()),
            SubmissionResult::Rejected { reason } => (NoticeKind::Error, reason.clone()),
            SubmissionResult::TransportFailure { detail } => (NoticeKind::Error, detail.clone()),
        };

        let entry = ScanHistoryEntry::record(&result, &payload);
        if let Err(err) = self.db.insert_scan(&entry).await {
            error!("failed to persist scan history entry: {err:?}");
        }

        self.notifier.notify(kind, &message);
    }
}
