//! Capture controller behavior against scripted collaborators: fake device,
//! fake decoder, fake attendance service, recording notifier.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use chrono::{DateTime, Utc};

use attendscan::api::AttendanceApi;
use attendscan::capture::{
    CameraFacing, CaptureController, CaptureError, CaptureStatus, Frame, FrameSource,
    ScanLoopConfig, UnavailableDevice, VideoDevice,
};
use attendscan::db::Database;
use attendscan::decode::FrameDecoder;
use attendscan::models::{ScanOutcome, SubmissionResult};
use attendscan::notify::{NoticeKind, Notifier};

const PAYLOAD: &str = "STU-12345|2024-06-01T08:00:00Z";

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

struct FakeSource;

#[async_trait::async_trait]
impl FrameSource for FakeSource {
    async fn next_frame(&mut self) -> Result<Frame> {
        Ok(Frame {
            width: 8,
            height: 8,
            pixels: vec![0; 64],
        })
    }
}

struct FakeDevice {
    opens: AtomicUsize,
}

impl FakeDevice {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            opens: AtomicUsize::new(0),
        })
    }

    fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VideoDevice for FakeDevice {
    async fn open(&self, _prefer: CameraFacing) -> Result<Box<dyn FrameSource>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSource))
    }
}

/// Delivers a fixed number of frames, then errors like a camera whose
/// stream ended mid-session.
struct FlakySource {
    frames_left: u64,
}

#[async_trait::async_trait]
impl FrameSource for FlakySource {
    async fn next_frame(&mut self) -> Result<Frame> {
        if self.frames_left == 0 {
            anyhow::bail!("camera stream ended unexpectedly");
        }
        self.frames_left -= 1;
        Ok(Frame {
            width: 8,
            height: 8,
            pixels: vec![0; 64],
        })
    }
}

struct FlakyDevice {
    frames_before_failure: u64,
}

#[async_trait::async_trait]
impl VideoDevice for FlakyDevice {
    async fn open(&self, _prefer: CameraFacing) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(FlakySource {
            frames_left: self.frames_before_failure,
        }))
    }
}

/// Misses until `hit_after` attempts have happened, then decodes `PAYLOAD`.
/// `hit_after: None` never decodes.
struct ScriptedDecoder {
    hit_after: Option<u64>,
    attempts: AtomicU64,
}

impl ScriptedDecoder {
    fn miss() -> Arc<Self> {
        Arc::new(Self {
            hit_after: None,
            attempts: AtomicU64::new(0),
        })
    }

    fn hit_after(misses: u64) -> Arc<Self> {
        Arc::new(Self {
            hit_after: Some(misses),
            attempts: AtomicU64::new(0),
        })
    }

    fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl FrameDecoder for ScriptedDecoder {
    fn decode(&self, _frame: &Frame) -> Option<String> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        match self.hit_after {
            Some(misses) if attempt > misses => Some(PAYLOAD.to_string()),
            _ => None,
        }
    }
}

struct ScriptedApi {
    result: SubmissionResult,
    calls: Mutex<Vec<String>>,
}

impl ScriptedApi {
    fn returning(result: SubmissionResult) -> Arc<Self> {
        Arc::new(Self {
            result,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn accepted(message: &str) -> Arc<Self> {
        Self::returning(SubmissionResult::Accepted {
            message: message.into(),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AttendanceApi for ScriptedApi {
    async fn mark_attendance(&self, payload: &str, _scanned_at: DateTime<Utc>) -> SubmissionResult {
        self.calls.lock().unwrap().push(payload.to_string());
        self.result.clone()
    }
}

#[derive(Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<(NoticeKind, String)>>,
}

impl RecordingNotifier {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn notices(&self) -> Vec<(NoticeKind, String)> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        self.notices.lock().unwrap().push((kind, message.to_string()));
    }
}

fn test_loop_config() -> ScanLoopConfig {
    // Fast ticks, gating disabled so every scripted frame reaches the decoder.
    ScanLoopConfig {
        sample_interval: Duration::from_millis(5),
        change_threshold: 0,
        recheck_cooldown: Duration::ZERO,
    }
}

fn build_controller(
    device: Arc<dyn VideoDevice>,
    decoder: Arc<ScriptedDecoder>,
    api: Arc<ScriptedApi>,
    notifier: Arc<RecordingNotifier>,
    workspace: &PathBuf,
) -> (CaptureController, Database) {
    let db = Database::new(workspace.join("scan.sqlite3")).expect("database");
    let controller = CaptureController::new(
        device,
        decoder,
        api,
        notifier,
        db.clone(),
        test_loop_config(),
    );
    (controller, db)
}

async fn wait_for_idle(controller: &CaptureController) {
    for _ in 0..400 {
        if controller.state().await.status == CaptureStatus::Idle {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("controller never returned to Idle");
}

#[tokio::test]
async fn decode_misses_keep_the_loop_scanning() {
    let workspace = temp_dir("attendscan-miss");
    let decoder = ScriptedDecoder::miss();
    let api = ScriptedApi::accepted("Marked present");
    let notifier = RecordingNotifier::new();
    let (controller, _db) = build_controller(
        FakeDevice::new(),
        Arc::clone(&decoder),
        Arc::clone(&api),
        Arc::clone(&notifier),
        &workspace,
    );

    controller.start().await.expect("start");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(controller.state().await.status, CaptureStatus::Scanning);
    assert!(decoder.attempts() >= 3, "loop should keep attempting");
    assert!(api.calls().is_empty(), "misses must not submit anything");

    controller.stop().await;
    assert_eq!(controller.state().await.status, CaptureStatus::Idle);

    let _ = std::fs::remove_dir_all(workspace);
}

#[tokio::test]
async fn stop_prevents_any_further_decode_attempts() {
    let workspace = temp_dir("attendscan-stop");
    let decoder = ScriptedDecoder::miss();
    let api = ScriptedApi::accepted("Marked present");
    let (controller, _db) = build_controller(
        FakeDevice::new(),
        Arc::clone(&decoder),
        api,
        RecordingNotifier::new(),
        &workspace,
    );

    controller.start().await.expect("start");
    tokio::time::sleep(Duration::from_millis(50)).await;
    controller.stop().await;

    let attempts_after_stop = decoder.attempts();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(decoder.attempts(), attempts_after_stop);
    assert_eq!(controller.state().await.status, CaptureStatus::Idle);

    // Idempotent when nothing is scanning.
    controller.stop().await;
    assert_eq!(controller.state().await.status, CaptureStatus::Idle);

    let _ = std::fs::remove_dir_all(workspace);
}

#[tokio::test]
async fn successful_decode_submits_exactly_once() {
    let workspace = temp_dir("attendscan-hit");
    let decoder = ScriptedDecoder::hit_after(2);
    let api = ScriptedApi::accepted("Marked present");
    let notifier = RecordingNotifier::new();
    let (controller, db) = build_controller(
        FakeDevice::new(),
        Arc::clone(&decoder),
        Arc::clone(&api),
        Arc::clone(&notifier),
        &workspace,
    );

    controller.start().await.expect("start");
    wait_for_idle(&controller).await;

    assert_eq!(api.calls(), vec![PAYLOAD.to_string()]);
    assert_eq!(
        notifier.notices(),
        vec![(NoticeKind::Success, "Marked present".to_string())]
    );

    let entries = db.recent_scans(10).await.expect("history");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, ScanOutcome::Success);
    assert_eq!(entries[0].detail, "Marked present");
    assert_eq!(entries[0].payload.as_deref(), Some(PAYLOAD));

    // The loop stopped before submitting; the same payload never decodes
    // again even though later frames would have matched.
    let attempts = decoder.attempts();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(decoder.attempts(), attempts);
    assert_eq!(api.calls().len(), 1);

    let _ = std::fs::remove_dir_all(workspace);
}

#[tokio::test]
async fn duplicate_start_leaves_the_running_session_untouched() {
    let workspace = temp_dir("attendscan-dup");
    let device = FakeDevice::new();
    let api = ScriptedApi::accepted("Marked present");
    let (controller, _db) = build_controller(
        Arc::clone(&device) as Arc<dyn VideoDevice>,
        ScriptedDecoder::miss(),
        api,
        RecordingNotifier::new(),
        &workspace,
    );

    controller.start().await.expect("start");
    let before = controller.state().await;
    assert_eq!(before.status, CaptureStatus::Scanning);

    let duplicate = controller.start().await;
    assert!(matches!(duplicate, Err(CaptureError::AlreadyActive)));

    let after = controller.state().await;
    assert_eq!(after.status, CaptureStatus::Scanning);
    assert_eq!(after.session_id, before.session_id);
    assert_eq!(device.open_count(), 1, "no second device acquisition");

    controller.stop().await;
    let _ = std::fs::remove_dir_all(workspace);
}

#[tokio::test]
async fn rejected_submission_surfaces_the_reason() {
    let workspace = temp_dir("attendscan-rejected");
    let api = ScriptedApi::returning(SubmissionResult::Rejected {
        reason: "Already marked".into(),
    });
    let notifier = RecordingNotifier::new();
    let (controller, db) = build_controller(
        FakeDevice::new(),
        ScriptedDecoder::miss(),
        Arc::clone(&api),
        Arc::clone(&notifier),
        &workspace,
    );

    controller.submit_manual_code(PAYLOAD).await.expect("submit");

    assert_eq!(
        notifier.notices(),
        vec![(NoticeKind::Error, "Already marked".to_string())]
    );
    let entries = db.recent_scans(10).await.expect("history");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, ScanOutcome::Failed);
    assert_eq!(entries[0].detail, "Already marked");

    let _ = std::fs::remove_dir_all(workspace);
}

#[tokio::test]
async fn transport_failure_maps_to_error_and_returns_idle() {
    let workspace = temp_dir("attendscan-transport");
    let api = ScriptedApi::returning(SubmissionResult::TransportFailure {
        detail: "Attendance service unreachable".into(),
    });
    let notifier = RecordingNotifier::new();
    let (controller, db) = build_controller(
        FakeDevice::new(),
        ScriptedDecoder::hit_after(0),
        Arc::clone(&api),
        Arc::clone(&notifier),
        &workspace,
    );

    controller.start().await.expect("start");
    wait_for_idle(&controller).await;

    assert_eq!(api.calls().len(), 1);
    let notices = notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].0, NoticeKind::Error);

    let entries = db.recent_scans(10).await.expect("history");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, ScanOutcome::Error);

    let _ = std::fs::remove_dir_all(workspace);
}

#[tokio::test]
async fn empty_manual_code_is_rejected_before_any_network_call() {
    let workspace = temp_dir("attendscan-empty");
    let api = ScriptedApi::accepted("Marked present");
    let notifier = RecordingNotifier::new();
    let (controller, db) = build_controller(
        FakeDevice::new(),
        ScriptedDecoder::miss(),
        Arc::clone(&api),
        Arc::clone(&notifier),
        &workspace,
    );

    let result = controller.submit_manual_code("   ").await;
    assert!(matches!(result, Err(CaptureError::EmptyCode)));
    assert!(api.calls().is_empty());
    assert!(db.recent_scans(10).await.expect("history").is_empty());

    let _ = std::fs::remove_dir_all(workspace);
}

#[tokio::test]
async fn still_image_without_a_code_submits_nothing() {
    let workspace = temp_dir("attendscan-image-miss");
    let api = ScriptedApi::accepted("Marked present");
    let notifier = RecordingNotifier::new();
    let (controller, db) = build_controller(
        FakeDevice::new(),
        ScriptedDecoder::miss(),
        Arc::clone(&api),
        Arc::clone(&notifier),
        &workspace,
    );

    let image = image::DynamicImage::new_luma8(32, 32);
    let result = controller.submit_image(&image).await;
    assert!(matches!(result, Err(CaptureError::NoCodeInImage)));

    let notices = notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].0, NoticeKind::Error);
    assert!(api.calls().is_empty());
    assert!(db.recent_scans(10).await.expect("history").is_empty());

    let _ = std::fs::remove_dir_all(workspace);
}

#[tokio::test]
async fn still_image_with_a_code_follows_the_handshake() {
    let workspace = temp_dir("attendscan-image-hit");
    let api = ScriptedApi::accepted("Marked present");
    let notifier = RecordingNotifier::new();
    let (controller, db) = build_controller(
        FakeDevice::new(),
        ScriptedDecoder::hit_after(0),
        Arc::clone(&api),
        Arc::clone(&notifier),
        &workspace,
    );

    let image = image::DynamicImage::new_luma8(32, 32);
    controller.submit_image(&image).await.expect("submit");

    assert_eq!(api.calls(), vec![PAYLOAD.to_string()]);
    let entries = db.recent_scans(10).await.expect("history");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, ScanOutcome::Success);

    let _ = std::fs::remove_dir_all(workspace);
}

#[tokio::test]
async fn mid_session_device_failure_notifies_and_returns_idle() {
    let workspace = temp_dir("attendscan-devfail");
    let api = ScriptedApi::accepted("Marked present");
    let notifier = RecordingNotifier::new();
    let (controller, db) = build_controller(
        Arc::new(FlakyDevice {
            frames_before_failure: 2,
        }),
        ScriptedDecoder::miss(),
        Arc::clone(&api),
        Arc::clone(&notifier),
        &workspace,
    );

    controller.start().await.expect("start");
    wait_for_idle(&controller).await;

    let notices = notifier.notices();
    assert_eq!(notices.len(), 1, "device failure reported exactly once");
    assert_eq!(notices[0].0, NoticeKind::Error);
    assert!(api.calls().is_empty(), "nothing was decoded, nothing submitted");
    assert!(db.recent_scans(10).await.expect("history").is_empty());

    // No dangling session: stop stays a no-op and a fresh start is allowed.
    controller.stop().await;
    assert_eq!(controller.state().await.status, CaptureStatus::Idle);

    let _ = std::fs::remove_dir_all(workspace);
}

#[tokio::test]
async fn unavailable_device_leaves_manual_entry_usable() {
    let workspace = temp_dir("attendscan-nodevice");
    let api = ScriptedApi::accepted("Marked present");
    let notifier = RecordingNotifier::new();
    let db = Database::new(workspace.join("scan.sqlite3")).expect("database");
    let controller = CaptureController::new(
        Arc::new(UnavailableDevice),
        ScriptedDecoder::miss(),
        Arc::clone(&api) as Arc<dyn AttendanceApi>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        db,
        test_loop_config(),
    );

    let result = controller.start().await;
    assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
    assert_eq!(controller.state().await.status, CaptureStatus::Idle);
    assert_eq!(notifier.notices().len(), 1, "failure reported once");

    controller.submit_manual_code(PAYLOAD).await.expect("manual");
    assert_eq!(api.calls(), vec![PAYLOAD.to_string()]);

    let _ = std::fs::remove_dir_all(workspace);
}
