//! attendscan: client-side QR attendance capture.
//!
//! The core is [`capture::CaptureController`], which owns exclusive access to
//! a camera-like frame source, drives a cancellable sampling loop against a
//! [`decode::FrameDecoder`], and resolves every decoded or manually entered
//! payload through one submission handshake with the attendance service.
//! Outcomes surface as one operator notification plus one append-only scan
//! history entry; nothing is retried automatically.

pub mod api;
pub mod capture;
pub mod config;
pub mod db;
pub mod decode;
pub mod models;
pub mod notify;

pub use capture::{CaptureController, CaptureError, CaptureState, CaptureStatus};
pub use models::{DecodedPayload, ScanHistoryEntry, ScanOutcome, SubmissionResult};
