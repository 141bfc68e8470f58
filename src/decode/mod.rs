pub mod framegate;
pub mod qr;

pub use framegate::FrameGate;
pub use qr::QrFrameDecoder;

use crate::capture::source::Frame;

/// Decodes a single frame into a payload string, or reports no match.
/// Pure with respect to the frame: the buffer is only borrowed.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, frame: &Frame) -> Option<String>;
}
