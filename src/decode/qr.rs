use log::debug;

use super::FrameDecoder;
use crate::capture::source::Frame;

/// QR decoder backed by rqrr. A frame with no readable grid is a miss, not
/// an error; a grid that fails to decode (damaged or partial code) is also
/// treated as a miss so the sampling loop simply tries the next frame.
pub struct QrFrameDecoder;

impl FrameDecoder for QrFrameDecoder {
    fn decode(&self, frame: &Frame) -> Option<String> {
        let Some(luma) = frame.to_luma_image() else {
            debug!(
                "frame buffer does not match {}x{} dimensions, skipping",
                frame.width, frame.height
            );
            return None;
        };

        let mut prepared = rqrr::PreparedImage::prepare(luma);
        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_, text)) => return Some(text),
                Err(err) => debug!("grid detected but failed to decode: {err}"),
            }
        }

        None
    }
}
