//! Frame source seam: the camera-like device the scan loop reads from.

use anyhow::{bail, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// One captured frame as an 8-bit luma buffer at the source's native
/// resolution, row-major.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn from_image(image: &DynamicImage) -> Self {
        let luma = image.to_luma8();
        Self {
            width: luma.width(),
            height: luma.height(),
            pixels: luma.into_raw(),
        }
    }

    pub fn to_luma_image(&self) -> Option<image::GrayImage> {
        image::GrayImage::from_raw(self.width, self.height, self.pixels.clone())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CameraFacing {
    /// Rear camera, preferred for scanning codes held up to the device.
    Environment,
    User,
}

impl Default for CameraFacing {
    fn default() -> Self {
        CameraFacing::Environment
    }
}

/// Exclusive handle on a live video stream. Dropping the source releases the
/// underlying device; no further frames are delivered after that.
#[async_trait::async_trait]
pub trait FrameSource: Send {
    /// Waits for the next frame from the device. An error here is treated as
    /// an unrecoverable device failure and ends the capture session.
    async fn next_frame(&mut self) -> Result<Frame>;

    fn facing(&self) -> CameraFacing {
        CameraFacing::Environment
    }
}

/// Opens exclusive frame sources. Implemented by camera backends; the capture
/// controller only depends on this seam.
#[async_trait::async_trait]
pub trait VideoDevice: Send + Sync {
    async fn open(&self, prefer: CameraFacing) -> Result<Box<dyn FrameSource>>;
}

/// Device stand-in for hosts without a camera backend. `start()` reports
/// `DeviceUnavailable` while manual and still-image entry points keep working.
pub struct UnavailableDevice;

#[async_trait::async_trait]
impl VideoDevice for UnavailableDevice {
    async fn open(&self, _prefer: CameraFacing) -> Result<Box<dyn FrameSource>> {
        bail!("no camera backend configured on this host")
    }
}
