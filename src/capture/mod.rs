pub mod controller;
pub mod loop_worker;
pub mod source;
pub mod state;

pub use controller::{CaptureController, CaptureError};
pub use loop_worker::{ScanEnd, ScanLoopConfig};
pub use source::{CameraFacing, Frame, FrameSource, UnavailableDevice, VideoDevice};
pub use state::{CaptureState, CaptureStatus};
