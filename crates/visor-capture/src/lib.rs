//! Frame-paced capture of a display or window into BGRA frames.
//!
//! A [`CaptureEngine`] owns one capture thread per started stream. Frames
//! flow through a bounded queue to the returned [`FrameStream`]; when the
//! consumer falls behind, the newest frames are dropped rather than queued.

mod config;
mod engine;
mod frame;
mod grabber;

pub use config::{CaptureConfiguration, PixelFormat};
pub use engine::{CaptureEngine, FrameStream};
pub use frame::{Frame, FrameSurface};
pub use grabber::{FrameGrabber, XcapGrabber};
pub use image::RgbaImage;

pub use visor_targets as targets;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Invalid capture configuration: {0}")]
    Configuration(String),

    #[error("Screen capture permission denied")]
    PermissionDenied,

    #[error("Capture stream failed: {0}")]
    Stream(String),

    #[error("Failed to spawn capture thread: {0}")]
    Spawn(String),
}
