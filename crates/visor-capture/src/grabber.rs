use image::RgbaImage;
use visor_targets::{CaptureTarget, DisplayId, WindowId};
use xcap::{Monitor, Window};

use crate::CaptureError;

/// Produces one raw RGBA image of a target per call.
///
/// Implementations are moved onto the capture thread, one clone per stream.
pub trait FrameGrabber: Clone + Send + 'static {
    /// Grab the target as it is now. `Ok(None)` means the target currently
    /// has nothing to show (gone or minimized); the stream keeps running.
    fn grab(&mut self, target: &CaptureTarget) -> Result<Option<RgbaImage>, CaptureError>;

    /// Whether display captures leave out windows that opted out of screen
    /// capture. Self-exclusion on display targets depends on it.
    fn honors_capture_opt_out(&self) -> bool;
}

/// Screenshot-based grabber built on xcap.
#[derive(Debug, Clone, Copy, Default)]
pub struct XcapGrabber;

impl XcapGrabber {
    pub fn new() -> Self {
        Self
    }

    fn grab_display(&self, id: &DisplayId) -> Result<Option<RgbaImage>, CaptureError> {
        let monitors = Monitor::all().map_err(map_xcap_error)?;

        let Some(monitor) = monitors
            .into_iter()
            .enumerate()
            .find(|(idx, m)| {
                m.id()
                    .map(u64::from)
                    .unwrap_or(*idx as u64)
                    == id.raw()
            })
            .map(|(_, m)| m)
        else {
            tracing::trace!("[CAPTURE] Display {} is not connected", id);
            return Ok(None);
        };

        monitor.capture_image().map(Some).map_err(map_xcap_error)
    }

    fn grab_window(&self, id: &WindowId) -> Result<Option<RgbaImage>, CaptureError> {
        let windows = Window::all().map_err(map_xcap_error)?;

        let Some(window) = windows
            .into_iter()
            .find(|w| w.id().map(u64::from).ok() == Some(id.raw()))
        else {
            tracing::trace!("[CAPTURE] Window {} is gone", id);
            return Ok(None);
        };

        if window.is_minimized().unwrap_or(false) {
            return Ok(None);
        }

        window.capture_image().map(Some).map_err(map_xcap_error)
    }
}

impl FrameGrabber for XcapGrabber {
    fn grab(&mut self, target: &CaptureTarget) -> Result<Option<RgbaImage>, CaptureError> {
        match target {
            CaptureTarget::Display(display) => self.grab_display(&display.id),
            CaptureTarget::Window(window) => self.grab_window(&window.id),
        }
    }

    /// GDI and CoreGraphics screenshots skip windows marked with
    /// `WDA_EXCLUDEFROMCAPTURE` or `NSWindowSharingNone`. X11 and Wayland
    /// grabs have no such marker.
    fn honors_capture_opt_out(&self) -> bool {
        cfg!(any(target_os = "windows", target_os = "macos"))
    }
}

fn map_xcap_error(e: xcap::XCapError) -> CaptureError {
    let message = e.to_string();
    if message.to_lowercase().contains("permission") {
        CaptureError::PermissionDenied
    } else {
        CaptureError::Stream(message)
    }
}
