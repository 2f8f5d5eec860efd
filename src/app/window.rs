//! Overlay window setup and placement.
//!
//! The overlay is a borderless, transparent, always-on-top window that
//! ignores mouse input, so it can sit on top of the captured content.

use winit::dpi::{LogicalPosition, LogicalSize};
use winit::window::{Window, WindowAttributes, WindowLevel};

use visor_targets::bounds;
use visor_targets::CaptureTarget;

pub const OVERLAY_TITLE: &str = "Visor";

/// Where the overlay should sit, in logical points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayGeometry {
    pub origin: bounds::LogicalPosition,
    pub size: bounds::LogicalSize,
}

pub fn overlay_attributes() -> WindowAttributes {
    Window::default_attributes()
        .with_title(OVERLAY_TITLE)
        .with_transparent(true)
        .with_decorations(false)
        .with_resizable(false)
        .with_window_level(WindowLevel::AlwaysOnTop)
        .with_inner_size(LogicalSize::new(800.0, 600.0))
}

/// Overlay placement for `target`.
///
/// A display overlay covers the display below the crop band. Window targets
/// carry no screen position, so they return `None` and the overlay stays
/// where it is.
pub fn overlay_geometry(target: &CaptureTarget, crop_offset: u32) -> Option<OverlayGeometry> {
    match target {
        CaptureTarget::Display(display) => {
            let crop = f64::from(crop_offset);
            let height = display.size.height() - crop;
            if height <= 0.0 {
                return None;
            }
            Some(OverlayGeometry {
                origin: bounds::LogicalPosition::new(display.origin.x(), display.origin.y() + crop),
                size: bounds::LogicalSize::new(display.size.width(), height),
            })
        },
        CaptureTarget::Window(_) => None,
    }
}

pub fn apply_geometry(window: &Window, geometry: &OverlayGeometry) {
    log::debug!(
        "[APP] Overlay at ({}, {}) size {}x{}",
        geometry.origin.x(),
        geometry.origin.y(),
        geometry.size.width(),
        geometry.size.height()
    );
    window.set_outer_position(LogicalPosition::new(geometry.origin.x(), geometry.origin.y()));
    let _ = window.request_inner_size(LogicalSize::new(
        geometry.size.width(),
        geometry.size.height(),
    ));
}

/// Let clicks fall through to whatever is below the overlay.
pub fn make_click_through(window: &Window) {
    if let Err(e) = window.set_cursor_hittest(false) {
        log::warn!("[APP] Overlay cannot ignore cursor input: {}", e);
    }
}

/// Hide the overlay from screen capture, including our own.
#[cfg(target_os = "windows")]
pub fn set_capture_exclusion(window: &Window, exclude: bool) {
    use raw_window_handle::{HasWindowHandle, RawWindowHandle};
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::WindowsAndMessaging::{
        SetWindowDisplayAffinity, WDA_EXCLUDEFROMCAPTURE, WDA_NONE,
    };

    let handle = match window.window_handle() {
        Ok(handle) => handle,
        Err(e) => {
            log::warn!("[APP] No window handle for capture exclusion: {}", e);
            return;
        },
    };

    let RawWindowHandle::Win32(win32) = handle.as_raw() else {
        return;
    };

    let affinity = if exclude { WDA_EXCLUDEFROMCAPTURE } else { WDA_NONE };
    let hwnd = HWND(win32.hwnd.get() as *mut std::ffi::c_void);
    unsafe {
        if SetWindowDisplayAffinity(hwnd, affinity).is_ok() {
            log::info!("[APP] Overlay capture exclusion: {}", exclude);
        } else {
            log::warn!("[APP] Failed to set overlay display affinity");
        }
    }
}

/// Hide the overlay from screen capture by setting the NSWindow sharing type.
#[cfg(target_os = "macos")]
pub fn set_capture_exclusion(window: &Window, exclude: bool) {
    use objc::runtime::Object;
    use objc::{msg_send, sel, sel_impl};
    use raw_window_handle::{HasWindowHandle, RawWindowHandle};

    // NSWindowSharingNone / NSWindowSharingReadOnly
    const SHARING_NONE: u64 = 0;
    const SHARING_READ_ONLY: u64 = 1;

    let handle = match window.window_handle() {
        Ok(handle) => handle,
        Err(e) => {
            log::warn!("[APP] No window handle for capture exclusion: {}", e);
            return;
        },
    };

    let RawWindowHandle::AppKit(appkit) = handle.as_raw() else {
        return;
    };

    let sharing = if exclude { SHARING_NONE } else { SHARING_READ_ONLY };
    let ns_view = appkit.ns_view.as_ptr() as *mut Object;
    unsafe {
        let ns_window: *mut Object = msg_send![ns_view, window];
        if ns_window.is_null() {
            log::warn!("[APP] Overlay view has no window yet");
            return;
        }
        let _: () = msg_send![ns_window, setSharingType: sharing];
    }
    log::info!("[APP] Overlay capture exclusion: {}", exclude);
}

/// X11 and Wayland have no per-window opt-out from screen capture, so the
/// capture engine refuses self-exclusion on display targets here.
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub fn set_capture_exclusion(_window: &Window, exclude: bool) {
    if exclude {
        log::warn!("[APP] Overlay cannot be hidden from display capture on this platform");
    }
}
