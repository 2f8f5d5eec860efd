//! Shareable content enumeration backed by xcap.

use std::collections::HashSet;

use xcap::{Monitor, Window};

use crate::bounds::{LogicalPosition, LogicalSize};
use crate::catalog::{CatalogError, ContentSource, ShareableContent};
use crate::{Application, ApplicationId, DisplayId, DisplayTarget, WindowId, WindowTarget};

#[derive(Clone, Copy, Debug, Default)]
pub struct XcapSource;

impl XcapSource {
    pub fn new() -> Self {
        Self
    }

    fn displays(&self) -> Result<Vec<DisplayTarget>, CatalogError> {
        let monitors = Monitor::all().map_err(map_xcap_error)?;

        Ok(monitors
            .iter()
            .enumerate()
            .map(|(idx, monitor)| {
                let scale = monitor.scale_factor().unwrap_or(1.0) as f64;
                let scale = if scale > 0.0 { scale } else { 1.0 };
                let width = monitor.width().unwrap_or(1920) as f64;
                let height = monitor.height().unwrap_or(1080) as f64;
                let x = monitor.x().unwrap_or(0) as f64;
                let y = monitor.y().unwrap_or(0) as f64;

                // macOS reports points, other platforms report pixels.
                let (size, origin) = if cfg!(target_os = "macos") {
                    (LogicalSize::new(width, height), LogicalPosition::new(x, y))
                } else {
                    (
                        LogicalSize::new(width / scale, height / scale),
                        LogicalPosition::new(x / scale, y / scale),
                    )
                };

                DisplayTarget {
                    id: DisplayId::new(monitor.id().map(u64::from).unwrap_or(idx as u64)),
                    name: monitor
                        .name()
                        .unwrap_or_else(|_| format!("Display {}", idx)),
                    origin,
                    size,
                    scale_factor: scale,
                }
            })
            .collect())
    }

    fn windows(&self) -> Result<Vec<WindowTarget>, CatalogError> {
        let windows = Window::all().map_err(map_xcap_error)?;

        Ok(windows
            .iter()
            .filter(|w| !w.is_minimized().unwrap_or(false))
            .filter_map(|w| {
                let id = w.id().ok()?;
                let title = w.title().ok().filter(|t| !t.is_empty());
                let owning_application = match (w.pid(), w.app_name()) {
                    (Ok(pid), Ok(name)) => Some(Application {
                        id: ApplicationId::new(pid),
                        name,
                    }),
                    _ => None,
                };

                Some(WindowTarget {
                    id: WindowId::new(u64::from(id)),
                    title,
                    owning_application,
                    size: LogicalSize::new(
                        w.width().unwrap_or(0) as f64,
                        w.height().unwrap_or(0) as f64,
                    ),
                })
            })
            .collect())
    }
}

impl ContentSource for XcapSource {
    fn shareable_content(&self) -> Result<ShareableContent, CatalogError> {
        let displays = self.displays()?;
        let windows = self.windows()?;

        let mut seen = HashSet::new();
        let applications = windows
            .iter()
            .filter_map(|w| w.owning_application.clone())
            .filter(|app| seen.insert(app.id))
            .collect();

        Ok(ShareableContent {
            displays,
            windows,
            applications,
        })
    }
}

fn map_xcap_error(e: xcap::XCapError) -> CatalogError {
    let message = e.to_string();
    if message.to_lowercase().contains("permission") {
        CatalogError::PermissionDenied
    } else {
        CatalogError::Enumeration(message)
    }
}
