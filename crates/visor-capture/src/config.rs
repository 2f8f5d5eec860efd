use std::time::Duration;

use serde::{Deserialize, Serialize};
use visor_targets::{ApplicationId, CaptureTarget, TargetKind};

use crate::CaptureError;

/// Top band excluded from display captures (menu bar height, in points).
pub const DEFAULT_CROP_TOP: u32 = 40;
pub const DEFAULT_FRAME_RATE: u32 = 60;
pub const DEFAULT_QUEUE_DEPTH: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8 bits per channel, blue first, alpha last.
    #[default]
    Bgra8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Bgra8 => 4,
        }
    }
}

/// Immutable description of what to capture and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfiguration {
    pub target_type: TargetKind,
    pub target: Option<CaptureTarget>,
    /// Rows (in points) removed from the top of display captures.
    pub crop_top: u32,
    pub excludes_self: bool,
    pub excluded_applications: Vec<ApplicationId>,
    pub frame_rate: u32,
    pub queue_depth: usize,
    pub pixel_format: PixelFormat,
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            target_type: TargetKind::Display,
            target: None,
            crop_top: DEFAULT_CROP_TOP,
            excludes_self: true,
            excluded_applications: Vec::new(),
            frame_rate: DEFAULT_FRAME_RATE,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            pixel_format: PixelFormat::Bgra8,
        }
    }
}

impl CaptureConfiguration {
    /// Check the configuration can drive a capture stream.
    pub fn validate(&self) -> Result<&CaptureTarget, CaptureError> {
        let target = self.target.as_ref().ok_or_else(|| {
            CaptureError::Configuration(format!("no {:?} target selected", self.target_type))
        })?;

        if target.kind() != self.target_type {
            return Err(CaptureError::Configuration(format!(
                "target type is {:?} but selected target is a {:?}",
                self.target_type,
                target.kind()
            )));
        }

        if let CaptureTarget::Display(display) = target {
            if f64::from(self.crop_top) >= display.size.height() {
                return Err(CaptureError::Configuration(format!(
                    "crop offset {} leaves no rows on a {} point tall display",
                    self.crop_top,
                    display.height()
                )));
            }
        }

        if self.frame_rate == 0 {
            return Err(CaptureError::Configuration(
                "frame rate must be positive".to_string(),
            ));
        }

        if self.queue_depth == 0 {
            return Err(CaptureError::Configuration(
                "queue depth must be positive".to_string(),
            ));
        }

        Ok(target)
    }

    /// Pixel size of display frames: the display scaled to pixels after
    /// removing the crop band.
    ///
    /// `None` for window targets, whose frames take the size of each
    /// grabbed image.
    pub fn effective_size(&self) -> Option<(u32, u32)> {
        match self.target.as_ref()? {
            CaptureTarget::Display(display) => {
                let height = (display.size.height() - f64::from(self.crop_top)).max(0.0);
                let logical = visor_targets::bounds::LogicalSize::new(display.size.width(), height);
                Some(logical.to_physical(display.scale_factor).to_pixels())
            },
            CaptureTarget::Window(_) => None,
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use visor_targets::bounds::{LogicalPosition, LogicalSize};
    use visor_targets::{DisplayId, DisplayTarget, WindowId, WindowTarget};

    fn display(width: f64, height: f64, scale: f64) -> CaptureTarget {
        CaptureTarget::Display(DisplayTarget {
            id: DisplayId::new(1),
            name: "Main".to_string(),
            origin: LogicalPosition::new(0.0, 0.0),
            size: LogicalSize::new(width, height),
            scale_factor: scale,
        })
    }

    fn window(width: f64, height: f64) -> CaptureTarget {
        CaptureTarget::Window(WindowTarget {
            id: WindowId::new(7),
            title: Some("Doc".to_string()),
            owning_application: None,
            size: LogicalSize::new(width, height),
        })
    }

    #[test]
    fn test_defaults() {
        let config = CaptureConfiguration::default();
        assert_eq!(config.crop_top, 40);
        assert_eq!(config.frame_rate, 60);
        assert_eq!(config.queue_depth, 5);
        assert!(config.excludes_self);
        assert_eq!(config.pixel_format, PixelFormat::Bgra8);
    }

    #[test]
    fn test_missing_target_is_invalid() {
        let config = CaptureConfiguration::default();
        assert!(matches!(
            config.validate(),
            Err(CaptureError::Configuration(_))
        ));
    }

    #[test]
    fn test_mismatched_target_is_invalid() {
        let config = CaptureConfiguration {
            target_type: TargetKind::Window,
            target: Some(display(1512.0, 982.0, 2.0)),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CaptureError::Configuration(_))
        ));
    }

    #[test]
    fn test_crop_must_leave_rows() {
        let config = CaptureConfiguration {
            target: Some(display(800.0, 40.0, 1.0)),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CaptureConfiguration {
            target: Some(display(800.0, 41.0, 1.0)),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_effective_size_display_is_cropped_and_scaled() {
        let config = CaptureConfiguration {
            target: Some(display(1512.0, 982.0, 2.0)),
            ..Default::default()
        };
        assert_eq!(config.effective_size(), Some((3024, 1884)));
    }

    #[test]
    fn test_effective_size_window_follows_grabbed_image() {
        let config = CaptureConfiguration {
            target_type: TargetKind::Window,
            target: Some(window(640.0, 480.0)),
            ..Default::default()
        };
        assert_eq!(config.effective_size(), None);
    }

    #[test]
    fn test_frame_interval() {
        let config = CaptureConfiguration {
            frame_rate: 50,
            ..Default::default()
        };
        assert_eq!(config.frame_interval(), Duration::from_millis(20));
    }
}
