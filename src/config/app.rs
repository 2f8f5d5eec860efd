//! Overlay configuration loaded from `config.json`.
//!
//! Every field maps onto a session mutator, so a changed file can be
//! applied to a live session field by field (see [`VisorConfig::diff`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use visor_targets::TargetKind;

use crate::error::VisorResult;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "VISOR_CONFIG";

const MIN_REFRESH_INTERVAL_MS: u64 = 500;

/// User-facing overlay preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisorConfig {
    /// Capture a whole display or a single window.
    pub capture_type: TargetKind,

    /// Explicit display selection. None = first available.
    pub display_id: Option<u64>,

    /// Explicit window selection. None = first available.
    pub window_id: Option<u64>,

    /// Points removed from the top of display captures.
    pub crop_offset: u32,

    /// Keep Visor's own windows out of the capture.
    pub exclude_self: bool,

    /// Capture rate cap (1-120).
    pub frame_rate: u32,

    /// Frames buffered between capture and render (1-8).
    pub queue_depth: usize,

    /// WGSL compute shader to apply. None = bundled default.
    pub shader_path: Option<PathBuf>,

    /// Catalog refresh period in milliseconds (at least 500).
    pub refresh_interval_ms: u64,
}

impl Default for VisorConfig {
    fn default() -> Self {
        Self {
            capture_type: TargetKind::Display,
            display_id: None,
            window_id: None,
            crop_offset: 40,
            exclude_self: true,
            frame_rate: 60,
            queue_depth: 5,
            shader_path: None,
            refresh_interval_ms: 3000,
        }
    }
}

/// One field that differs between two configs.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigChange {
    CaptureType(TargetKind),
    DisplayId(Option<u64>),
    WindowId(Option<u64>),
    CropOffset(u32),
    ExcludeSelf(bool),
    Pacing { frame_rate: u32, queue_depth: usize },
    ShaderPath(Option<PathBuf>),
    RefreshInterval(Duration),
}

impl VisorConfig {
    /// Validate and clamp settings to acceptable ranges.
    pub fn validate(&mut self) {
        self.frame_rate = self.frame_rate.clamp(1, 120);
        self.queue_depth = self.queue_depth.clamp(1, 8);
        self.refresh_interval_ms = self.refresh_interval_ms.max(MIN_REFRESH_INTERVAL_MS);
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// `$VISOR_CONFIG`, else `<config dir>/visor/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("visor").join("config.json"))
    }

    /// Load and validate a config file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> VisorResult<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "[CONFIG] {} not found, using defaults",
                    path.display()
                );
                return Ok(Self::default());
            },
            Err(e) => return Err(e.into()),
        };

        let mut config: Self = serde_json::from_str(&text)?;
        config.validate();

        // Relative shader paths resolve against the config file.
        if let (Some(shader), Some(dir)) = (config.shader_path.as_mut(), path.parent()) {
            if shader.is_relative() {
                *shader = dir.join(&*shader);
            }
        }

        Ok(config)
    }

    /// Field-by-field changes needed to go from `self` to `newer`.
    pub fn diff(&self, newer: &VisorConfig) -> Vec<ConfigChange> {
        let mut changes = Vec::new();

        if self.capture_type != newer.capture_type {
            changes.push(ConfigChange::CaptureType(newer.capture_type));
        }
        if self.display_id != newer.display_id {
            changes.push(ConfigChange::DisplayId(newer.display_id));
        }
        if self.window_id != newer.window_id {
            changes.push(ConfigChange::WindowId(newer.window_id));
        }
        if self.crop_offset != newer.crop_offset {
            changes.push(ConfigChange::CropOffset(newer.crop_offset));
        }
        if self.exclude_self != newer.exclude_self {
            changes.push(ConfigChange::ExcludeSelf(newer.exclude_self));
        }
        if self.frame_rate != newer.frame_rate || self.queue_depth != newer.queue_depth {
            changes.push(ConfigChange::Pacing {
                frame_rate: newer.frame_rate,
                queue_depth: newer.queue_depth,
            });
        }
        if self.shader_path != newer.shader_path {
            changes.push(ConfigChange::ShaderPath(newer.shader_path.clone()));
        }
        if self.refresh_interval_ms != newer.refresh_interval_ms {
            changes.push(ConfigChange::RefreshInterval(newer.refresh_interval()));
        }

        changes
    }
}
