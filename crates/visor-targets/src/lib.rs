pub mod bounds;
mod catalog;
mod xcap_source;

pub use catalog::{filter_windows, Catalog, CatalogError, ContentSource, ShareableContent};
pub use xcap_source::XcapSource;

use bounds::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A capturable display as reported by the platform at refresh time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisplayTarget {
    pub id: DisplayId,
    pub name: String,
    pub origin: LogicalPosition,
    /// Size in logical points.
    pub size: LogicalSize,
    pub scale_factor: f64,
}

impl DisplayTarget {
    pub fn id(&self) -> &DisplayId {
        &self.id
    }

    pub fn width(&self) -> u32 {
        self.size.width().round() as u32
    }

    pub fn height(&self) -> u32 {
        self.size.height().round() as u32
    }

    pub fn display_name(&self) -> String {
        format!("Display: {} x {}", self.width(), self.height())
    }
}

/// An application that owns at least one on-screen window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub name: String,
}

/// A capturable window as reported by the platform at refresh time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowTarget {
    pub id: WindowId,
    pub title: Option<String>,
    pub owning_application: Option<Application>,
    /// Content rectangle size in logical points.
    pub size: LogicalSize,
}

impl WindowTarget {
    pub fn id(&self) -> &WindowId {
        &self.id
    }

    pub fn application_name(&self) -> Option<&str> {
        self.owning_application.as_ref().map(|app| app.name.as_str())
    }

    pub fn display_name(&self) -> String {
        match (&self.owning_application, &self.title) {
            (Some(app), Some(title)) => format!("{}: {}", app.name, title),
            (Some(app), None) => format!("{}: {}", app.name, self.id),
            (None, Some(title)) => title.clone(),
            (None, None) => String::new(),
        }
    }
}

/// The source a capture session reads from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CaptureTarget {
    Display(DisplayTarget),
    Window(WindowTarget),
}

impl CaptureTarget {
    pub fn id(&self) -> TargetId {
        match self {
            CaptureTarget::Display(display) => TargetId::Display(display.id.clone()),
            CaptureTarget::Window(window) => TargetId::Window(window.id.clone()),
        }
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            CaptureTarget::Display(_) => TargetKind::Display,
            CaptureTarget::Window(_) => TargetKind::Window,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            CaptureTarget::Display(display) => display.display_name(),
            CaptureTarget::Window(window) => window.display_name(),
        }
    }

    /// Whether two snapshots refer to the same platform object.
    pub fn same_target(&self, other: &CaptureTarget) -> bool {
        self.id() == other.id()
    }
}

/// Which kind of target a session captures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetKind {
    #[default]
    Display,
    Window,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetId {
    Display(DisplayId),
    Window(WindowId),
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Hash, Debug)]
pub struct DisplayId(u64);

impl DisplayId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DisplayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DisplayId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| "Invalid display ID".to_string())
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Hash, Debug)]
pub struct WindowId(u64);

impl WindowId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WindowId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| "Invalid window ID".to_string())
    }
}

/// Stable identifier of a running application (its process id).
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ApplicationId(u32);

impl ApplicationId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The application id of the running process.
    pub fn current() -> Self {
        Self(std::process::id())
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}
