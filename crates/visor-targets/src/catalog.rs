//! Enumeration of capturable displays and windows.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Application, ApplicationId, CaptureTarget, DisplayTarget, TargetId, WindowTarget};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Screen capture permission denied")]
    PermissionDenied,

    #[error("Failed to enumerate shareable content: {0}")]
    Enumeration(String),
}

/// Everything that can be captured at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShareableContent {
    pub displays: Vec<DisplayTarget>,
    pub windows: Vec<WindowTarget>,
    pub applications: Vec<Application>,
}

impl ShareableContent {
    pub fn is_empty(&self) -> bool {
        self.displays.is_empty() && self.windows.is_empty()
    }

    /// Look up the current snapshot of a target by its platform id.
    pub fn find(&self, id: &TargetId) -> Option<CaptureTarget> {
        match id {
            TargetId::Display(id) => self
                .displays
                .iter()
                .find(|d| &d.id == id)
                .cloned()
                .map(CaptureTarget::Display),
            TargetId::Window(id) => self
                .windows
                .iter()
                .find(|w| &w.id == id)
                .cloned()
                .map(CaptureTarget::Window),
        }
    }
}

/// Platform enumeration of shareable content.
pub trait ContentSource {
    fn shareable_content(&self) -> Result<ShareableContent, CatalogError>;
}

/// Order and filter windows for presentation.
///
/// Windows are sorted by owning application name (missing names sort as
/// empty, so first), then windows without a named owning application and
/// windows owned by `own_application` are removed. The sort is stable, so
/// identical input always produces identical output.
pub fn filter_windows(
    mut windows: Vec<WindowTarget>,
    own_application: ApplicationId,
) -> Vec<WindowTarget> {
    windows.sort_by(|a, b| {
        a.application_name()
            .unwrap_or("")
            .cmp(b.application_name().unwrap_or(""))
    });

    windows
        .into_iter()
        .filter(|w| w.application_name().is_some_and(|name| !name.is_empty()))
        .filter(|w| {
            w.owning_application
                .as_ref()
                .is_some_and(|app| app.id != own_application)
        })
        .collect()
}

/// Refreshable view over a [`ContentSource`].
pub struct Catalog<S> {
    source: S,
    own_application: ApplicationId,
    last_error: Option<CatalogError>,
}

impl<S: ContentSource> Catalog<S> {
    pub fn new(source: S) -> Self {
        Self::with_own_application(source, ApplicationId::current())
    }

    pub fn with_own_application(source: S, own_application: ApplicationId) -> Self {
        Self {
            source,
            own_application,
            last_error: None,
        }
    }

    /// Enumerate content. Failures are logged and yield an empty catalog.
    pub fn refresh(&mut self) -> ShareableContent {
        match self.source.shareable_content() {
            Ok(mut content) => {
                content.windows = filter_windows(content.windows, self.own_application);
                self.last_error = None;
                tracing::debug!(
                    displays = content.displays.len(),
                    windows = content.windows.len(),
                    "[CATALOG] Refreshed shareable content"
                );
                content
            },
            Err(e) => {
                tracing::error!("[CATALOG] {}", e);
                self.last_error = Some(e);
                ShareableContent::default()
            },
        }
    }

    /// Error from the most recent refresh, if it failed.
    pub fn last_error(&self) -> Option<&CatalogError> {
        self.last_error.as_ref()
    }

    pub fn own_application(&self) -> ApplicationId {
        self.own_application
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}
