//! Modification-time polling for the config and shader files.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Reports when a file's modification time moves.
///
/// A file that does not exist yet is tracked too; it counts as changed once
/// it appears.
#[derive(Debug)]
pub struct FileWatcher {
    path: PathBuf,
    modified: Option<SystemTime>,
}

impl FileWatcher {
    /// Start watching `path` from its current state.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let modified = modified_time(&path);
        Self { path, modified }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the file changed or appeared since the previous poll.
    pub fn poll(&mut self) -> bool {
        let current = modified_time(&self.path);
        if current == self.modified {
            return false;
        }

        let appeared_or_changed = current.is_some();
        if !appeared_or_changed {
            log::debug!("[WATCH] {} disappeared", self.path.display());
        }
        self.modified = current;
        appeared_or_changed
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
