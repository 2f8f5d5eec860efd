//! Session lifecycle state.

use serde::Serialize;

/// Lifecycle of a capture session.
///
/// `Idle -> Starting` on start, `Starting -> Running` on the first frame,
/// `Running -> Stopping` on stop and `Stopping -> Idle` once the stream has
/// ended. Reconfiguration never changes the state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

impl SessionState {
    /// Whether a capture stream is open.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_states() {
        assert!(!SessionState::Idle.is_active());
        assert!(SessionState::Starting.is_active());
        assert!(SessionState::Running.is_active());
        assert!(!SessionState::Stopping.is_active());
    }
}
