//! Events delivered to the overlay event loop from other threads.

/// User events for the winit event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// The frame pump published a frame or has session events queued.
    SessionWake,
}
