//! Capture session management.
//!
//! ## Architecture
//!
//! - `SessionController`: lifecycle, selection and configuration (control thread)
//! - `FramePump`: one thread per session moving frames into the render slot
//! - `RenderHost`: the GPU side, implemented by `OverlayRenderer`
//!
//! The pump never touches session state. It reports what it sees over a
//! channel, and the controller applies those events in `poll_events`.

mod controller;
mod host;
mod pump;
mod state;

#[cfg(test)]
mod tests;

pub use controller::SessionController;
pub use host::{RenderHost, Waker};
pub use pump::{SessionEvent, SessionEventKind};
pub use state::SessionState;
