use std::sync::Arc;

use crate::error::VisorResult;
use crate::rendering::FrameSlot;

/// Callback that wakes the thread owning the session (the event loop).
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// The GPU side a session drives.
pub trait RenderHost {
    /// Compile and activate a shader program. The previous program stays
    /// active on error.
    fn compile(&mut self, label: &str, source: &str) -> VisorResult<()>;

    /// Slot the frame pump publishes into.
    fn frame_slot(&self) -> Arc<FrameSlot>;

    /// Drop every frame-sized resource (input texture, output texture,
    /// pending frame).
    fn release_frame_resources(&mut self);

    /// Frame-sized GPU resources currently allocated.
    fn live_resource_count(&self) -> usize;
}
