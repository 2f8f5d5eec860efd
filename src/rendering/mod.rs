//! GPU side of the overlay.
//!
//! ## Components
//! - `renderer`: wgpu instance, adapter, device and queue
//! - `bridge`: latest-frame slot and upload into the input texture
//! - `shader`: hot-swappable compute programs and dispatch
//! - `surface`: swapchain configuration and the final blit
//! - `overlay`: one redraw, from slot to screen

pub mod bridge;
pub mod overlay;
pub mod renderer;
pub mod shader;
pub mod surface;

pub use bridge::{validate_surface, BoundTexture, FrameSlot, TextureBridge};
pub use overlay::{OverlayRenderer, RenderOutcome};
pub use renderer::GpuContext;
pub use shader::{dispatch_grid, ShaderPipeline, ShaderProgram, THREADGROUP_SIZE};
pub use surface::RenderSurface;

/// Bundled program used when no shader file is configured.
pub const DEFAULT_SHADER: &str = include_str!("shaders/default.wgsl");

/// Label of the bundled program.
pub const DEFAULT_SHADER_LABEL: &str = "default.wgsl";
