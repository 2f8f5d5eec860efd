//! Per-redraw rendering: latest frame in, shaded image out.

use std::sync::Arc;

use crate::error::VisorResult;
use crate::rendering::bridge::{FrameSlot, TextureBridge};
use crate::rendering::shader::ShaderPipeline;
use crate::rendering::surface::RenderSurface;
use crate::rendering::GpuContext;
use crate::session::RenderHost;

/// What a call to [`OverlayRenderer::render`] drew.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// A newly published frame was uploaded and shaded.
    NewFrame,
    /// No new frame; the previous texture was shaded again.
    Reused,
    /// Nothing to draw yet.
    Empty,
}

pub struct OverlayRenderer {
    gpu: GpuContext,
    slot: Arc<FrameSlot>,
    bridge: TextureBridge,
    pipeline: ShaderPipeline,
    surface: Option<RenderSurface>,
}

impl OverlayRenderer {
    pub fn new(gpu: GpuContext, surface: Option<RenderSurface>) -> Self {
        let bridge = TextureBridge::new(gpu.device().clone(), gpu.queue().clone());
        let pipeline = ShaderPipeline::new(gpu.device().clone());

        Self {
            gpu,
            slot: Arc::new(FrameSlot::new()),
            bridge,
            pipeline,
            surface,
        }
    }

    /// Renderer without a window; output stays on the GPU.
    pub fn headless() -> VisorResult<Self> {
        Ok(Self::new(GpuContext::headless()?, None))
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn active_shader(&self) -> Option<&str> {
        self.pipeline.active().map(|p| p.label())
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(surface) = self.surface.as_mut() {
            surface.resize(&self.gpu, width, height);
        }
    }

    /// Bind the newest frame, if any, run the active shader and present.
    ///
    /// A frame that cannot be bound is skipped and the previous texture is
    /// rendered instead.
    pub fn render(&mut self) -> VisorResult<RenderOutcome> {
        let mut outcome = RenderOutcome::Reused;

        if let Some(frame) = self.slot.take_latest() {
            match self.bridge.bind(frame) {
                Ok(_) => outcome = RenderOutcome::NewFrame,
                Err(e) => log::warn!("[BRIDGE] Dropping frame: {}", e),
            }
        }

        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("overlay-encoder"),
            });

        let output = match self.bridge.current() {
            Some(input) => Some(self.pipeline.dispatch(&mut encoder, input)?),
            None => {
                outcome = RenderOutcome::Empty;
                None
            },
        };

        match self.surface.as_mut() {
            Some(surface) => surface.present(&self.gpu, encoder, output)?,
            None => {
                self.gpu.queue().submit(Some(encoder.finish()));
            },
        }

        Ok(outcome)
    }
}

impl RenderHost for OverlayRenderer {
    fn compile(&mut self, label: &str, source: &str) -> VisorResult<()> {
        self.pipeline.compile(label, source)
    }

    fn frame_slot(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.slot)
    }

    fn release_frame_resources(&mut self) {
        self.slot.clear();
        self.bridge.release();
        self.pipeline.release_output();
        log::debug!("[GPU] Released frame-sized resources");
    }

    fn live_resource_count(&self) -> usize {
        usize::from(self.bridge.current().is_some())
            + usize::from(self.pipeline.output_size().is_some())
    }
}
