//! wgpu device setup.
//!
//! Owns the instance, adapter, device and queue shared by the bridge, the
//! shader pipeline and the render surface.

use std::sync::Arc;

use wgpu::{Adapter, Device, Instance, Queue, Surface};

use crate::error::{VisorError, VisorResult};

/// GPU device and queue for one overlay.
pub struct GpuContext {
    instance: Instance,
    adapter: Adapter,
    device: Arc<Device>,
    queue: Arc<Queue>,
}

impl GpuContext {
    /// Create a context with no presentation surface (tests, offscreen use).
    pub fn headless() -> VisorResult<Self> {
        let instance = create_instance();
        pollster::block_on(Self::with_instance(instance, None))
    }

    /// Create a surface for `target` and a device able to present to it.
    pub fn for_window<W>(target: W) -> VisorResult<(Self, Surface<'static>)>
    where
        W: Into<wgpu::SurfaceTarget<'static>>,
    {
        let instance = create_instance();
        let surface = instance
            .create_surface(target)
            .map_err(|e| VisorError::Gpu(format!("Failed to create surface: {}", e)))?;

        let context = pollster::block_on(Self::with_instance(instance, Some(&surface)))?;
        Ok((context, surface))
    }

    async fn with_instance(
        instance: Instance,
        compatible_surface: Option<&Surface<'_>>,
    ) -> VisorResult<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| VisorError::Gpu(format!("Failed to find GPU adapter: {}", e)))?;

        log::info!("[GPU] Using adapter: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Visor Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| VisorError::Gpu(format!("Failed to create GPU device: {}", e)))?;

        // Errors outside an explicit scope are logged instead of aborting.
        device.on_uncaptured_error(Box::new(|e| {
            log::error!("[GPU] Uncaptured error: {}", e);
        }));

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// Largest width or height a 2D texture may have on this device.
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

fn create_instance() -> Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}
