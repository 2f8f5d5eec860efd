//! Frame-to-texture bridge.
//!
//! Capture frames arrive on the pump thread and are parked in a
//! [`FrameSlot`]. The render thread takes the most recent one and binds it
//! to a `Bgra8Unorm` texture the compute shader can read.
//!
//! Frames come from CPU screenshots, so binding is an explicit upload
//! (`Queue::write_texture`), one per bound frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use visor_capture::{Frame, PixelFormat};
use wgpu::{Device, Queue};

use crate::error::{VisorError, VisorResult};

/// Latest-wins handoff between one producer and one consumer.
///
/// Publishing overwrites any frame not yet taken, so neither side ever
/// waits on the other.
#[derive(Default)]
pub struct FrameSlot {
    latest: Mutex<Option<Frame>>,
    published: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: Frame) {
        let replaced = self.latest.lock().replace(frame);
        if let Some(old) = replaced {
            log::trace!("[BRIDGE] Frame {} superseded before render", old.sequence);
        }
        self.published.fetch_add(1, Ordering::Release);
    }

    /// Move the most recent frame out, if one arrived since the last take.
    pub fn take_latest(&self) -> Option<Frame> {
        self.latest.lock().take()
    }

    pub fn has_pending(&self) -> bool {
        self.latest.lock().is_some()
    }

    pub fn clear(&self) {
        self.latest.lock().take();
    }

    /// Frames published over the lifetime of the slot.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }
}

/// A frame resident on the GPU.
pub struct BoundTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    sequence: u64,
}

impl BoundTexture {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Sequence number of the frame last uploaded into this texture.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Check a frame's pixel surface can be uploaded as-is.
pub fn validate_surface(frame: &Frame, max_dimension: u32) -> VisorResult<()> {
    if frame.width == 0 || frame.height == 0 {
        return Err(VisorError::Bridge(format!(
            "frame {} has zero size ({}x{})",
            frame.sequence, frame.width, frame.height
        )));
    }

    if frame.width > max_dimension || frame.height > max_dimension {
        return Err(VisorError::Bridge(format!(
            "frame {} is {}x{}, larger than the device limit {}",
            frame.sequence, frame.width, frame.height, max_dimension
        )));
    }

    if frame.pixel_format != PixelFormat::Bgra8 {
        return Err(VisorError::Bridge(format!(
            "frame {} has unsupported pixel format {:?}",
            frame.sequence, frame.pixel_format
        )));
    }

    let min_row = frame.width * frame.pixel_format.bytes_per_pixel();
    let bytes_per_row = frame.surface.bytes_per_row;
    if bytes_per_row < min_row {
        return Err(VisorError::Bridge(format!(
            "frame {} row pitch {} is shorter than {} bytes",
            frame.sequence, bytes_per_row, min_row
        )));
    }

    // The last row only needs its pixels, not its padding.
    let required = bytes_per_row as usize * (frame.height as usize - 1) + min_row as usize;
    if frame.surface.data.len() < required {
        return Err(VisorError::Bridge(format!(
            "frame {} has {} bytes, needs {}",
            frame.sequence,
            frame.surface.data.len(),
            required
        )));
    }

    Ok(())
}

/// Uploads frames into a reusable input texture.
pub struct TextureBridge {
    device: Arc<Device>,
    queue: Arc<Queue>,
    max_dimension: u32,
    current: Option<BoundTexture>,
}

impl TextureBridge {
    pub fn new(device: Arc<Device>, queue: Arc<Queue>) -> Self {
        let max_dimension = device.limits().max_texture_dimension_2d;
        Self {
            device,
            queue,
            max_dimension,
            current: None,
        }
    }

    /// Bind a frame as the current input texture.
    ///
    /// A frame that fails validation is dropped and the previously bound
    /// texture stays current.
    pub fn bind(&mut self, frame: Frame) -> VisorResult<&BoundTexture> {
        validate_surface(&frame, self.max_dimension)?;

        let needs_new_texture = self
            .current
            .as_ref()
            .map(|t| t.width != frame.width || t.height != frame.height)
            .unwrap_or(true);

        if needs_new_texture {
            log::debug!(
                "[BRIDGE] Creating input texture {}x{}",
                frame.width,
                frame.height
            );
            if let Some(old) = self.current.take() {
                old.texture.destroy();
            }
            self.current = Some(self.create_texture(frame.width, frame.height));
        }

        let bound = self
            .current
            .as_mut()
            .ok_or_else(|| VisorError::Bridge("input texture missing".to_string()))?;

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &bound.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.surface.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.surface.bytes_per_row),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );
        bound.sequence = frame.sequence;

        Ok(bound)
    }

    pub fn current(&self) -> Option<&BoundTexture> {
        self.current.as_ref()
    }

    /// Drop the bound texture.
    pub fn release(&mut self) {
        if let Some(bound) = self.current.take() {
            bound.texture.destroy();
        }
    }

    fn create_texture(&self, width: u32, height: u32) -> BoundTexture {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("capture-input-texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Bgra8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        BoundTexture {
            texture,
            view,
            width,
            height,
            sequence: 0,
        }
    }
}
