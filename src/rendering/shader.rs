//! Compute shader pipeline with hot-swappable programs.
//!
//! Programs are WGSL with this interface:
//!
//! ```wgsl
//! @group(0) @binding(0) var input_texture: texture_2d<f32>;
//! @group(0) @binding(1) var output_texture: texture_storage_2d<rgba8unorm, write>;
//!
//! @compute @workgroup_size(16, 16)
//! fn main(@builtin(global_invocation_id) id: vec3<u32>) { ... }
//! ```
//!
//! The fixed pipeline layout enforces the bindings. The source is parsed
//! before it reaches the device, which rejects anything but exactly one
//! compute entry point with a 16x16 workgroup.

use std::borrow::Cow;
use std::sync::Arc;

use wgpu::naga;
use wgpu::Device;

use crate::error::{VisorError, VisorResult};
use crate::rendering::bridge::BoundTexture;

/// Workgroup edge length every program is dispatched with.
pub const THREADGROUP_SIZE: u32 = 16;

/// Format of the compute output texture.
pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Workgroup counts covering a `width` x `height` image.
pub fn dispatch_grid(width: u32, height: u32) -> (u32, u32) {
    (
        width.div_ceil(THREADGROUP_SIZE),
        height.div_ceil(THREADGROUP_SIZE),
    )
}

/// Check the entry point of a WGSL program before handing it to the device.
pub fn check_interface(label: &str, source: &str) -> VisorResult<()> {
    let compile_error = |message: String| VisorError::Compile {
        label: label.to_string(),
        message,
    };

    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| compile_error(e.emit_to_string(source)))?;

    let compute: Vec<_> = module
        .entry_points
        .iter()
        .filter(|entry| entry.stage == naga::ShaderStage::Compute)
        .collect();

    let entry = match compute.as_slice() {
        [entry] => entry,
        [] => return Err(compile_error("no compute entry point".to_string())),
        _ => {
            return Err(compile_error(format!(
                "{} compute entry points, expected one",
                compute.len()
            )))
        },
    };

    let expected = [THREADGROUP_SIZE, THREADGROUP_SIZE, 1];
    if entry.workgroup_size != expected {
        return Err(compile_error(format!(
            "entry point '{}' has workgroup size {:?}, expected {:?}",
            entry.name, entry.workgroup_size, expected
        )));
    }

    Ok(())
}

/// A compiled program and where it came from.
pub struct ShaderProgram {
    label: String,
    source: String,
    pipeline: wgpu::ComputePipeline,
}

impl ShaderProgram {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

struct OutputTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

pub struct ShaderPipeline {
    device: Arc<Device>,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    active: Option<ShaderProgram>,
    output: Option<OutputTarget>,
}

impl ShaderPipeline {
    pub fn new(device: Arc<Device>) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("compute-bind-group-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: OUTPUT_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("compute-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Self {
            device,
            bind_group_layout,
            pipeline_layout,
            active: None,
            output: None,
        }
    }

    /// Compile `source` and make it the active program.
    ///
    /// On failure the previously active program stays in place.
    pub fn compile(&mut self, label: &str, source: &str) -> VisorResult<()> {
        if let Err(e) = check_interface(label, source) {
            log::warn!("[SHADER] '{}' rejected: {}", label, e);
            return Err(e);
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
            });

        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&self.pipeline_layout),
                module: &module,
                entry_point: None,
                compilation_options: Default::default(),
                cache: None,
            });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            log::warn!("[SHADER] '{}' rejected: {}", label, error);
            return Err(VisorError::Compile {
                label: label.to_string(),
                message: error.to_string(),
            });
        }

        log::info!("[SHADER] Activated '{}'", label);
        self.active = Some(ShaderProgram {
            label: label.to_string(),
            source: source.to_string(),
            pipeline,
        });

        Ok(())
    }

    pub fn active(&self) -> Option<&ShaderProgram> {
        self.active.as_ref()
    }

    /// Record one compute pass over `input` and return the output view.
    ///
    /// The output texture follows the input size.
    pub fn dispatch(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        input: &BoundTexture,
    ) -> VisorResult<&wgpu::TextureView> {
        let (width, height) = input.size();
        self.ensure_output(width, height);

        let program = self
            .active
            .as_ref()
            .ok_or_else(|| VisorError::Gpu("no shader program is active".to_string()))?;
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| VisorError::Gpu("output texture missing".to_string()))?;

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("compute-bind-group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(input.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&output.view),
                },
            ],
        });

        let (groups_x, groups_y) = dispatch_grid(width, height);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("visor-compute-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }

        Ok(&output.view)
    }

    pub fn output_view(&self) -> Option<&wgpu::TextureView> {
        self.output.as_ref().map(|o| &o.view)
    }

    pub fn output_size(&self) -> Option<(u32, u32)> {
        self.output.as_ref().map(|o| (o.width, o.height))
    }

    /// Drop the frame-sized output texture. The active program is kept.
    pub fn release_output(&mut self) {
        if let Some(output) = self.output.take() {
            output.texture.destroy();
        }
    }

    fn ensure_output(&mut self, width: u32, height: u32) {
        let matches = self
            .output
            .as_ref()
            .is_some_and(|o| o.width == width && o.height == height);
        if matches {
            return;
        }

        log::debug!("[SHADER] Resizing output to {}x{}", width, height);
        self.release_output();

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("compute-output-texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OUTPUT_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        self.output = Some(OutputTarget {
            texture,
            view,
            width,
            height,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::bridge::TextureBridge;
    use crate::rendering::GpuContext;
    use visor_capture::Frame;

    const INVERT: &str = r#"
@group(0) @binding(0) var input_texture: texture_2d<f32>;
@group(0) @binding(1) var output_texture: texture_storage_2d<rgba8unorm, write>;

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let size = textureDimensions(input_texture);
    if (id.x >= size.x || id.y >= size.y) {
        return;
    }
    let color = textureLoad(input_texture, vec2<i32>(id.xy), 0);
    textureStore(output_texture, vec2<i32>(id.xy), vec4<f32>(1.0 - color.rgb, color.a));
}
"#;

    #[test]
    fn test_dispatch_grid() {
        assert_eq!(dispatch_grid(1000, 700), (63, 44));
        assert_eq!(dispatch_grid(16, 16), (1, 1));
        assert_eq!(dispatch_grid(17, 1), (2, 1));
    }

    #[test]
    fn test_interface_accepts_bundled_programs() {
        check_interface("invert", INVERT).unwrap();
        check_interface("default.wgsl", crate::rendering::DEFAULT_SHADER).unwrap();
    }

    #[test]
    fn test_interface_rejects_other_workgroup_size() {
        let small = INVERT.replace("@workgroup_size(16, 16)", "@workgroup_size(8, 8)");
        let err = check_interface("small", &small).unwrap_err();
        assert!(matches!(err, VisorError::Compile { ref label, .. } if label == "small"));
        assert!(err.to_string().contains("[8, 8, 1]"));
    }

    #[test]
    fn test_interface_rejects_deep_workgroup() {
        let deep = INVERT.replace("@workgroup_size(16, 16)", "@workgroup_size(16, 16, 2)");
        assert!(check_interface("deep", &deep).is_err());
    }

    #[test]
    fn test_interface_needs_one_compute_entry_point() {
        let none = "fn helper() -> f32 { return 1.0; }";
        let err = check_interface("none", none).unwrap_err();
        assert!(err.to_string().contains("no compute entry point"));

        let two = format!(
            "{}\n@compute @workgroup_size(16, 16)\nfn other(@builtin(global_invocation_id) id: vec3<u32>) {{}}\n",
            INVERT
        );
        let err = check_interface("two", &two).unwrap_err();
        assert!(err.to_string().contains("2 compute entry points"));
    }

    #[test]
    fn test_interface_reports_parse_errors() {
        let err = check_interface("broken", "fn main( {").unwrap_err();
        assert!(matches!(err, VisorError::Compile { ref label, .. } if label == "broken"));
    }

    #[test]
    fn test_wrong_workgroup_size_keeps_active_program() {
        let Ok(gpu) = GpuContext::headless() else {
            return;
        };
        let mut pipeline = ShaderPipeline::new(gpu.device().clone());
        pipeline.compile("p1", INVERT).unwrap();

        let small = INVERT.replace("@workgroup_size(16, 16)", "@workgroup_size(8, 8)");
        assert!(pipeline.compile("p2", &small).is_err());
        assert_eq!(pipeline.active().map(|p| p.label()), Some("p1"));
    }

    #[test]
    fn test_bundled_shader_compiles() {
        let Ok(gpu) = GpuContext::headless() else {
            return;
        };
        let mut pipeline = ShaderPipeline::new(gpu.device().clone());
        pipeline
            .compile("default.wgsl", crate::rendering::DEFAULT_SHADER)
            .unwrap();
        assert_eq!(pipeline.active().map(|p| p.label()), Some("default.wgsl"));
    }

    #[test]
    fn test_failed_compile_keeps_active_program() {
        let Ok(gpu) = GpuContext::headless() else {
            return;
        };
        let mut pipeline = ShaderPipeline::new(gpu.device().clone());
        pipeline.compile("p1", INVERT).unwrap();

        let result = pipeline.compile("p2", "fn main( {");
        assert!(matches!(result, Err(VisorError::Compile { ref label, .. }) if label == "p2"));
        assert_eq!(pipeline.active().map(|p| p.label()), Some("p1"));
    }

    #[test]
    fn test_wrong_binding_type_is_rejected() {
        let Ok(gpu) = GpuContext::headless() else {
            return;
        };
        let mut pipeline = ShaderPipeline::new(gpu.device().clone());
        let bad = INVERT.replace("texture_2d<f32>", "texture_2d<u32>");
        assert!(pipeline.compile("bad-binding", &bad).is_err());
        assert!(pipeline.active().is_none());
    }

    #[test]
    fn test_output_follows_input_size() {
        let Ok(gpu) = GpuContext::headless() else {
            return;
        };
        let mut pipeline = ShaderPipeline::new(gpu.device().clone());
        pipeline.compile("invert", INVERT).unwrap();
        let mut bridge = TextureBridge::new(gpu.device().clone(), gpu.queue().clone());

        for (w, h) in [(32, 24), (40, 24)] {
            let frame = Frame::from_bgra(1, w, h, vec![0u8; (w * h * 4) as usize]);
            let input = bridge.bind(frame).unwrap();
            let mut encoder = gpu
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
            pipeline.dispatch(&mut encoder, input).unwrap();
            gpu.queue().submit(Some(encoder.finish()));
            assert_eq!(pipeline.output_size(), Some((w, h)));
        }

        pipeline.release_output();
        assert!(pipeline.output_size().is_none());
        assert_eq!(pipeline.active().map(|p| p.label()), Some("invert"));
    }
}
