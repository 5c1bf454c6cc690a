use std::sync::Arc;

use winit::window::Window;

use crate::backend::{validate_program, BackendError, CompileError, Framebuffer, RenderBackend, Result};
use crate::shader::{generate_present_shader, Uniforms};

/// Format of the offscreen march target and of captured frames.
const FRAME_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
}

/// Reduced-resolution render target plus the bind group that samples it.
struct FrameTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    present_bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

// ======================================
// === WINDOW STATE ===
// ======================================

pub struct GpuState {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub window: Arc<Window>,
    uniform_buffer: wgpu::Buffer,
    uniform_layout: wgpu::BindGroupLayout,
    uniform_bind_group: wgpu::BindGroup,
    present_layout: wgpu::BindGroupLayout,
    present_pipeline: wgpu::RenderPipeline,
    sampler: wgpu::Sampler,
    active: Option<wgpu::RenderPipeline>,
    uniforms: Option<Uniforms>,
    target: Option<FrameTarget>,
}

impl GpuState {
    pub async fn new(window: Arc<Window>) -> Result<GpuState> {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "wasm32")] {
                let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                    backends: wgpu::Backends::BROWSER_WEBGPU,
                    ..Default::default()
                });
                let limits = wgpu::Limits::downlevel_webgl2_defaults();
            } else {
                let instance = wgpu::Instance::default();
                let limits = wgpu::Limits::default();
            }
        }
        let size = window.inner_size();

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await?;
        log::info!("adapter: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await?;

        let caps = surface.get_capabilities(&adapter);
        let surface_format = *caps.formats.first().ok_or(BackendError::NoSurfaceFormat)?;
        // Shaded values are already display-ready; present through a linear view.
        let view_format = surface_format.remove_srgb_suffix();

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![view_format],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Uniform Buffer"),
            size: std::mem::size_of::<Uniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Uniform Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Uniform Bind Group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let present_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Present Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Present Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let present_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Present Shader"),
            source: wgpu::ShaderSource::Wgsl(generate_present_shader().into()),
        });
        let present_pipeline = create_pipeline(
            &device,
            "Present Pipeline",
            &present_layout,
            &present_module,
            &present_module,
            view_format,
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            window,
            uniform_buffer,
            uniform_layout,
            uniform_bind_group,
            present_layout,
            present_pipeline,
            sampler,
            active: None,
            uniforms: None,
            target: None,
        })
    }

    pub fn resize_surface(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
    }

    pub fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }

    fn ensure_target(&mut self, width: u32, height: u32) {
        if let Some(target) = &self.target {
            if target.width == width && target.height == height {
                return;
            }
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Frame Texture"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FRAME_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let present_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Present Bind Group"),
            layout: &self.present_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(&self.sampler) },
            ],
        });

        self.target = Some(FrameTarget { texture, view, present_bind_group, width, height });
    }

    /// Copies the current frame target into a mappable buffer. The returned
    /// [`Readback`] resolves once the copy has been mapped.
    pub fn begin_readback(&self) -> Option<Readback> {
        let target = self.target.as_ref()?;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row = (target.width * 4).div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Capture Buffer"),
            size: (padded_row * target.height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&Default::default());
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(target.height),
                },
            },
            wgpu::Extent3d { width: target.width, height: target.height, depth_or_array_layers: 1 },
        );
        self.queue.submit([encoder.finish()]);

        Some(Readback {
            device: self.device.clone(),
            buffer,
            width: target.width,
            height: target.height,
            padded_row,
        })
    }
}

/// A submitted frame copy waiting to be mapped.
pub struct Readback {
    device: wgpu::Device,
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_row: u32,
}

impl Readback {
    pub async fn resolve(self) -> Result<Framebuffer> {
        let slice = self.buffer.slice(..);

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsValue;

            let promise = js_sys::Promise::new(&mut |resolve, reject| {
                slice.map_async(wgpu::MapMode::Read, move |result| {
                    let settled = match result {
                        Ok(()) => resolve.call0(&JsValue::NULL),
                        Err(e) => reject.call1(&JsValue::NULL, &JsValue::from_str(&e.to_string())),
                    };
                    if let Err(e) = settled {
                        log::error!("capture promise failed to settle: {e:?}");
                    }
                });
            });
            self.device
                .poll(wgpu::PollType::Poll)
                .map_err(|e| BackendError::Readback(e.to_string()))?;
            wasm_bindgen_futures::JsFuture::from(promise)
                .await
                .map_err(|e| BackendError::Readback(format!("{e:?}")))?;
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            let (tx, rx) = std::sync::mpsc::channel();
            slice.map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
            self.device
                .poll(wgpu::PollType::Wait)
                .map_err(|e| BackendError::Readback(e.to_string()))?;
            rx.recv()
                .map_err(|e| BackendError::Readback(e.to_string()))?
                .map_err(|e| BackendError::Readback(e.to_string()))?;
        }

        let mut frame = Framebuffer::new(self.width, self.height);
        {
            let data = slice.get_mapped_range();
            unpad_rows(&data, self.padded_row, &mut frame);
        }
        self.buffer.unmap();
        Ok(frame)
    }
}

/// Copies tightly packed RGBA rows out of a buffer whose rows are
/// `padded_row` bytes apart.
fn unpad_rows(data: &[u8], padded_row: u32, frame: &mut Framebuffer) {
    let row_bytes = frame.width as usize * 4;
    for (row, chunk) in data.chunks(padded_row as usize).take(frame.height as usize).enumerate() {
        let start = row * frame.width as usize;
        for (x, px) in chunk[..row_bytes].chunks_exact(4).enumerate() {
            frame.pixels[start + x] = [px[0], px[1], px[2], px[3]];
        }
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    vertex: &wgpu::ShaderModule,
    fragment: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

impl RenderBackend for GpuState {
    type Program = GpuProgram;

    fn compile(&mut self, vertex_source: &str, fragment_source: &str) -> Result<GpuProgram, CompileError> {
        // naga reports the failing stage; wgpu would only panic.
        validate_program(vertex_source, fragment_source)?;

        let vertex = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(vertex_source.into()),
        });
        let fragment = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("March Shader"),
            source: wgpu::ShaderSource::Wgsl(fragment_source.into()),
        });
        let pipeline = create_pipeline(
            &self.device,
            "March Pipeline",
            &self.uniform_layout,
            &vertex,
            &fragment,
            FRAME_FORMAT,
        );
        Ok(GpuProgram { pipeline })
    }

    fn set_uniforms(&mut self, program: &GpuProgram, uniforms: &Uniforms) {
        self.uniforms = Some(*uniforms);
        self.active = Some(program.pipeline.clone());
    }

    fn draw(&mut self, width: u32, height: u32) -> Result<()> {
        let pipeline = self.active.clone().ok_or(BackendError::MissingUniforms)?;
        let mut uniforms = self.uniforms.ok_or(BackendError::MissingUniforms)?;
        let (width, height) = (width.max(1), height.max(1));
        uniforms.fit_viewport(width, height);
        self.queue.write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));
        self.ensure_target(width, height);
        let Some(target) = &self.target else {
            return Ok(());
        };

        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor {
            format: Some(self.config.format.remove_srgb_suffix()),
            ..Default::default()
        });

        let mut encoder = self.device.create_command_encoder(&Default::default());
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("March Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Present Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.present_pipeline);
            pass.set_bind_group(0, &target.present_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.queue.submit([encoder.finish()]);
        self.window.pre_present_notify();
        output.present();
        Ok(())
    }

    fn capture(&mut self) -> Result<Option<Framebuffer>> {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "wasm32")] {
                Err(BackendError::Readback(
                    "blocking capture is unavailable on the web; resolve a Readback instead".into(),
                ))
            } else {
                self.begin_readback().map(|readback| pollster::block_on(readback.resolve())).transpose()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_rows_are_unpacked() {
        // 2x2 frame, 8 bytes of pixels per row padded to 12
        let mut data = vec![0u8; 24];
        data[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        data[8..12].copy_from_slice(&[99; 4]);
        data[12..20].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);

        let mut frame = Framebuffer::new(2, 2);
        unpad_rows(&data, 12, &mut frame);
        assert_eq!(frame.pixel(0, 0), Some([1, 2, 3, 4]));
        assert_eq!(frame.pixel(1, 0), Some([5, 6, 7, 8]));
        assert_eq!(frame.pixel(0, 1), Some([9, 10, 11, 12]));
        assert_eq!(frame.pixel(1, 1), Some([13, 14, 15, 16]));
    }
}
