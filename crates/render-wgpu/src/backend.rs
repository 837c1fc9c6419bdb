use crate::shaders::{
    self, FIRST_TEXTURE_SLOT, SLOT_TABLE, TEXTURE_SLOTS, VIEW_INVERSE_SLOT, WORLD_SLOT,
    WORLD_VIEW_PROJ_SLOT,
};
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use rasterscene_common::{FilteringMethod, Vertex};
use rasterscene_render::{
    ClearValues, DrawContext, Gpu, PassBindings, Presenter, RenderError, ResourceFactory,
    ShaderProgram, SlotId, SlotKind, TechniqueDesc, TechniqueId, techniques,
};
use std::path::Path;
use wgpu::util::DeviceExt;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Uniforms {
    world: [[f32; 4]; 4],
    world_view_proj: [[f32; 4]; 4],
    view_inverse: [[f32; 4]; 4],
}

impl Default for Uniforms {
    fn default() -> Self {
        let identity = Mat4::IDENTITY.to_cols_array_2d();
        Self {
            world: identity,
            world_view_proj: identity,
            view_inverse: identity,
        }
    }
}

/// A WGSL program: one render pipeline per technique pass.
pub struct WgpuProgram {
    label: String,
    declared: Vec<bool>,
    techniques: Vec<TechniqueDesc>,
    pipelines: Vec<Vec<wgpu::RenderPipeline>>,
}

impl ShaderProgram for WgpuProgram {
    fn slot(&self, name: &str, kind: SlotKind) -> Option<SlotId> {
        SLOT_TABLE
            .iter()
            .position(|b| b.name == name && b.kind == kind)
            .filter(|&i| self.declared.get(i).copied().unwrap_or(false))
            .map(|i| SlotId(i as u32))
    }

    fn techniques(&self) -> &[TechniqueDesc] {
        &self.techniques
    }
}

/// Sampler state for one filtering tier, repeating in every direction.
pub fn sampler_descriptor(filter: FilteringMethod) -> wgpu::SamplerDescriptor<'static> {
    let (filter_mode, mipmap_filter) = match filter {
        FilteringMethod::Point => (wgpu::FilterMode::Nearest, wgpu::FilterMode::Nearest),
        FilteringMethod::Linear | FilteringMethod::Anisotropic => {
            (wgpu::FilterMode::Linear, wgpu::FilterMode::Linear)
        }
    };
    wgpu::SamplerDescriptor {
        label: Some(filter.label()),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: filter_mode,
        min_filter: filter_mode,
        mipmap_filter,
        anisotropy_clamp: filter.max_anisotropy(),
        ..Default::default()
    }
}

/// Fixed-function state of every pass in one technique.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PassState {
    pub blend: wgpu::BlendState,
    pub depth_write: bool,
}

impl PassState {
    /// Opaque techniques replace and write depth; transparent ones blend by
    /// source alpha and only test depth.
    pub(crate) fn for_technique(name: &str) -> Self {
        if techniques::is_transparent(name) {
            Self {
                blend: wgpu::BlendState::ALPHA_BLENDING,
                depth_write: false,
            }
        } else {
            Self {
                blend: wgpu::BlendState::REPLACE,
                depth_write: true,
            }
        }
    }
}

/// `base` followed by box-filtered halvings down to 1×1.
fn mip_chain(base: image::RgbaImage) -> Vec<image::RgbaImage> {
    let mut levels = vec![base];
    while let Some(last) = levels.last() {
        let (width, height) = last.dimensions();
        if width <= 1 && height <= 1 {
            break;
        }
        let next = image::imageops::resize(
            last,
            (width / 2).max(1),
            (height / 2).max(1),
            image::imageops::FilterType::Triangle,
        );
        levels.push(next);
    }
    levels
}

struct Frame {
    surface_texture: wgpu::SurfaceTexture,
    encoder: wgpu::CommandEncoder,
    pass: wgpu::RenderPass<'static>,
}

/// Render backend drawing to a window surface with wgpu.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    depth_view: wgpu::TextureView,
    white_texture: wgpu::TextureView,
    default_sampler: wgpu::Sampler,
    minimized: bool,
    frame: Option<Frame>,
}

impl WgpuBackend {
    /// Create device, queue and a configured surface for `target`.
    pub fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(target)
            .map_err(|e| RenderError::Surface(e.to_string()))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| RenderError::Device("no compatible adapter".into()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("rasterscene_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| RenderError::Device(e.to_string()))?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or(caps.formats.first())
            .copied()
            .ok_or_else(|| RenderError::Surface("surface reports no formats".into()))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let bind_group_layout = create_bind_group_layout(&device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("material_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let depth_view = create_depth_view(&device, config.width, config.height);
        let white_texture = create_rgba_view(&device, &queue, "white", (1, 1), 1, &[255; 4]);
        let default_sampler = device.create_sampler(&sampler_descriptor(FilteringMethod::Point));

        tracing::info!(
            backend = adapter.get_info().backend.to_str(),
            ?format,
            "GPU initialized"
        );

        Ok(Self {
            device,
            queue,
            surface,
            config,
            bind_group_layout,
            pipeline_layout,
            depth_view,
            white_texture,
            default_sampler,
            minimized: width == 0 || height == 0,
            frame: None,
        })
    }

    fn create_static_buffer(
        &self,
        kind: &'static str,
        label: &str,
        contents: &[u8],
        usage: wgpu::BufferUsages,
    ) -> Result<wgpu::Buffer, RenderError> {
        let failure = |reason: String| RenderError::BufferCreation {
            kind,
            label: label.to_string(),
            reason,
        };
        if contents.is_empty() {
            return Err(failure("zero-sized buffer".into()));
        }
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage,
            });
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(failure(err.to_string())),
            None => Ok(buffer),
        }
    }

    fn create_pipeline(
        &self,
        module: &wgpu::ShaderModule,
        label: &str,
        vertex_entry: &str,
        fragment_entry: &str,
        state: PassState,
    ) -> wgpu::RenderPipeline {
        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some(vertex_entry),
                    compilation_options: Default::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: Vertex::STRIDE as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![
                            0 => Float32x3,
                            1 => Float32x2,
                            2 => Float32x3,
                            3 => Float32x3,
                        ],
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some(fragment_entry),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.config.format,
                        blend: Some(state.blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: state.depth_write,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: Default::default(),
                multiview: None,
                cache: None,
            })
    }
}

impl Gpu for WgpuBackend {
    type Buffer = wgpu::Buffer;
    type Texture = wgpu::TextureView;
    type Sampler = wgpu::Sampler;
    type Program = WgpuProgram;
}

impl ResourceFactory for WgpuBackend {
    fn create_vertex_buffer(
        &self,
        label: &str,
        contents: &[u8],
    ) -> Result<wgpu::Buffer, RenderError> {
        self.create_static_buffer("vertex", label, contents, wgpu::BufferUsages::VERTEX)
    }

    fn create_index_buffer(
        &self,
        label: &str,
        indices: &[u32],
    ) -> Result<wgpu::Buffer, RenderError> {
        self.create_static_buffer(
            "index",
            label,
            bytemuck::cast_slice(indices),
            wgpu::BufferUsages::INDEX,
        )
    }

    fn create_texture_view(&self, path: &Path) -> Result<wgpu::TextureView, RenderError> {
        let failure = |reason: String| RenderError::TextureLoad {
            path: path.to_path_buf(),
            reason,
        };
        let image = image::open(path)
            .map_err(|e| failure(e.to_string()))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(failure("empty image".into()));
        }

        let levels = mip_chain(image);
        let pixels: Vec<u8> = levels
            .iter()
            .flat_map(|level| level.as_raw().iter().copied())
            .collect();
        let label = path.to_string_lossy();
        tracing::debug!(?path, width, height, mips = levels.len(), "texture loaded");
        Ok(create_rgba_view(
            &self.device,
            &self.queue,
            &label,
            (width, height),
            levels.len() as u32,
            &pixels,
        ))
    }

    fn create_sampler(&self, filter: FilteringMethod) -> Result<wgpu::Sampler, RenderError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let sampler = self.device.create_sampler(&sampler_descriptor(filter));
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(RenderError::SamplerCreation {
                filter,
                reason: err.to_string(),
            }),
            None => Ok(sampler),
        }
    }

    fn load_program(&self, path: &Path) -> Result<WgpuProgram, RenderError> {
        let failure = |reason: String| RenderError::ProgramLoad {
            path: path.to_path_buf(),
            reason,
        };
        let source = std::fs::read_to_string(path).map_err(|e| failure(e.to_string()))?;
        let stripped = shaders::strip_comments(&source);

        let vertex_entry = shaders::entry_points(&stripped, "@vertex")
            .into_iter()
            .next()
            .ok_or_else(|| failure("no @vertex entry point".into()))?;
        let entries = shaders::discover_techniques(&stripped);
        if entries.is_empty() {
            return Err(failure("no fs_<technique> fragment entry points".into()));
        }

        let label = path.to_string_lossy().into_owned();
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(source.as_str().into()),
        });
        let pipelines: Vec<Vec<wgpu::RenderPipeline>> = entries
            .iter()
            .map(|technique| {
                let state = PassState::for_technique(&technique.name);
                technique
                    .passes
                    .iter()
                    .map(|fragment| {
                        self.create_pipeline(&module, &label, &vertex_entry, fragment, state)
                    })
                    .collect()
            })
            .collect();
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(failure(err.to_string()));
        }

        let techniques = entries
            .iter()
            .map(|t| TechniqueDesc::new(t.name.clone(), t.passes.len() as u32))
            .collect::<Vec<_>>();
        tracing::info!(
            program = %label,
            techniques = ?techniques.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "shader program loaded"
        );
        Ok(WgpuProgram {
            label,
            declared: shaders::declared_slots(&stripped),
            techniques,
            pipelines,
        })
    }
}

impl DrawContext for WgpuBackend {
    fn bind_geometry(&mut self, vertices: &wgpu::Buffer, stride: u32, indices: &wgpu::Buffer) {
        let Some(frame) = self.frame.as_mut() else {
            return;
        };
        if stride != Vertex::STRIDE {
            tracing::warn!(stride, expected = Vertex::STRIDE, "unexpected vertex stride");
        }
        frame.pass.set_vertex_buffer(0, vertices.slice(..));
        frame.pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
    }

    fn apply_pass(
        &mut self,
        program: &WgpuProgram,
        technique: TechniqueId,
        pass: u32,
        bindings: &PassBindings<'_, Self>,
    ) {
        let Some(frame) = self.frame.as_mut() else {
            tracing::trace!("apply_pass outside a frame");
            return;
        };
        let Some(pipeline) = program
            .pipelines
            .get(technique.0 as usize)
            .and_then(|passes| passes.get(pass as usize))
        else {
            tracing::warn!(program = %program.label, ?technique, pass, "no such pass");
            return;
        };

        let mut uniforms = Uniforms::default();
        for (slot, matrix) in &bindings.matrices {
            let cols = matrix.to_cols_array_2d();
            match slot.0 as usize {
                WORLD_SLOT => uniforms.world = cols,
                WORLD_VIEW_PROJ_SLOT => uniforms.world_view_proj = cols,
                VIEW_INVERSE_SLOT => uniforms.view_inverse = cols,
                _ => {}
            }
        }
        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("pass_uniforms"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let mut textures = [&self.white_texture; TEXTURE_SLOTS];
        for (slot, view) in &bindings.textures {
            if let Some(i) = (slot.0 as usize)
                .checked_sub(FIRST_TEXTURE_SLOT)
                .filter(|&i| i < TEXTURE_SLOTS)
            {
                textures[i] = *view;
            }
        }
        let sampler = bindings
            .sampler
            .map_or(&self.default_sampler, |(_, sampler)| sampler);

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform_buffer.as_entire_binding(),
        }];
        for (i, view) in textures.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + i as u32,
                resource: wgpu::BindingResource::TextureView(*view),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: 1 + TEXTURE_SLOTS as u32,
            resource: wgpu::BindingResource::Sampler(sampler),
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pass_bindings"),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        frame.pass.set_pipeline(pipeline);
        frame.pass.set_bind_group(0, &bind_group, &[]);
    }

    fn draw_indexed(&mut self, index_count: u32) {
        if let Some(frame) = self.frame.as_mut() {
            frame.pass.draw_indexed(0..index_count, 0, 0..1);
        }
    }
}

impl Presenter for WgpuBackend {
    fn is_ready(&self) -> bool {
        !self.minimized
    }

    fn clear(&mut self, values: &ClearValues) -> Result<(), RenderError> {
        if self.frame.take().is_some() {
            tracing::warn!("previous frame dropped without present");
        }

        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Err(RenderError::Surface("surface lost, reconfigured".into()));
            }
            Err(err) => return Err(RenderError::Surface(err.to_string())),
        };
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });
        let [r, g, b, a] = values.color.map(f64::from);
        let pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(values.depth),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(values.stencil),
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                ..Default::default()
            })
            .forget_lifetime();

        self.frame = Some(Frame {
            surface_texture,
            encoder,
            pass,
        });
        Ok(())
    }

    fn present(&mut self) -> Result<(), RenderError> {
        let Frame {
            surface_texture,
            encoder,
            pass,
        } = self.frame.take().ok_or(RenderError::NoFrame)?;
        drop(pass);
        self.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.minimized = width == 0 || height == 0;
        if self.minimized {
            return;
        }
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        self.depth_view = create_depth_view(&self.device, self.config.width, self.config.height);
    }
}

fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("material_bind_group_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            texture_entry(1),
            texture_entry(2),
            texture_entry(3),
            texture_entry(4),
            wgpu::BindGroupLayoutEntry {
                binding: 5,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_stencil"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&Default::default())
}

fn create_rgba_view(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    (width, height): (u32, u32),
    mip_level_count: u32,
    pixels: &[u8],
) -> wgpu::TextureView {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        pixels,
    );
    texture.create_view(&Default::default())
}
