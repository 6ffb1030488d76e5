//! wgpu implementation of [`RenderBackend`].
//!
//! Calls are recorded into pass segments (one per run of draws into the same
//! framebuffer) together with a uniform snapshot per draw, then replayed into
//! real render passes when the frame is presented.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use parking_lot::Mutex;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use crate::display_mode::FillMode;
use crate::mesh::{MeshData, Vertex};
use crate::render::backend::{
    validate_draw, validate_shadow_unit, validate_uniform, validate_viewport, BackendError,
    ClearMask, Framebuffer, MeshHandle, RenderBackend, ShadowMapDesc, ShadowWrap, Viewport,
};
use crate::render::shaders::{self, DrawUniforms, CLEAR_COLOR};
use crate::render::uniforms::{Program, Uniform};
use crate::skybox::SkyboxImages;

const SHADOW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const SKY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const INITIAL_UNIFORM_CAPACITY: usize = 64;

const POSITION_ONLY: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
const POSITION_NORMAL: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

/// GPU backend drawing into a winit window.
pub struct WgpuBackend {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth: DepthBuffer,
    uniforms: UniformRing,
    shadow_layout: wgpu::BindGroupLayout,
    sky_layout: wgpu::BindGroupLayout,
    pipelines: HashMap<(Program, FillMode), wgpu::RenderPipeline>,
    fill_modes: HashSet<FillMode>,
    border_addressing: bool,
    shadow: Option<ShadowTarget>,
    sky: Option<SkyTexture>,
    meshes: Vec<Option<MeshBuffers>>,
    state: BoundState,
    frame: FrameRecord,
    reported_fill_modes: HashSet<FillMode>,
    errors: Arc<Mutex<Vec<BackendError>>>,
}

impl WgpuBackend {
    /// Acquires an adapter and device for `window` and builds every pipeline.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;
        let adapter_info = adapter.get_info();
        info!(
            "using GPU adapter {} ({:?})",
            adapter_info.name, adapter_info.backend
        );

        let optional = wgpu::Features::POLYGON_MODE_LINE
            | wgpu::Features::POLYGON_MODE_POINT
            | wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER;
        let features = adapter.features() & optional;

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("viewer-device"),
            required_features: features,
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: wgpu::Trace::Off,
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .context("failed to create GPU device")?;

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        device.on_uncaptured_error(Box::new(move |error: wgpu::Error| {
            sink.lock().push(BackendError::Device(error.to_string()));
        }));

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no supported formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);
        let uniforms = UniformRing::new(&device, device.limits().min_uniform_buffer_offset_alignment);
        let shadow_layout = shadow_bind_layout(&device);
        let sky_layout = sky_bind_layout(&device);

        let mut fill_modes = HashSet::from([FillMode::Fill]);
        if features.contains(wgpu::Features::POLYGON_MODE_LINE) {
            fill_modes.insert(FillMode::Line);
        }
        if features.contains(wgpu::Features::POLYGON_MODE_POINT) {
            fill_modes.insert(FillMode::Point);
        }
        debug!("supported fill modes: {fill_modes:?}");

        let layouts = PipelineLayouts {
            uniforms: &uniforms.layout,
            shadow: &shadow_layout,
            sky: &sky_layout,
        };
        let mut pipelines = HashMap::new();
        for program in Program::ALL {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{program}-shader")),
                source: wgpu::ShaderSource::Wgsl(shaders::source(program).into()),
            });
            let layout = layouts.for_program(&device, program);
            for fill in FillMode::ALL {
                if !fill_modes.contains(&fill) {
                    continue;
                }
                let pipeline =
                    create_pipeline(&device, &module, &layout, program, fill, surface_format);
                pipelines.insert((program, fill), pipeline);
            }
        }

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            depth,
            uniforms,
            shadow_layout,
            sky_layout,
            pipelines,
            fill_modes,
            border_addressing: features.contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER),
            shadow: None,
            sky: None,
            meshes: Vec::new(),
            state: BoundState::new(Viewport::new(size.width, size.height)),
            frame: FrameRecord::default(),
            reported_fill_modes: HashSet::new(),
            errors,
        })
    }

    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Reconfigures the surface and window depth buffer.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, new_size.width, new_size.height);
    }

    fn push_error(&self, error: BackendError) {
        self.errors.lock().push(error);
    }

    fn target_size(&self, target: Framebuffer) -> Option<(u32, u32)> {
        match target {
            Framebuffer::Default => Some((self.config.width, self.config.height)),
            Framebuffer::Shadow => self.shadow.as_ref().map(|s| (s.width, s.height)),
        }
    }

    fn effective_fill(&self) -> FillMode {
        let requested = self.state.fill_mode;
        if self.fill_modes.contains(&requested) {
            requested
        } else {
            FillMode::Fill
        }
    }

    fn submit(&mut self, frame: FrameRecord) -> Result<(), BackendError> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                debug!("surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                debug!("timed out acquiring the next frame");
                return Ok(());
            }
            Err(err) => return Err(BackendError::Surface(err.to_string())),
        };

        self.uniforms.upload(&self.device, &self.queue, &frame.snapshots);

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });
        for segment in &frame.segments {
            self.encode_segment(&mut encoder, &view, segment);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.window.pre_present_notify();
        output.present();
        Ok(())
    }

    fn encode_segment(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        surface_view: &wgpu::TextureView,
        segment: &PassSegment,
    ) {
        let depth_load = if segment.clear.depth {
            wgpu::LoadOp::Clear(1.0)
        } else {
            wgpu::LoadOp::Load
        };
        let (color_attachments, depth_view, label) = match segment.target {
            Framebuffer::Default => {
                let load = if segment.clear.color {
                    wgpu::LoadOp::Clear(wgpu::Color {
                        r: f64::from(CLEAR_COLOR.x),
                        g: f64::from(CLEAR_COLOR.y),
                        b: f64::from(CLEAR_COLOR.z),
                        a: 1.0,
                    })
                } else {
                    wgpu::LoadOp::Load
                };
                let color = wgpu::RenderPassColorAttachment {
                    view: surface_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                };
                (vec![Some(color)], &self.depth.view, "color-pass")
            }
            Framebuffer::Shadow => match &self.shadow {
                Some(shadow) => (Vec::new(), &shadow.view, "depth-pass"),
                None => return,
            },
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &color_attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for draw in &segment.draws {
            let Some(pipeline) = self.pipelines.get(&(draw.program, draw.fill)) else {
                continue;
            };
            let Some(Some(mesh)) = self.meshes.get(draw.mesh) else {
                continue;
            };
            let textures = match draw.program {
                Program::Main => self.shadow.as_ref().map(|s| &s.bind_group),
                Program::Skybox => self.sky.as_ref().map(|s| &s.bind_group),
                Program::Depth | Program::LightMarker => None,
            };

            let vp = draw.viewport;
            pass.set_pipeline(pipeline);
            pass.set_viewport(
                vp.x as f32,
                vp.y as f32,
                vp.width as f32,
                vp.height as f32,
                0.0,
                1.0,
            );
            pass.set_bind_group(0, &self.uniforms.bind_group, &[self.uniforms.offset(draw.snapshot)]);
            if let Some(textures) = textures {
                pass.set_bind_group(1, textures, &[]);
            }
            pass.set_vertex_buffer(0, mesh.vertex.slice(..));
            pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }
}

impl RenderBackend for WgpuBackend {
    fn upload_mesh(&mut self, label: &str, mesh: &MeshData) -> MeshHandle {
        let buffers = (!mesh.is_empty()).then(|| MeshBuffers::from_mesh(&self.device, mesh, label));
        self.meshes.push(buffers);
        MeshHandle(self.meshes.len() - 1)
    }

    fn configure_shadow_target(&mut self, desc: &ShadowMapDesc) {
        let ShadowWrap::ClampToBorder { depth } = desc.wrap;
        if !self.border_addressing {
            info!("clamp-to-border sampling unavailable; shadow lookups are range-guarded instead");
        } else if depth != 1.0 {
            warn!("only an opaque white border is supported; ignoring border depth {depth}");
        }
        self.shadow = Some(ShadowTarget::create(
            &self.device,
            &self.shadow_layout,
            desc,
            self.border_addressing,
        ));
    }

    fn upload_skybox(&mut self, images: &SkyboxImages) {
        self.sky = Some(SkyTexture::create(
            &self.device,
            &self.queue,
            &self.sky_layout,
            images,
        ));
    }

    fn window_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn viewport(&self) -> Viewport {
        self.state.viewport
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = viewport;
    }

    fn bound_framebuffer(&self) -> Framebuffer {
        self.state.target
    }

    fn bind_framebuffer(&mut self, target: Framebuffer) {
        if target == Framebuffer::Shadow && self.shadow.is_none() {
            self.push_error(BackendError::ShadowTargetMissing);
        }
        self.state.target = target;
    }

    fn clear(&mut self, mask: ClearMask) {
        self.frame.clear(self.state.target, mask);
    }

    fn use_program(&mut self, program: Program) {
        self.state.program = Some(program);
    }

    fn set_uniform(&mut self, uniform: Uniform) {
        match validate_uniform(self.state.program, &uniform) {
            Ok(program) => {
                let slot = &mut self.state.programs[program.index()];
                if let Uniform::ShadowMap(unit) = uniform {
                    slot.sampler_unit = Some(unit);
                }
                slot.block.apply(&uniform);
            }
            Err(err) => self.push_error(err),
        }
    }

    fn bind_shadow_texture(&mut self, unit: u32) {
        self.state.shadow_unit = Some(unit);
    }

    fn set_fill_mode(&mut self, mode: FillMode) {
        if !self.fill_modes.contains(&mode) && self.reported_fill_modes.insert(mode) {
            self.push_error(BackendError::UnsupportedFillMode(mode));
        }
        self.state.fill_mode = mode;
    }

    fn draw(&mut self, mesh: MeshHandle) {
        let target = self.state.target;
        let program = match validate_draw(self.state.program, target) {
            Ok(program) => program,
            Err(err) => return self.push_error(err),
        };
        let Some(uploaded) = self.meshes.get(mesh.0) else {
            return self.push_error(BackendError::UnknownMesh(mesh.0));
        };
        if uploaded.is_none() {
            return;
        }
        let Some(size) = self.target_size(target) else {
            return self.push_error(BackendError::ShadowTargetMissing);
        };
        let viewport = match validate_viewport(self.state.viewport, target, size) {
            Ok(viewport) => viewport,
            Err((clamped, err)) => {
                self.push_error(err);
                clamped
            }
        };
        let program_state = self.state.programs[program.index()];
        if program.samples_shadow_map() {
            if let Err(err) = validate_shadow_unit(program_state.sampler_unit, self.state.shadow_unit) {
                self.push_error(err);
            }
            if self.shadow.is_none() {
                return self.push_error(BackendError::ShadowTargetMissing);
            }
        }
        if program == Program::Skybox && self.sky.is_none() {
            debug!("sky-box drawn before its faces were uploaded");
            return;
        }
        if viewport.width == 0 || viewport.height == 0 {
            return;
        }

        let fill = self.effective_fill();
        let snapshot = self.frame.snapshots.len() as u32;
        self.frame.snapshots.push(program_state.block);
        self.frame.segment(target).draws.push(DrawCall {
            program,
            fill,
            mesh: mesh.0,
            viewport,
            snapshot,
        });
    }

    fn present(&mut self) {
        let frame = std::mem::take(&mut self.frame);
        if let Err(err) = self.submit(frame) {
            self.push_error(err);
        }
    }

    fn take_errors(&mut self) -> Vec<BackendError> {
        std::mem::take(&mut *self.errors.lock())
    }
}

/// State a GL-style context would hold between calls.
#[derive(Debug, Clone)]
struct BoundState {
    viewport: Viewport,
    target: Framebuffer,
    program: Option<Program>,
    fill_mode: FillMode,
    shadow_unit: Option<u32>,
    programs: [ProgramState; 4],
}

impl BoundState {
    fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            target: Framebuffer::Default,
            program: None,
            fill_mode: FillMode::Fill,
            shadow_unit: None,
            programs: [ProgramState::default(); 4],
        }
    }
}

/// Uniform values last set on one program.
#[derive(Debug, Clone, Copy, Default)]
struct ProgramState {
    block: DrawUniforms,
    sampler_unit: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
struct DrawCall {
    program: Program,
    fill: FillMode,
    mesh: usize,
    viewport: Viewport,
    snapshot: u32,
}

/// Consecutive clears and draws into one framebuffer.
#[derive(Debug, Clone)]
struct PassSegment {
    target: Framebuffer,
    clear: ClearMask,
    draws: Vec<DrawCall>,
}

impl PassSegment {
    fn new(target: Framebuffer, clear: ClearMask) -> Self {
        Self {
            target,
            clear,
            draws: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct FrameRecord {
    segments: Vec<PassSegment>,
    snapshots: Vec<DrawUniforms>,
}

impl FrameRecord {
    const NO_CLEAR: ClearMask = ClearMask {
        color: false,
        depth: false,
    };

    /// Segment receiving draws into `target`, opened on a target switch.
    fn segment(&mut self, target: Framebuffer) -> &mut PassSegment {
        let reuse = self.segments.last().is_some_and(|s| s.target == target);
        if !reuse {
            self.segments.push(PassSegment::new(target, Self::NO_CLEAR));
        }
        let last = self.segments.len() - 1;
        &mut self.segments[last]
    }

    /// A clear after draws starts a new segment so it becomes a load op.
    fn clear(&mut self, target: Framebuffer, mask: ClearMask) {
        match self.segments.last_mut() {
            Some(last) if last.target == target && last.draws.is_empty() => {
                last.clear.color |= mask.color;
                last.clear.depth |= mask.depth;
            }
            _ => self.segments.push(PassSegment::new(target, mask)),
        }
    }
}

/// One dynamic-offset uniform buffer holding every draw's snapshot.
struct UniformRing {
    layout: wgpu::BindGroupLayout,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    stride: u64,
    capacity: usize,
}

impl UniformRing {
    fn new(device: &wgpu::Device, alignment: u32) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("draw-uniform-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(DrawUniforms::SIZE),
                },
                count: None,
            }],
        });
        let stride = align_to(DrawUniforms::SIZE, u64::from(alignment));
        let (buffer, bind_group) = Self::allocate(device, &layout, stride, INITIAL_UNIFORM_CAPACITY);
        Self {
            layout,
            buffer,
            bind_group,
            stride,
            capacity: INITIAL_UNIFORM_CAPACITY,
        }
    }

    fn allocate(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        stride: u64,
        capacity: usize,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("draw-uniforms"),
            size: stride * capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("draw-uniform-bind-group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(DrawUniforms::SIZE),
                }),
            }],
        });
        (buffer, bind_group)
    }

    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, snapshots: &[DrawUniforms]) {
        if snapshots.is_empty() {
            return;
        }
        if snapshots.len() > self.capacity {
            let capacity = snapshots.len().next_power_of_two();
            debug!("growing draw uniform buffer to {capacity} entries");
            let (buffer, bind_group) = Self::allocate(device, &self.layout, self.stride, capacity);
            self.buffer = buffer;
            self.bind_group = bind_group;
            self.capacity = capacity;
        }
        let stride = self.stride as usize;
        let mut bytes = vec![0u8; snapshots.len() * stride];
        for (chunk, snapshot) in bytes.chunks_exact_mut(stride).zip(snapshots) {
            chunk[..DrawUniforms::SIZE as usize].copy_from_slice(bytemuck::bytes_of(snapshot));
        }
        queue.write_buffer(&self.buffer, 0, &bytes);
    }

    fn offset(&self, snapshot: u32) -> u32 {
        (u64::from(snapshot) * self.stride) as u32
    }
}

fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment.max(1)) * alignment.max(1)
}

struct PipelineLayouts<'a> {
    uniforms: &'a wgpu::BindGroupLayout,
    shadow: &'a wgpu::BindGroupLayout,
    sky: &'a wgpu::BindGroupLayout,
}

impl PipelineLayouts<'_> {
    fn for_program(&self, device: &wgpu::Device, program: Program) -> wgpu::PipelineLayout {
        let groups: Vec<&wgpu::BindGroupLayout> = match program {
            Program::Depth | Program::LightMarker => vec![self.uniforms],
            Program::Main => vec![self.uniforms, self.shadow],
            Program::Skybox => vec![self.uniforms, self.sky],
        };
        device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{program}-pipeline-layout")),
            bind_group_layouts: &groups,
            push_constant_ranges: &[],
        })
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    module: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    program: Program,
    fill: FillMode,
    color_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let attributes: &[wgpu::VertexAttribute] = match program {
        Program::Main => &POSITION_NORMAL,
        Program::Depth | Program::LightMarker | Program::Skybox => &POSITION_ONLY,
    };
    let polygon_mode = match fill {
        FillMode::Fill => wgpu::PolygonMode::Fill,
        FillMode::Line => wgpu::PolygonMode::Line,
        FillMode::Point => wgpu::PolygonMode::Point,
    };
    let depth_stencil = match program {
        Program::Depth => wgpu::DepthStencilState {
            format: SHADOW_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: Default::default(),
            bias: Default::default(),
        },
        Program::Main | Program::LightMarker => wgpu::DepthStencilState {
            format: DepthBuffer::FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: Default::default(),
            bias: Default::default(),
        },
        // Drawn last at depth 1.0, behind everything already rendered.
        Program::Skybox => wgpu::DepthStencilState {
            format: DepthBuffer::FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: Default::default(),
            bias: Default::default(),
        },
    };
    let color_targets = [Some(wgpu::ColorTargetState {
        format: color_format,
        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
        write_mask: wgpu::ColorWrites::ALL,
    })];
    let fragment = shaders::has_fragment_stage(program).then(|| wgpu::FragmentState {
        module,
        entry_point: Some("fs_main"),
        compilation_options: Default::default(),
        targets: &color_targets,
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&format!("{program}-{fill}-pipeline")),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: Vertex::STRIDE,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            }],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: (program != Program::Skybox).then_some(wgpu::Face::Back),
            polygon_mode,
            ..Default::default()
        },
        depth_stencil: Some(depth_stencil),
        multisample: wgpu::MultisampleState::default(),
        fragment,
        multiview: None,
        cache: None,
    })
}

fn shadow_bind_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("shadow-map-layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Depth,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                count: None,
            },
        ],
    })
}

fn sky_bind_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("skybox-layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::Cube,
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
    })
}

/// Depth texture rendered from the light and sampled by the main program.
struct ShadowTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

impl ShadowTarget {
    fn create(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        desc: &ShadowMapDesc,
        border_addressing: bool,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow-map"),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHADOW_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let (address_mode, border_color) = if border_addressing {
            (
                wgpu::AddressMode::ClampToBorder,
                Some(wgpu::SamplerBorderColor::OpaqueWhite),
            )
        } else {
            (wgpu::AddressMode::ClampToEdge, None)
        };
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow-map-sampler"),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            border_color,
            ..Default::default()
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow-map-bind-group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        Self {
            _texture: texture,
            view,
            bind_group,
            width: desc.width,
            height: desc.height,
        }
    }
}

struct SkyTexture {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

impl SkyTexture {
    fn create(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        images: &SkyboxImages,
    ) -> Self {
        let data = images.faces.concat();
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("skybox"),
                size: wgpu::Extent3d {
                    width: images.size,
                    height: images.size,
                    depth_or_array_layers: 6,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: SKY_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &data,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("skybox-view"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            array_layer_count: Some(6),
            ..Default::default()
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("skybox-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("skybox-bind-group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });
        Self {
            _texture: texture,
            bind_group,
        }
    }
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &MeshData, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: mesh.indices.len() as u32,
        }
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("window-depth"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_respects_offset_alignment() {
        assert_eq!(align_to(DrawUniforms::SIZE, 256), 512);
        assert_eq!(align_to(DrawUniforms::SIZE, 64), 384);
        assert_eq!(align_to(10, 0), 10);
    }

    #[test]
    fn clear_after_draws_opens_a_new_segment() {
        let mut frame = FrameRecord::default();
        frame.clear(Framebuffer::Shadow, ClearMask::DEPTH);
        frame.segment(Framebuffer::Shadow).draws.push(DrawCall {
            program: Program::Depth,
            fill: FillMode::Fill,
            mesh: 0,
            viewport: Viewport::new(8, 8),
            snapshot: 0,
        });
        frame.clear(Framebuffer::Default, ClearMask::COLOR_DEPTH);
        frame.clear(Framebuffer::Default, ClearMask::DEPTH);
        assert_eq!(frame.segments.len(), 2);
        assert_eq!(frame.segments[0].draws.len(), 1);
        assert_eq!(frame.segments[1].clear, ClearMask::COLOR_DEPTH);
        assert_eq!(frame.segment(Framebuffer::Default).target, Framebuffer::Default);
        assert_eq!(frame.segments.len(), 2);
    }

    #[test]
    fn draws_without_clear_load_previous_contents() {
        let mut frame = FrameRecord::default();
        frame.segment(Framebuffer::Default);
        assert_eq!(frame.segments[0].clear, FrameRecord::NO_CLEAR);
    }
}
