//! `wgpu` backend
//!
//! Commands are recorded into one pending encoder which is submitted on
//! [`Device::memory_barrier`], before every upload, and at [`WgpuDevice::end_frame`].
//! Bind groups are rebuilt per command from the current slot table and the
//! bindings each program declared at link time.

use crate::{
    validate_program, Access, BindingDesc, BindingSlot, BufferDesc, BufferId, BufferUsage, Device,
    DeviceError, Draw, ProgramDesc, ProgramId, ProgramKind, ShaderDesc, ShaderId, ShaderStage,
    Topology,
};
use std::collections::HashMap;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

enum Pipeline {
    Compute {
        pipeline: wgpu::ComputePipeline,
        workgroup_size: u32,
    },
    Render(wgpu::RenderPipeline),
}

struct GpuProgram {
    label: String,
    bindings: Vec<BindingDesc>,
    layout: wgpu::BindGroupLayout,
    pipeline: Pipeline,
}

struct FrameTarget {
    color: wgpu::TextureView,
    depth: wgpu::TextureView,
}

/// [`Device`] implementation over a `wgpu` device and queue.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    color_format: wgpu::TextureFormat,

    buffers: HashMap<BufferId, wgpu::Buffer>,
    shaders: HashMap<ShaderId, wgpu::ShaderModule>,
    programs: HashMap<ProgramId, GpuProgram>,
    slots: [Option<BufferId>; BindingSlot::COUNT],

    encoder: Option<wgpu::CommandEncoder>,
    target: Option<FrameTarget>,
    next_id: u32,
}

impl WgpuDevice {
    /// Wraps an existing device. Render programs target `color_format` with a
    /// [`DEPTH_FORMAT`] depth attachment.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, color_format: wgpu::TextureFormat) -> Self {
        Self {
            device,
            queue,
            color_format,
            buffers: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            slots: [None; BindingSlot::COUNT],
            encoder: None,
            target: None,
            next_id: 0,
        }
    }

    /// Creates a device without a surface, rendering to `Rgba8UnormSrgb` targets.
    pub fn headless() -> Result<Self, DeviceError> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .map_err(|e| DeviceError::Adapter(e.to_string()))?;

            log::info!("Using GPU: {}", adapter.get_info().name);

            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("Hair Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                    experimental_features: wgpu::ExperimentalFeatures::default(),
                    trace: wgpu::Trace::Off,
                })
                .await
                .map_err(|e| DeviceError::RequestDevice(e.to_string()))?;

            Ok(Self::new(device, queue, wgpu::TextureFormat::Rgba8UnormSrgb))
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.color_format
    }

    pub fn buffer(&self, id: BufferId) -> Option<&wgpu::Buffer> {
        self.buffers.get(&id)
    }

    pub fn create_depth_texture(&self, width: u32, height: u32) -> wgpu::TextureView {
        let depth_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
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
        depth_texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    /// Sets the attachments used by subsequent draws.
    pub fn begin_frame(&mut self, color: wgpu::TextureView, depth: wgpu::TextureView) {
        self.target = Some(FrameTarget { color, depth });
    }

    /// Clears the current frame target.
    pub fn clear(&mut self, color: wgpu::Color) {
        let Some(target) = &self.target else {
            log::warn!("clear() without a frame target");
            return;
        };
        let encoder = self.encoder.get_or_insert_with(|| {
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Hair Encoder"),
            })
        });
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(color),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &target.depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    /// Submits pending work and releases the frame target.
    pub fn end_frame(&mut self) {
        self.flush();
        self.target = None;
    }

    pub fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn bind_group(&self, program: &GpuProgram) -> Option<wgpu::BindGroup> {
        let mut entries = Vec::with_capacity(program.bindings.len());
        for desc in &program.bindings {
            let buffer = self.slots[desc.slot.index() as usize].and_then(|id| self.buffers.get(&id));
            let Some(buffer) = buffer else {
                log::error!("Program `{}`: nothing bound at {}", program.label, desc.slot);
                return None;
            };
            entries.push(wgpu::BindGroupEntry {
                binding: desc.slot.index(),
                resource: buffer.as_entire_binding(),
            });
        }
        Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&program.label),
            layout: &program.layout,
            entries: &entries,
        }))
    }

    fn scoped<T>(&self, build: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<String>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = build(&self.device);
        let error = pollster::block_on(self.device.pop_error_scope());
        (value, error.map(|e| e.to_string()))
    }
}

fn layout_entry(desc: &BindingDesc, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    let ty = match desc.access {
        Access::Uniform => wgpu::BufferBindingType::Uniform,
        Access::ReadOnly => wgpu::BufferBindingType::Storage { read_only: true },
        Access::ReadWrite => wgpu::BufferBindingType::Storage { read_only: false },
    };
    wgpu::BindGroupLayoutEntry {
        binding: desc.slot.index(),
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl Device for WgpuDevice {
    fn create_buffer(&mut self, desc: &BufferDesc) -> BufferId {
        let usage = match desc.usage {
            BufferUsage::Storage => {
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC
            }
            BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        };
        // Empty buffers cannot be bound, and copies need 4 byte alignment.
        let size = desc.size.max(16).next_multiple_of(16);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size,
            usage,
            mapped_at_creation: false,
        });
        let id = BufferId(self.next());
        self.buffers.insert(id, buffer);
        id
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        // Pending commands may still reference it.
        self.flush();
        if let Some(buffer) = self.buffers.remove(&id) {
            buffer.destroy();
        }
        for slot in self.slots.iter_mut().filter(|s| **s == Some(id)) {
            *slot = None;
        }
    }

    fn upload_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) {
        // Queue writes land before the next submission, so submit what's recorded first.
        self.flush();
        match self.buffers.get(&id) {
            Some(buffer) => self.queue.write_buffer(buffer, offset, data),
            None => log::error!("Upload to unknown buffer {:?}", id),
        }
    }

    fn copy_buffer(&mut self, src: BufferId, src_offset: u64, dst: BufferId, dst_offset: u64, size: u64) {
        let (Some(src_buffer), Some(dst_buffer)) = (self.buffers.get(&src), self.buffers.get(&dst)) else {
            log::error!("Copy between unknown buffers {:?} -> {:?}", src, dst);
            return;
        };
        let encoder = self.encoder.get_or_insert_with(|| {
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Hair Encoder"),
            })
        });
        encoder.copy_buffer_to_buffer(src_buffer, src_offset, dst_buffer, dst_offset, size);
    }

    fn bind_buffer(&mut self, slot: BindingSlot, id: BufferId) {
        self.slots[slot.index() as usize] = Some(id);
    }

    fn compile_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderId, DeviceError> {
        if let Some(pos) = desc.source.find("${") {
            return Err(DeviceError::UnresolvedBinding {
                label: desc.label.to_string(),
                placeholder: desc.source[pos..].chars().take(24).collect(),
            });
        }

        let (module, error) = self.scoped(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::ShaderSource::Wgsl(desc.source.into()),
            })
        });
        if let Some(message) = error {
            return Err(DeviceError::ShaderCompilation {
                label: desc.label.to_string(),
                message,
            });
        }

        log::debug!("Compiled shader `{}`", desc.label);
        let id = ShaderId(self.next());
        self.shaders.insert(id, module);
        Ok(id)
    }

    fn destroy_shader(&mut self, id: ShaderId) {
        self.shaders.remove(&id);
    }

    fn link_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, DeviceError> {
        validate_program(desc)?;
        let link_error = |message: String| DeviceError::ProgramLink {
            label: desc.label.to_string(),
            message,
        };
        let module = |stage: ShaderStage| {
            let s = desc.stages.iter().find(|s| s.stage == stage)?;
            Some((self.shaders.get(&s.shader)?, s.entry_point))
        };

        let visibility = match desc.kind {
            ProgramKind::Compute { .. } => wgpu::ShaderStages::COMPUTE,
            ProgramKind::Render { .. } => wgpu::ShaderStages::VERTEX_FRAGMENT,
        };
        let entries: Vec<_> = desc.bindings.iter().map(|b| layout_entry(b, visibility)).collect();
        let layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(desc.label),
            entries: &entries,
        });
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let (pipeline, error) = match desc.kind {
            ProgramKind::Compute { workgroup_size } => {
                let (cs, cs_entry) =
                    module(ShaderStage::Compute).ok_or_else(|| link_error("unknown compute shader".into()))?;
                let (pipeline, error) = self.scoped(|device| {
                    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                        label: Some(desc.label),
                        layout: Some(&pipeline_layout),
                        module: cs,
                        entry_point: Some(cs_entry),
                        compilation_options: Default::default(),
                        cache: None,
                    })
                });
                (Pipeline::Compute { pipeline, workgroup_size }, error)
            }
            ProgramKind::Render { topology } => {
                let (vs, vs_entry) =
                    module(ShaderStage::Vertex).ok_or_else(|| link_error("unknown vertex shader".into()))?;
                let (fs, fs_entry) =
                    module(ShaderStage::Fragment).ok_or_else(|| link_error("unknown fragment shader".into()))?;
                let topology = match topology {
                    Topology::Lines => wgpu::PrimitiveTopology::LineList,
                    Topology::Triangles | Topology::Patches => wgpu::PrimitiveTopology::TriangleList,
                };
                let (pipeline, error) = self.scoped(|device| {
                    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                        label: Some(desc.label),
                        layout: Some(&pipeline_layout),
                        vertex: wgpu::VertexState {
                            module: vs,
                            entry_point: Some(vs_entry),
                            buffers: &[],
                            compilation_options: Default::default(),
                        },
                        fragment: Some(wgpu::FragmentState {
                            module: fs,
                            entry_point: Some(fs_entry),
                            targets: &[Some(wgpu::ColorTargetState {
                                format: self.color_format,
                                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                                write_mask: wgpu::ColorWrites::ALL,
                            })],
                            compilation_options: Default::default(),
                        }),
                        primitive: wgpu::PrimitiveState {
                            topology,
                            strip_index_format: None,
                            front_face: wgpu::FrontFace::Ccw,
                            cull_mode: None,
                            unclipped_depth: false,
                            polygon_mode: wgpu::PolygonMode::Fill,
                            conservative: false,
                        },
                        depth_stencil: Some(wgpu::DepthStencilState {
                            format: DEPTH_FORMAT,
                            depth_write_enabled: true,
                            depth_compare: wgpu::CompareFunction::Less,
                            stencil: wgpu::StencilState::default(),
                            bias: wgpu::DepthBiasState::default(),
                        }),
                        multisample: wgpu::MultisampleState::default(),
                        multiview: None,
                        cache: None,
                    })
                });
                (Pipeline::Render(pipeline), error)
            }
        };
        if let Some(message) = error {
            return Err(link_error(message));
        }

        log::debug!("Linked program `{}`", desc.label);
        let id = ProgramId(self.next());
        self.programs.insert(
            id,
            GpuProgram {
                label: desc.label.to_string(),
                bindings: desc.bindings.to_vec(),
                layout,
                pipeline,
            },
        );
        Ok(id)
    }

    fn destroy_program(&mut self, id: ProgramId) {
        self.programs.remove(&id);
    }

    fn dispatch(&mut self, program: ProgramId, work_items: u32) {
        let Some(prog) = self.programs.get(&program) else {
            log::error!("Dispatch of unknown program {:?}", program);
            return;
        };
        let Pipeline::Compute { pipeline, workgroup_size } = &prog.pipeline else {
            log::error!("Dispatch of render program `{}`", prog.label);
            return;
        };
        let Some(bind_group) = self.bind_group(prog) else {
            return;
        };

        let encoder = self.encoder.get_or_insert_with(|| {
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Hair Encoder"),
            })
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(&prog.label),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(work_items.div_ceil(*workgroup_size), 1, 1);
    }

    fn draw(&mut self, program: ProgramId, draw: Draw) {
        let Some(target) = &self.target else {
            log::warn!("Draw without a frame target, call begin_frame first");
            return;
        };
        let Some(prog) = self.programs.get(&program) else {
            log::error!("Draw with unknown program {:?}", program);
            return;
        };
        let Pipeline::Render(pipeline) = &prog.pipeline else {
            log::error!("Draw with compute program `{}`", prog.label);
            return;
        };
        let Some(bind_group) = self.bind_group(prog) else {
            return;
        };

        let encoder = self.encoder.get_or_insert_with(|| {
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Hair Encoder"),
            })
        });
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&prog.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &target.depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        match draw {
            Draw::Lines { vertex_count } | Draw::Triangles { vertex_count } => {
                pass.draw(0..vertex_count, 0..1);
            }
            // One instance per patch, the vertex stage expands the patch.
            Draw::Patches { patch_count, levels } => {
                pass.draw(0..levels.vertices_per_patch(), 0..patch_count);
            }
        }
    }

    fn memory_barrier(&mut self) {
        self.flush();
    }
}
