//! Device trait, handles and command descriptors

use crate::{BindingDesc, BindingSlot};
use thiserror::Error;

/// Errors raised while building GPU programs or acquiring a device.
///
/// Runtime commands (uploads, dispatches, draws) never fail through this type.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("shader `{label}` failed to compile: {message}")]
    ShaderCompilation { label: String, message: String },

    #[error("program `{label}` failed to link: {message}")]
    ProgramLink { label: String, message: String },

    #[error("shader `{label}` references unknown binding slot `${{{placeholder}}}`")]
    UnresolvedBinding { label: String, placeholder: String },

    #[error("no suitable GPU adapter: {0}")]
    Adapter(String),

    #[error("device request failed: {0}")]
    RequestDevice(String),
}

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

handle!(
    /// Device buffer handle.
    BufferId
);
handle!(
    /// Compiled shader module handle.
    ShaderId
);
handle!(
    /// Linked compute or render program handle.
    ProgramId
);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Shader storage, read-only or read-write depending on the program.
    Storage,
    /// Small constant block.
    Uniform,
}

#[derive(Clone, Copy, Debug)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Clone, Copy, Debug)]
pub struct ShaderDesc<'a> {
    pub label: &'a str,
    /// Fully composed WGSL source.
    pub source: &'a str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

/// One entry point taken from a compiled shader.
#[derive(Clone, Copy, Debug)]
pub struct StageDesc<'a> {
    pub stage: ShaderStage,
    pub shader: ShaderId,
    pub entry_point: &'a str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topology {
    Lines,
    Triangles,
    /// Coarse patches expanded into triangles by the vertex stage.
    Patches,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramKind {
    Compute { workgroup_size: u32 },
    Render { topology: Topology },
}

#[derive(Clone, Copy, Debug)]
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    pub kind: ProgramKind,
    pub stages: &'a [StageDesc<'a>],
    pub bindings: &'a [BindingDesc],
}

pub const MAX_TESSELLATION_LEVEL: u32 = 64;

/// Per-patch subdivision of the hair pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TessellationLevels {
    /// Interpolated strands emitted per patch.
    pub strands: u32,
    /// Ribbon quads per strand segment.
    pub subdivisions: u32,
}

impl TessellationLevels {
    pub fn new(strands: u32, subdivisions: u32) -> Self {
        Self {
            strands: strands.clamp(1, MAX_TESSELLATION_LEVEL),
            subdivisions: subdivisions.clamp(1, MAX_TESSELLATION_LEVEL),
        }
    }

    /// Two triangles per ribbon quad.
    pub fn vertices_per_patch(&self) -> u32 {
        self.strands * self.subdivisions * 6
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Draw {
    Lines { vertex_count: u32 },
    Triangles { vertex_count: u32 },
    Patches { patch_count: u32, levels: TessellationLevels },
}

impl Draw {
    pub fn topology(&self) -> Topology {
        match self {
            Draw::Lines { .. } => Topology::Lines,
            Draw::Triangles { .. } => Topology::Triangles,
            Draw::Patches { .. } => Topology::Patches,
        }
    }
}

/// Checks stage composition and binding access, shared by every backend.
pub fn validate_program(desc: &ProgramDesc) -> Result<(), DeviceError> {
    let fail = |message: String| DeviceError::ProgramLink {
        label: desc.label.to_string(),
        message,
    };
    let has = |stage| desc.stages.iter().filter(|s| s.stage == stage).count();

    match desc.kind {
        ProgramKind::Compute { workgroup_size } => {
            if workgroup_size == 0 {
                return Err(fail("workgroup size must be positive".into()));
            }
            if has(ShaderStage::Compute) != 1 || desc.stages.len() != 1 {
                return Err(fail("compute program needs exactly one compute stage".into()));
            }
        }
        ProgramKind::Render { .. } => {
            if has(ShaderStage::Vertex) != 1 || has(ShaderStage::Fragment) != 1 {
                return Err(fail("render program needs one vertex and one fragment stage".into()));
            }
            if has(ShaderStage::Compute) != 0 {
                return Err(fail("render program cannot contain a compute stage".into()));
            }
            if let Some(b) = desc.bindings.iter().find(|b| b.access.is_writable()) {
                return Err(fail(format!("slot {} cannot be writable in a render program", b.slot)));
            }
        }
    }

    for (i, a) in desc.bindings.iter().enumerate() {
        if desc.bindings[i + 1..].iter().any(|b| b.slot == a.slot) {
            return Err(fail(format!("slot {} declared twice", a.slot)));
        }
    }
    Ok(())
}

/// Graphics device collaborator.
///
/// Program creation is fallible and happens at initialization. Everything else
/// is a runtime command that assumes valid handles.
pub trait Device {
    fn create_buffer(&mut self, desc: &BufferDesc) -> BufferId;

    fn destroy_buffer(&mut self, id: BufferId);

    fn upload_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]);

    fn copy_buffer(&mut self, src: BufferId, src_offset: u64, dst: BufferId, dst_offset: u64, size: u64);

    fn bind_buffer(&mut self, slot: BindingSlot, id: BufferId);

    fn compile_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderId, DeviceError>;

    fn destroy_shader(&mut self, id: ShaderId);

    fn link_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, DeviceError>;

    fn destroy_program(&mut self, id: ProgramId);

    /// Runs a compute program over `work_items` invocations.
    fn dispatch(&mut self, program: ProgramId, work_items: u32);

    fn draw(&mut self, program: ProgramId, draw: Draw);

    /// Makes every earlier write visible to later commands.
    fn memory_barrier(&mut self);

    fn create_buffer_init(&mut self, desc: &BufferDesc, data: &[u8]) -> BufferId {
        let id = self.create_buffer(desc);
        if !data.is_empty() {
            self.upload_buffer(id, 0, data);
        }
        id
    }
}
