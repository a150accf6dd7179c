//! Host-memory reference device
//!
//! Buffers live in `Vec<u8>`s, every command is appended to a log, and compute
//! dispatches run CPU kernels registered under the program label. Used to test
//! the stages and the hair system without a GPU.

use crate::{
    validate_program, BindingDesc, BindingSlot, BufferDesc, BufferId, BufferUsage, Device,
    DeviceError, Draw, ProgramDesc, ProgramId, ProgramKind, ShaderDesc, ShaderId,
};
use bytemuck::Pod;
use std::collections::HashMap;

/// CPU implementation of a compute program. Receives the bound buffers and the
/// number of work items of the dispatch.
pub type CpuKernel = Box<dyn FnMut(&mut KernelContext<'_>, u32)>;

/// Recorded device command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    CreateBuffer { id: BufferId, label: String, size: u64 },
    DestroyBuffer(BufferId),
    Upload { id: BufferId, offset: u64, len: u64 },
    Copy { src: BufferId, dst: BufferId, size: u64 },
    Bind { slot: BindingSlot, id: BufferId },
    CompileShader { id: ShaderId, label: String },
    DestroyShader(ShaderId),
    LinkProgram { id: ProgramId, label: String },
    DestroyProgram(ProgramId),
    Dispatch { program: ProgramId, work_items: u32 },
    Draw { program: ProgramId, draw: Draw },
    MemoryBarrier,
}

struct CpuBuffer {
    label: String,
    usage: BufferUsage,
    data: Vec<u8>,
}

struct CpuProgram {
    label: String,
    kind: ProgramKind,
    bindings: Vec<BindingDesc>,
}

/// View of the buffers bound to a program during one kernel invocation.
pub struct KernelContext<'a> {
    label: &'a str,
    buffers: &'a mut HashMap<BufferId, CpuBuffer>,
    bindings: Vec<(BindingDesc, BufferId)>,
}

impl KernelContext<'_> {
    pub fn label(&self) -> &str {
        self.label
    }

    fn lookup(&self, slot: BindingSlot) -> Option<(BindingDesc, BufferId)> {
        let found = self.bindings.iter().find(|(b, _)| b.slot == slot).copied();
        if found.is_none() {
            log::error!("Kernel `{}` accessed undeclared slot {}", self.label, slot);
        }
        found
    }

    /// Copies a storage buffer out as a typed array.
    pub fn read<T: Pod>(&self, slot: BindingSlot) -> Vec<T> {
        let Some((_, id)) = self.lookup(slot) else {
            return Vec::new();
        };
        let data = &self.buffers[&id].data;
        let whole = data.len() - data.len() % std::mem::size_of::<T>();
        bytemuck::pod_collect_to_vec(&data[..whole])
    }

    /// Reads a constant block. A buffer smaller than `T` yields zeros.
    pub fn read_block<T: Pod>(&self, slot: BindingSlot) -> T {
        let Some((_, id)) = self.lookup(slot) else {
            return T::zeroed();
        };
        let data = &self.buffers[&id].data;
        let size = std::mem::size_of::<T>();
        if data.len() < size {
            log::error!("Kernel `{}`: block at {} is only {} bytes", self.label, slot, data.len());
            return T::zeroed();
        }
        bytemuck::pod_read_unaligned(&data[..size])
    }

    /// Overwrites the start of a writable storage buffer.
    pub fn write<T: Pod>(&mut self, slot: BindingSlot, values: &[T]) {
        let Some((desc, id)) = self.lookup(slot) else {
            return;
        };
        if !desc.access.is_writable() {
            log::error!("Kernel `{}` wrote read-only slot {}", self.label, slot);
            return;
        }
        let bytes: &[u8] = bytemuck::cast_slice(values);
        let buffer = self.buffers.get_mut(&id).map(|b| &mut b.data);
        match buffer {
            Some(data) if bytes.len() <= data.len() => data[..bytes.len()].copy_from_slice(bytes),
            _ => log::error!("Kernel `{}` overflowed buffer at {}", self.label, slot),
        }
    }
}

/// Reference [`Device`] backed by host memory.
pub struct CpuDevice {
    buffers: HashMap<BufferId, CpuBuffer>,
    shaders: HashMap<ShaderId, String>,
    programs: HashMap<ProgramId, CpuProgram>,
    slots: [Option<BufferId>; BindingSlot::COUNT],
    kernels: HashMap<String, CpuKernel>,
    compile_failures: HashMap<String, String>,
    commands: Vec<Command>,
    next_id: u32,
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuDevice {
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            slots: [None; BindingSlot::COUNT],
            kernels: HashMap::new(),
            compile_failures: HashMap::new(),
            commands: Vec::new(),
            next_id: 0,
        }
    }

    /// Registers the kernel run by dispatches of programs labelled `program_label`.
    pub fn register_kernel<F>(&mut self, program_label: &str, kernel: F)
    where
        F: FnMut(&mut KernelContext<'_>, u32) + 'static,
    {
        log::debug!("Registered CPU kernel for `{}`", program_label);
        self.kernels.insert(program_label.to_string(), Box::new(kernel));
    }

    /// Makes the next compilation of shader `label` fail with `message`.
    pub fn fail_compile(&mut self, label: &str, message: &str) {
        self.compile_failures.insert(label.to_string(), message.to_string());
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn read_buffer(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(&id).map(|b| b.data.as_slice())
    }

    pub fn read_buffer_as<T: Pod>(&self, id: BufferId) -> Vec<T> {
        match self.read_buffer(id) {
            Some(data) => {
                let whole = data.len() - data.len() % std::mem::size_of::<T>();
                bytemuck::pod_collect_to_vec(&data[..whole])
            }
            None => Vec::new(),
        }
    }

    pub fn buffer_label(&self, id: BufferId) -> Option<&str> {
        self.buffers.get(&id).map(|b| b.label.as_str())
    }

    pub fn buffer_usage(&self, id: BufferId) -> Option<BufferUsage> {
        self.buffers.get(&id).map(|b| b.usage)
    }

    pub fn bound(&self, slot: BindingSlot) -> Option<BufferId> {
        self.slots[slot.index() as usize]
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn resolve_bindings(&self, program: &CpuProgram) -> Option<Vec<(BindingDesc, BufferId)>> {
        let mut resolved = Vec::with_capacity(program.bindings.len());
        for desc in &program.bindings {
            match self.bound(desc.slot).filter(|id| self.buffers.contains_key(id)) {
                Some(id) => resolved.push((*desc, id)),
                None => {
                    log::error!("Program `{}`: nothing bound at {}", program.label, desc.slot);
                    return None;
                }
            }
        }
        Some(resolved)
    }
}

impl Device for CpuDevice {
    fn create_buffer(&mut self, desc: &BufferDesc) -> BufferId {
        let id = BufferId(self.next());
        self.buffers.insert(
            id,
            CpuBuffer {
                label: desc.label.to_string(),
                usage: desc.usage,
                data: vec![0; desc.size as usize],
            },
        );
        self.commands.push(Command::CreateBuffer {
            id,
            label: desc.label.to_string(),
            size: desc.size,
        });
        id
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if self.buffers.remove(&id).is_none() {
            log::warn!("Destroying unknown buffer {:?}", id);
        }
        for slot in self.slots.iter_mut().filter(|s| **s == Some(id)) {
            *slot = None;
        }
        self.commands.push(Command::DestroyBuffer(id));
    }

    fn upload_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) {
        self.commands.push(Command::Upload {
            id,
            offset,
            len: data.len() as u64,
        });
        let Some(buffer) = self.buffers.get_mut(&id) else {
            log::error!("Upload to unknown buffer {:?}", id);
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if end > buffer.data.len() {
            log::error!("Upload of {} bytes at {} overflows `{}`", data.len(), offset, buffer.label);
            return;
        }
        buffer.data[start..end].copy_from_slice(data);
    }

    fn copy_buffer(&mut self, src: BufferId, src_offset: u64, dst: BufferId, dst_offset: u64, size: u64) {
        self.commands.push(Command::Copy { src, dst, size });
        let (s, d, n) = (src_offset as usize, dst_offset as usize, size as usize);
        let Some(bytes) = self
            .buffers
            .get(&src)
            .and_then(|b| b.data.get(s..s + n))
            .map(|b| b.to_vec())
        else {
            log::error!("Copy source {:?} out of range", src);
            return;
        };
        match self.buffers.get_mut(&dst).and_then(|b| b.data.get_mut(d..d + n)) {
            Some(target) => target.copy_from_slice(&bytes),
            None => log::error!("Copy target {:?} out of range", dst),
        }
    }

    fn bind_buffer(&mut self, slot: BindingSlot, id: BufferId) {
        self.slots[slot.index() as usize] = Some(id);
        self.commands.push(Command::Bind { slot, id });
    }

    fn compile_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderId, DeviceError> {
        if let Some(message) = self.compile_failures.remove(desc.label) {
            return Err(DeviceError::ShaderCompilation {
                label: desc.label.to_string(),
                message,
            });
        }
        if desc.source.trim().is_empty() {
            return Err(DeviceError::ShaderCompilation {
                label: desc.label.to_string(),
                message: "empty source".into(),
            });
        }
        if let Some(pos) = desc.source.find("${") {
            return Err(DeviceError::UnresolvedBinding {
                label: desc.label.to_string(),
                placeholder: desc.source[pos..].chars().take(24).collect(),
            });
        }

        let id = ShaderId(self.next());
        self.shaders.insert(id, desc.source.to_string());
        self.commands.push(Command::CompileShader {
            id,
            label: desc.label.to_string(),
        });
        Ok(id)
    }

    fn destroy_shader(&mut self, id: ShaderId) {
        self.shaders.remove(&id);
        self.commands.push(Command::DestroyShader(id));
    }

    fn link_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, DeviceError> {
        validate_program(desc)?;
        for stage in desc.stages {
            let Some(source) = self.shaders.get(&stage.shader) else {
                return Err(DeviceError::ProgramLink {
                    label: desc.label.to_string(),
                    message: format!("unknown shader {:?}", stage.shader),
                });
            };
            if !source.contains(stage.entry_point) {
                return Err(DeviceError::ProgramLink {
                    label: desc.label.to_string(),
                    message: format!("entry point `{}` not found", stage.entry_point),
                });
            }
        }

        let id = ProgramId(self.next());
        self.programs.insert(
            id,
            CpuProgram {
                label: desc.label.to_string(),
                kind: desc.kind,
                bindings: desc.bindings.to_vec(),
            },
        );
        self.commands.push(Command::LinkProgram {
            id,
            label: desc.label.to_string(),
        });
        log::debug!("Linked CPU program `{}`", desc.label);
        Ok(id)
    }

    fn destroy_program(&mut self, id: ProgramId) {
        self.programs.remove(&id);
        self.commands.push(Command::DestroyProgram(id));
    }

    fn dispatch(&mut self, program: ProgramId, work_items: u32) {
        self.commands.push(Command::Dispatch { program, work_items });

        let Some(prog) = self.programs.get(&program) else {
            log::error!("Dispatch of unknown program {:?}", program);
            return;
        };
        if !matches!(prog.kind, ProgramKind::Compute { .. }) {
            log::error!("Dispatch of render program `{}`", prog.label);
            return;
        }
        let Some(bindings) = self.resolve_bindings(prog) else {
            return;
        };
        let Some(kernel) = self.kernels.get_mut(&prog.label) else {
            log::warn!("No CPU kernel registered for `{}`", prog.label);
            return;
        };

        let mut ctx = KernelContext {
            label: &prog.label,
            buffers: &mut self.buffers,
            bindings,
        };
        kernel(&mut ctx, work_items);
    }

    fn draw(&mut self, program: ProgramId, draw: Draw) {
        self.commands.push(Command::Draw { program, draw });

        let Some(prog) = self.programs.get(&program) else {
            log::error!("Draw with unknown program {:?}", program);
            return;
        };
        match prog.kind {
            ProgramKind::Render { topology } if topology == draw.topology() => {}
            _ => {
                log::error!("Draw {:?} does not match program `{}`", draw, prog.label);
                return;
            }
        }
        let _ = self.resolve_bindings(prog);
    }

    fn memory_barrier(&mut self) {
        self.commands.push(Command::MemoryBarrier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ShaderStage, StageDesc, TessellationLevels, Topology};

    const COMPUTE_SRC: &str = "@compute @workgroup_size(64) fn main() {}";

    fn storage(size: u64) -> BufferDesc<'static> {
        BufferDesc { label: "storage", size, usage: BufferUsage::Storage }
    }

    fn compute_program(device: &mut CpuDevice, label: &str, bindings: &[BindingDesc]) -> ProgramId {
        let shader = device
            .compile_shader(&ShaderDesc { label, source: COMPUTE_SRC })
            .unwrap();
        let stages = [StageDesc { stage: ShaderStage::Compute, shader, entry_point: "main" }];
        device
            .link_program(&ProgramDesc {
                label,
                kind: ProgramKind::Compute { workgroup_size: 64 },
                stages: &stages,
                bindings,
            })
            .unwrap()
    }

    #[test]
    fn test_buffer_upload_and_copy() {
        let mut device = CpuDevice::new();
        let a = device.create_buffer_init(&storage(16), bytemuck::cast_slice(&[1.0f32, 2.0, 3.0, 4.0]));
        let b = device.create_buffer(&storage(16));
        device.copy_buffer(a, 4, b, 0, 8);
        assert_eq!(device.read_buffer_as::<f32>(b), vec![2.0, 3.0, 0.0, 0.0]);

        device.upload_buffer(b, 12, bytemuck::bytes_of(&9.0f32));
        assert_eq!(device.read_buffer_as::<f32>(b)[3], 9.0);
    }

    #[test]
    fn test_overflowing_upload_is_ignored() {
        let mut device = CpuDevice::new();
        let a = device.create_buffer(&storage(4));
        device.upload_buffer(a, 0, &[1u8; 8]);
        assert_eq!(device.read_buffer(a), Some(&[0u8; 4][..]));
    }

    #[test]
    fn test_injected_compile_failure() {
        let mut device = CpuDevice::new();
        device.fail_compile("broken", "line 3: expected `;`");
        let err = device
            .compile_shader(&ShaderDesc { label: "broken", source: COMPUTE_SRC })
            .unwrap_err();
        assert!(err.to_string().contains("expected `;`"));
        // Only the next compilation fails.
        assert!(device.compile_shader(&ShaderDesc { label: "broken", source: COMPUTE_SRC }).is_ok());
    }

    #[test]
    fn test_unresolved_placeholder_fails_compile() {
        let mut device = CpuDevice::new();
        let result = device.compile_shader(&ShaderDesc {
            label: "raw",
            source: "@binding(${POSITIONS}) var<storage> p: array<f32>;",
        });
        assert!(matches!(result, Err(DeviceError::UnresolvedBinding { .. })));
    }

    #[test]
    fn test_missing_entry_point_fails_link() {
        let mut device = CpuDevice::new();
        let shader = device
            .compile_shader(&ShaderDesc { label: "s", source: COMPUTE_SRC })
            .unwrap();
        let stages = [StageDesc { stage: ShaderStage::Compute, shader, entry_point: "simulate" }];
        let result = device.link_program(&ProgramDesc {
            label: "s",
            kind: ProgramKind::Compute { workgroup_size: 64 },
            stages: &stages,
            bindings: &[],
        });
        assert!(matches!(result, Err(DeviceError::ProgramLink { .. })));
    }

    #[test]
    fn test_dispatch_runs_registered_kernel() {
        let mut device = CpuDevice::new();
        device.register_kernel("double", |ctx, n| {
            let mut values: Vec<f32> = ctx.read(BindingSlot::Positions);
            for v in values.iter_mut().take(n as usize) {
                *v *= 2.0;
            }
            ctx.write(BindingSlot::Positions, &values);
        });
        let program = compute_program(&mut device, "double", &[BindingDesc::read_write(BindingSlot::Positions)]);
        let buffer = device.create_buffer_init(&storage(12), bytemuck::cast_slice(&[1.0f32, 2.0, 3.0]));
        device.bind_buffer(BindingSlot::Positions, buffer);
        device.dispatch(program, 2);

        assert_eq!(device.read_buffer_as::<f32>(buffer), vec![2.0, 4.0, 3.0]);
    }

    #[test]
    fn test_kernel_cannot_write_read_only_slot() {
        let mut device = CpuDevice::new();
        device.register_kernel("sneaky", |ctx, _| ctx.write(BindingSlot::RestPositions, &[5.0f32]));
        let program = compute_program(&mut device, "sneaky", &[BindingDesc::read(BindingSlot::RestPositions)]);
        let buffer = device.create_buffer(&storage(4));
        device.bind_buffer(BindingSlot::RestPositions, buffer);
        device.dispatch(program, 1);
        assert_eq!(device.read_buffer_as::<f32>(buffer), vec![0.0]);
    }

    #[test]
    fn test_unbound_slot_skips_kernel() {
        let mut device = CpuDevice::new();
        device.register_kernel("k", |_, _| panic!("kernel must not run"));
        let program = compute_program(&mut device, "k", &[BindingDesc::read(BindingSlot::Debug)]);
        device.dispatch(program, 1);
        assert_eq!(device.commands().last(), Some(&Command::Dispatch { program, work_items: 1 }));
    }

    #[test]
    fn test_destroyed_buffer_is_unbound() {
        let mut device = CpuDevice::new();
        let buffer = device.create_buffer(&storage(4));
        device.bind_buffer(BindingSlot::Debug, buffer);
        device.destroy_buffer(buffer);
        assert_eq!(device.bound(BindingSlot::Debug), None);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_draw_is_recorded() {
        let mut device = CpuDevice::new();
        let shader = device
            .compile_shader(&ShaderDesc { label: "hair", source: "fn vs_main() {} fn fs_main() {}" })
            .unwrap();
        let stages = [
            StageDesc { stage: ShaderStage::Vertex, shader, entry_point: "vs_main" },
            StageDesc { stage: ShaderStage::Fragment, shader, entry_point: "fs_main" },
        ];
        let program = device
            .link_program(&ProgramDesc {
                label: "hair",
                kind: ProgramKind::Render { topology: Topology::Patches },
                stages: &stages,
                bindings: &[],
            })
            .unwrap();
        let draw = Draw::Patches { patch_count: 4, levels: TessellationLevels::new(2, 1) };
        device.draw(program, draw);
        device.memory_barrier();
        assert_eq!(
            &device.commands()[device.commands().len() - 2..],
            &[Command::Draw { program, draw }, Command::MemoryBarrier]
        );
    }
}
