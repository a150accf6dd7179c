//! Compute stage driving one simulation step per instance

use crate::{SimulationParams, SIMULATION_PROGRAM};
use hair_core::{HairAsset, HairInstance};
use hair_gpu::{
    compose_shader, BindingDesc, BindingSlot, BufferDesc, BufferId, BufferUsage, Device, DeviceError,
    ProgramDesc, ProgramId, ProgramKind, ShaderDesc, ShaderId, ShaderStage, StageDesc,
};

pub const WORKGROUP_SIZE: u32 = 64;

const SIMULATION_SHADER: &str = include_str!("shaders/simulation.wgsl");

const BINDINGS: [BindingDesc; 8] = [
    BindingDesc::uniform(BindingSlot::SimulationData),
    BindingDesc::read_write(BindingSlot::Positions),
    BindingDesc::read_write(BindingSlot::PreviousPositions),
    BindingDesc::read(BindingSlot::RestPositions),
    BindingDesc::read(BindingSlot::TangentsDistances),
    BindingDesc::read(BindingSlot::RefVectors),
    BindingDesc::read(BindingSlot::GlobalRotations),
    BindingDesc::read_write(BindingSlot::Debug),
];

pub struct SimulationStage {
    shader: ShaderId,
    program: ProgramId,
    params_buffer: BufferId,
}

impl SimulationStage {
    pub fn new<D: Device>(device: &mut D) -> Result<Self, DeviceError> {
        let source = compose_shader("simulation.wgsl", SIMULATION_SHADER)?;
        let shader = device.compile_shader(&ShaderDesc {
            label: "simulation.wgsl",
            source: &source,
        })?;
        let program = match device.link_program(&ProgramDesc {
            label: SIMULATION_PROGRAM,
            kind: ProgramKind::Compute {
                workgroup_size: WORKGROUP_SIZE,
            },
            stages: &[StageDesc {
                stage: ShaderStage::Compute,
                shader,
                entry_point: "simulate",
            }],
            bindings: &BINDINGS,
        }) {
            Ok(program) => program,
            Err(e) => {
                device.destroy_shader(shader);
                return Err(e);
            }
        };
        let params_buffer = device.create_buffer(&BufferDesc {
            label: "Simulation Params Buffer",
            size: std::mem::size_of::<SimulationParams>() as u64,
            usage: BufferUsage::Uniform,
        });

        log::info!("Simulation stage ready");
        Ok(Self {
            shader,
            program,
            params_buffer,
        })
    }

    /// Advances `instance` by `time_step` seconds and bumps its frame counter.
    pub fn simulate<D: Device>(&self, device: &mut D, asset: &HairAsset, instance: &mut HairInstance, time_step: f32) {
        let params = SimulationParams::new(
            &instance.settings,
            asset.guides_count,
            asset.vertices_per_strand(),
            time_step,
            instance.frame,
        );
        device.upload_buffer(self.params_buffer, 0, bytemuck::bytes_of(&params));

        device.bind_buffer(BindingSlot::SimulationData, self.params_buffer);
        device.bind_buffer(BindingSlot::Positions, instance.positions);
        device.bind_buffer(BindingSlot::PreviousPositions, instance.previous_positions);
        device.bind_buffer(BindingSlot::RestPositions, asset.rest_positions);
        device.bind_buffer(BindingSlot::TangentsDistances, asset.tangents_distances);
        device.bind_buffer(BindingSlot::RefVectors, asset.ref_vectors);
        device.bind_buffer(BindingSlot::GlobalRotations, asset.global_rotations);
        device.bind_buffer(BindingSlot::Debug, asset.debug);

        device.dispatch(self.program, asset.guides_count);
        device.memory_barrier();
        instance.frame = instance.frame.wrapping_add(1);
    }

    pub fn destroy<D: Device>(self, device: &mut D) {
        device.destroy_program(self.program);
        device.destroy_shader(self.shader);
        device.destroy_buffer(self.params_buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register_cpu_kernel;
    use hair_core::HairAssetData;
    use hair_gpu::{Access, Command, CpuDevice};
    use hair_math::{Vec3, Vec4};

    fn data() -> HairAssetData {
        HairAssetData::from_strands(
            &[
                vec![Vec3::ZERO, Vec3::new(0.1, 0.0, 0.0), Vec3::new(0.2, 0.0, 0.0)],
                vec![Vec3::Z, Vec3::new(0.1, 0.0, 1.0), Vec3::new(0.2, 0.0, 1.0)],
            ],
            &[],
        )
        .unwrap()
    }

    fn setup() -> (CpuDevice, SimulationStage, HairAsset, HairInstance) {
        let mut device = CpuDevice::new();
        register_cpu_kernel(&mut device);
        let stage = SimulationStage::new(&mut device).unwrap();
        let asset = HairAsset::upload(&mut device, &data());
        let instance = HairInstance::create(&mut device, &asset);
        (device, stage, asset, instance)
    }

    #[test]
    fn test_shader_declares_every_binding() {
        let source = compose_shader("simulation.wgsl", SIMULATION_SHADER).unwrap();
        for binding in BINDINGS {
            let decl = format!("@binding({})", binding.slot.index());
            assert!(source.contains(&decl), "missing {}", binding.slot);
        }
        assert!(source.contains("fn simulate("));
        assert_eq!(BINDINGS.iter().filter(|b| b.access == Access::Uniform).count(), 1);
    }

    #[test]
    fn test_simulate_dispatches_per_guide() {
        let (mut device, stage, asset, mut instance) = setup();
        device.clear_commands();
        stage.simulate(&mut device, &asset, &mut instance, 1.0 / 60.0);

        let commands = device.commands();
        let dispatch = commands.iter().position(|c| matches!(c, Command::Dispatch { work_items: 2, .. }));
        let barrier = commands.iter().position(|c| *c == Command::MemoryBarrier);
        assert!(matches!((dispatch, barrier), (Some(d), Some(b)) if d < b), "{commands:?}");
        assert_eq!(device.bound(BindingSlot::Positions), Some(instance.positions));
        assert_eq!(device.bound(BindingSlot::Debug), Some(asset.debug));
        assert_eq!(instance.frame, 1);

        stage.simulate(&mut device, &asset, &mut instance, 1.0 / 60.0);
        assert_eq!(instance.frame, 2);
    }

    #[test]
    fn test_simulate_moves_tips_and_pins_roots() {
        let (mut device, stage, asset, mut instance) = setup();
        instance.settings.local_stiffness = 0.0;
        for _ in 0..5 {
            stage.simulate(&mut device, &asset, &mut instance, 1.0 / 60.0);
        }

        let positions = device.read_buffer_as::<Vec4>(instance.positions);
        assert_eq!(positions[0], Vec4::new(0.0, 0.0, 0.0, 0.0));
        assert_eq!(positions[3], Vec4::new(0.0, 0.0, 1.0, 0.0));
        assert!(positions[2].y < 0.0);
        assert!(positions[5].y < 0.0);
        let frames = device.read_buffer_as::<hair_math::Quat>(asset.debug);
        assert!(frames.iter().all(|q| (q.length_squared() - 1.0).abs() < 1e-3));
    }

    #[test]
    fn test_zero_time_step_holds_rest_pose() {
        let (mut device, stage, asset, mut instance) = setup();
        let rest = device.read_buffer_as::<Vec4>(asset.rest_positions);
        for _ in 0..3 {
            stage.simulate(&mut device, &asset, &mut instance, 0.0);
        }
        let positions = device.read_buffer_as::<Vec4>(instance.positions);
        for (p, r) in positions.iter().zip(&rest) {
            assert!((p.xyz() - r.xyz()).length() < 1e-5);
        }
        assert_eq!(positions[0], rest[0]);
    }

    #[test]
    fn test_compile_failure_is_reported() {
        let mut device = CpuDevice::new();
        device.fail_compile("simulation.wgsl", "boom");
        let err = SimulationStage::new(&mut device).err();
        assert!(matches!(err, Some(DeviceError::ShaderCompilation { .. })));
        assert_eq!(device.live_shaders(), 0);
        assert_eq!(device.live_programs(), 0);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let mut device = CpuDevice::new();
        let stage = SimulationStage::new(&mut device).unwrap();
        stage.destroy(&mut device);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_programs(), 0);
        assert_eq!(device.live_shaders(), 0);
    }
}
