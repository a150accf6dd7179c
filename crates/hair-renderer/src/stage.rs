//! Render passes for one hair instance

use crate::{
    HairRenderData, Light, LightRenderData, SceneRenderData, VisualizationData, GROWTH_MESH_COLOR,
    GUIDES_COLOR,
};
use hair_core::{HairAsset, HairInstance, HairInstanceSettings};
use hair_gpu::{
    compose_shader, BindingDesc, BindingSlot, BufferDesc, BufferId, BufferUsage, Device, DeviceError,
    Draw, ProgramDesc, ProgramId, ProgramKind, ShaderDesc, ShaderId, ShaderStage, StageDesc,
    TessellationLevels, Topology,
};
use hair_math::Mat4;

const GUIDES_SHADER: &str = include_str!("shaders/guides.wgsl");
const GROWTH_MESH_SHADER: &str = include_str!("shaders/growth_mesh.wgsl");
const HAIR_SHADER: &str = include_str!("shaders/hair.wgsl");

const GUIDES_BINDINGS: [BindingDesc; 3] = [
    BindingDesc::uniform(BindingSlot::SceneData),
    BindingDesc::uniform(BindingSlot::VisualizationData),
    BindingDesc::read(BindingSlot::Positions),
];

const GROWTH_MESH_BINDINGS: [BindingDesc; 4] = [
    BindingDesc::uniform(BindingSlot::SceneData),
    BindingDesc::uniform(BindingSlot::VisualizationData),
    BindingDesc::read(BindingSlot::Positions),
    BindingDesc::read(BindingSlot::HairIndices),
];

const HAIR_BINDINGS: [BindingDesc; 5] = [
    BindingDesc::uniform(BindingSlot::HairData),
    BindingDesc::uniform(BindingSlot::SceneData),
    BindingDesc::uniform(BindingSlot::LightData),
    BindingDesc::read(BindingSlot::Positions),
    BindingDesc::read(BindingSlot::HairIndices),
];

/// Levels the hair pass tessellates every patch with.
pub fn tessellation_levels(settings: &HairInstanceSettings) -> TessellationLevels {
    TessellationLevels::new(settings.density.round() as u32, settings.tessellation_factor.round() as u32)
}

/// Compiles `source` and links it as a vertex + fragment program. The shader
/// is released again when linking fails.
fn render_program<D: Device>(
    device: &mut D,
    label: &str,
    source: &str,
    topology: Topology,
    bindings: &[BindingDesc],
) -> Result<(ShaderId, ProgramId), DeviceError> {
    let source = compose_shader(label, source)?;
    let shader = device.compile_shader(&ShaderDesc { label, source: &source })?;
    let program = device.link_program(&ProgramDesc {
        label,
        kind: ProgramKind::Render { topology },
        stages: &[
            StageDesc {
                stage: ShaderStage::Vertex,
                shader,
                entry_point: "vs_main",
            },
            StageDesc {
                stage: ShaderStage::Fragment,
                shader,
                entry_point: "fs_main",
            },
        ],
        bindings,
    });
    match program {
        Ok(program) => {
            log::debug!("Created render program `{}`", label);
            Ok((shader, program))
        }
        Err(e) => {
            device.destroy_shader(shader);
            Err(e)
        }
    }
}

fn uniform_buffer<D: Device>(device: &mut D, label: &str, size: usize) -> BufferId {
    device.create_buffer(&BufferDesc {
        label,
        size: size as u64,
        usage: BufferUsage::Uniform,
    })
}

pub struct RenderStage {
    programs: Vec<(ShaderId, ProgramId)>,
    guides: ProgramId,
    growth_mesh: ProgramId,
    hair: ProgramId,

    hair_data: BufferId,
    scene_data: BufferId,
    light_data: BufferId,
    guides_data: BufferId,
    growth_mesh_data: BufferId,

    lights: LightRenderData,
}

impl RenderStage {
    pub fn new<D: Device>(device: &mut D) -> Result<Self, DeviceError> {
        let specs: [(&str, &str, Topology, &[BindingDesc]); 3] = [
            ("guides.wgsl", GUIDES_SHADER, Topology::Lines, &GUIDES_BINDINGS),
            ("growth_mesh.wgsl", GROWTH_MESH_SHADER, Topology::Lines, &GROWTH_MESH_BINDINGS),
            ("hair.wgsl", HAIR_SHADER, Topology::Patches, &HAIR_BINDINGS),
        ];

        let mut programs = Vec::with_capacity(specs.len());
        for (label, source, topology, bindings) in specs {
            match render_program(device, label, source, topology, bindings) {
                Ok(pair) => programs.push(pair),
                Err(e) => {
                    for (shader, program) in programs {
                        device.destroy_program(program);
                        device.destroy_shader(shader);
                    }
                    return Err(e);
                }
            }
        }

        let stage = Self {
            guides: programs[0].1,
            growth_mesh: programs[1].1,
            hair: programs[2].1,
            programs,
            hair_data: uniform_buffer(device, "Hair Data Buffer", std::mem::size_of::<HairRenderData>()),
            scene_data: uniform_buffer(device, "Scene Data Buffer", std::mem::size_of::<SceneRenderData>()),
            light_data: uniform_buffer(device, "Light Data Buffer", std::mem::size_of::<LightRenderData>()),
            guides_data: uniform_buffer(device, "Guides Data Buffer", std::mem::size_of::<VisualizationData>()),
            growth_mesh_data: uniform_buffer(
                device,
                "Growth Mesh Data Buffer",
                std::mem::size_of::<VisualizationData>(),
            ),
            lights: LightRenderData::default(),
        };
        log::info!("Render stage ready");
        Ok(stage)
    }

    /// Replaces the scene lights, at most [`crate::MAX_LIGHTS`] are kept.
    pub fn set_lights(&mut self, lights: &[Light]) {
        self.lights = LightRenderData::new(lights);
    }

    pub fn lights(&self) -> &LightRenderData {
        &self.lights
    }

    /// Issues every enabled pass for `instance`. Reads positions only.
    pub fn render<D: Device>(&self, device: &mut D, asset: &HairAsset, instance: &HairInstance, view: &Mat4, proj: &Mat4) {
        let settings = &instance.settings;
        let scene = SceneRenderData::new(view, proj);
        device.upload_buffer(self.scene_data, 0, bytemuck::bytes_of(&scene));

        if settings.visualize_guides {
            self.draw_guides(device, asset, instance);
        }
        if settings.visualize_growth_mesh {
            self.draw_growth_mesh(device, asset, instance);
        }
        if settings.render_hair {
            self.draw_hair(device, asset, instance);
        }
    }

    fn draw_guides<D: Device>(&self, device: &mut D, asset: &HairAsset, instance: &HairInstance) {
        let vertex_count = asset.guides_count * asset.segments_count * 2;
        if vertex_count == 0 {
            return;
        }
        let data = VisualizationData::new(GUIDES_COLOR, asset.segments_count);
        device.upload_buffer(self.guides_data, 0, bytemuck::bytes_of(&data));

        device.bind_buffer(BindingSlot::SceneData, self.scene_data);
        device.bind_buffer(BindingSlot::VisualizationData, self.guides_data);
        device.bind_buffer(BindingSlot::Positions, instance.positions);
        device.draw(self.guides, Draw::Lines { vertex_count });
    }

    fn draw_growth_mesh<D: Device>(&self, device: &mut D, asset: &HairAsset, instance: &HairInstance) {
        let vertex_count = asset.triangles_count * 6;
        if vertex_count == 0 {
            return;
        }
        let data = VisualizationData::new(GROWTH_MESH_COLOR, asset.segments_count);
        device.upload_buffer(self.growth_mesh_data, 0, bytemuck::bytes_of(&data));

        device.bind_buffer(BindingSlot::SceneData, self.scene_data);
        device.bind_buffer(BindingSlot::VisualizationData, self.growth_mesh_data);
        device.bind_buffer(BindingSlot::Positions, instance.positions);
        device.bind_buffer(BindingSlot::HairIndices, asset.hair_indices);
        device.draw(self.growth_mesh, Draw::Lines { vertex_count });
    }

    fn draw_hair<D: Device>(&self, device: &mut D, asset: &HairAsset, instance: &HairInstance) {
        let patch_count = asset.triangles_count * asset.segments_count;
        if patch_count == 0 {
            return;
        }
        let data = HairRenderData::new(&instance.settings, asset.segments_count);
        device.upload_buffer(self.hair_data, 0, bytemuck::bytes_of(&data));
        device.upload_buffer(self.light_data, 0, bytemuck::bytes_of(&self.lights));

        device.bind_buffer(BindingSlot::HairData, self.hair_data);
        device.bind_buffer(BindingSlot::SceneData, self.scene_data);
        device.bind_buffer(BindingSlot::LightData, self.light_data);
        device.bind_buffer(BindingSlot::Positions, instance.positions);
        device.bind_buffer(BindingSlot::HairIndices, asset.hair_indices);
        device.draw(
            self.hair,
            Draw::Patches {
                patch_count,
                levels: tessellation_levels(&instance.settings),
            },
        );
    }

    pub fn destroy<D: Device>(self, device: &mut D) {
        for (shader, program) in self.programs {
            device.destroy_program(program);
            device.destroy_shader(shader);
        }
        for buffer in [
            self.hair_data,
            self.scene_data,
            self.light_data,
            self.guides_data,
            self.growth_mesh_data,
        ] {
            device.destroy_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hair_core::HairAssetData;
    use hair_gpu::{Command, CpuDevice};
    use hair_math::{Vec3, Vec4};

    fn setup() -> (CpuDevice, RenderStage, HairAsset, HairInstance) {
        let mut device = CpuDevice::new();
        let stage = RenderStage::new(&mut device).unwrap();
        let data = HairAssetData::from_strands(
            &[
                vec![Vec3::ZERO, Vec3::Y, Vec3::new(0.0, 2.0, 0.0)],
                vec![Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::new(1.0, 2.0, 0.0)],
                vec![Vec3::Z, Vec3::new(0.0, 1.0, 1.0), Vec3::new(0.0, 2.0, 1.0)],
            ],
            &[[0, 1, 2]],
        )
        .unwrap();
        let asset = HairAsset::upload(&mut device, &data);
        let instance = HairInstance::create(&mut device, &asset);
        device.clear_commands();
        (device, stage, asset, instance)
    }

    fn draws(device: &CpuDevice) -> Vec<(ProgramId, Draw)> {
        device
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::Draw { program, draw } => Some((*program, *draw)),
                _ => None,
            })
            .collect()
    }

    fn view() -> Mat4 {
        Mat4::look_at(Vec3::new(0.0, 1.0, 4.0), Vec3::new(0.0, 1.0, 0.0), Vec3::Y)
    }

    #[test]
    fn test_shaders_declare_their_bindings() {
        let sources: [(&str, &[BindingDesc]); 3] = [
            (GUIDES_SHADER, &GUIDES_BINDINGS),
            (GROWTH_MESH_SHADER, &GROWTH_MESH_BINDINGS),
            (HAIR_SHADER, &HAIR_BINDINGS),
        ];
        for (source, bindings) in sources {
            let composed = compose_shader("test", source).unwrap();
            for binding in bindings {
                assert!(composed.contains(&format!("@binding({})", binding.slot.index())));
            }
            assert!(composed.contains("fn vs_main(") && composed.contains("fn fs_main("));
        }
    }

    #[test]
    fn test_default_settings_draw_hair_only() {
        let (mut device, stage, asset, instance) = setup();
        stage.render(&mut device, &asset, &instance, &view(), &Mat4::IDENTITY);

        let draws = draws(&device);
        assert_eq!(
            draws,
            vec![(
                stage.hair,
                Draw::Patches {
                    patch_count: 2,
                    levels: TessellationLevels::new(16, 1),
                }
            )]
        );
        assert_eq!(device.bound(BindingSlot::HairData), Some(stage.hair_data));
        assert_eq!(device.bound(BindingSlot::LightData), Some(stage.light_data));
        assert_eq!(device.bound(BindingSlot::HairIndices), Some(asset.hair_indices));
    }

    #[test]
    fn test_all_passes_in_order() {
        let (mut device, stage, asset, mut instance) = setup();
        instance.settings.visualize_guides = true;
        instance.settings.visualize_growth_mesh = true;
        stage.render(&mut device, &asset, &instance, &view(), &Mat4::IDENTITY);

        let draws = draws(&device);
        assert_eq!(draws.len(), 3);
        assert_eq!(draws[0], (stage.guides, Draw::Lines { vertex_count: 3 * 2 * 2 }));
        assert_eq!(draws[1], (stage.growth_mesh, Draw::Lines { vertex_count: 6 }));
        assert_eq!(draws[2].0, stage.hair);

        let guides = device.read_buffer_as::<VisualizationData>(stage.guides_data);
        assert_eq!(guides[0].color, GUIDES_COLOR);
        assert_eq!(guides[0].segments_count, 2);
        let mesh = device.read_buffer_as::<VisualizationData>(stage.growth_mesh_data);
        assert_eq!(mesh[0].color, GROWTH_MESH_COLOR);
    }

    #[test]
    fn test_everything_disabled_draws_nothing() {
        let (mut device, stage, asset, mut instance) = setup();
        instance.settings.render_hair = false;
        stage.render(&mut device, &asset, &instance, &view(), &Mat4::IDENTITY);
        assert!(draws(&device).is_empty());
    }

    #[test]
    fn test_blocks_are_populated_before_draw() {
        let (mut device, stage, asset, mut instance) = setup();
        instance.settings.color = Vec4::new(0.4, 0.3, 0.2, 1.0);
        instance.settings.density = 3.0;
        let proj = Mat4::perspective(1.0, 1.5, 0.01, 100.0);
        stage.render(&mut device, &asset, &instance, &view(), &proj);

        let commands = device.commands();
        let draw_at = commands.iter().position(|c| matches!(c, Command::Draw { .. })).unwrap();
        for buffer in [stage.scene_data, stage.hair_data, stage.light_data] {
            let upload_at = commands
                .iter()
                .position(|c| matches!(c, Command::Upload { id, .. } if *id == buffer))
                .unwrap();
            assert!(upload_at < draw_at);
        }

        let scene = device.read_buffer_as::<SceneRenderData>(stage.scene_data)[0];
        assert_eq!(scene.view_proj, proj * view());
        assert!((scene.eye_position - Vec3::new(0.0, 1.0, 4.0)).length() < 1e-5);
        let hair = device.read_buffer_as::<HairRenderData>(stage.hair_data)[0];
        assert_eq!(hair.color, instance.settings.color);
        assert_eq!(hair.segments_count, 2);
        let lights = device.read_buffer_as::<LightRenderData>(stage.light_data)[0];
        assert_eq!(lights, LightRenderData::default());
    }

    #[test]
    fn test_render_does_not_touch_positions() {
        let (mut device, stage, asset, mut instance) = setup();
        instance.settings.visualize_guides = true;
        let before = device.read_buffer_as::<Vec4>(instance.positions);
        stage.render(&mut device, &asset, &instance, &view(), &Mat4::IDENTITY);
        assert_eq!(device.read_buffer_as::<Vec4>(instance.positions), before);
        assert!(!device
            .commands()
            .iter()
            .any(|c| matches!(c, Command::Upload { id, .. } | Command::Copy { dst: id, .. } if *id == instance.positions)));
    }

    #[test]
    fn test_tessellation_levels_round_and_clamp() {
        let mut settings = HairInstanceSettings::default();
        assert_eq!(tessellation_levels(&settings), TessellationLevels::new(16, 1));
        settings.density = 100.0;
        settings.tessellation_factor = 2.6;
        assert_eq!(tessellation_levels(&settings), TessellationLevels { strands: 64, subdivisions: 3 });
        settings.density = -4.0;
        settings.tessellation_factor = 0.2;
        assert_eq!(tessellation_levels(&settings), TessellationLevels { strands: 1, subdivisions: 1 });
    }

    #[test]
    fn test_set_lights() {
        let (_, mut stage, _, _) = setup();
        stage.set_lights(&[Light::new(Vec3::Y, Vec4::new(0.5, 0.5, 0.5, 1.0)), Light::default()]);
        assert_eq!(stage.lights().lights_count, 2);
        assert_eq!(stage.lights().lights[0].position, Vec3::Y);
    }

    #[test]
    fn test_failed_program_rolls_back() {
        let mut device = CpuDevice::new();
        device.fail_compile("hair.wgsl", "syntax error");
        let err = RenderStage::new(&mut device).err();
        match err {
            Some(DeviceError::ShaderCompilation { label, message }) => {
                assert_eq!(label, "hair.wgsl");
                assert_eq!(message, "syntax error");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(device.live_programs(), 0);
        assert_eq!(device.live_shaders(), 0);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let mut device = CpuDevice::new();
        let stage = RenderStage::new(&mut device).unwrap();
        assert_eq!(device.live_programs(), 3);
        stage.destroy(&mut device);
        assert_eq!(device.live_programs(), 0);
        assert_eq!(device.live_shaders(), 0);
        assert_eq!(device.live_buffers(), 0);
    }
}
