//! Hair viewer
//!
//! Loads a hair asset (or grows a synthetic patch), simulates it at a fixed
//! step and renders it with an orbit camera.

use anyhow::{anyhow, Context};
use hair_gpu::WgpuDevice;
use hair_math::{Mat4, Vec3, Vec4, DEG_TO_RAD};
use hairgl::{HairAssetData, HairInstanceSettings, HairSystem, InstanceId};
use orbit_camera::{OrbitCamera, PointerState};
use rand::Rng;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

const TIME_STEP: f32 = 1.0 / 60.0;
const WIND_STRENGTHS: [f32; 4] = [0.0, 2.0, 6.0, 15.0];
const FOV_Y: f32 = 45.0 * DEG_TO_RAD;

const GRID_SIZE: usize = 16;
const GRID_SPACING: f32 = 0.01;
const SEGMENTS: usize = 16;
const STRAND_LENGTH: f32 = 0.2;

/// Square patch of roots on the XZ plane with strands growing up and outward.
fn synthetic_asset() -> anyhow::Result<HairAssetData> {
    let mut rng = rand::rng();
    let half = (GRID_SIZE - 1) as f32 * GRID_SPACING * 0.5;
    let segment_length = STRAND_LENGTH / SEGMENTS as f32;

    let mut strands = Vec::with_capacity(GRID_SIZE * GRID_SIZE);
    for row in 0..GRID_SIZE {
        for col in 0..GRID_SIZE {
            let root = Vec3::new(
                col as f32 * GRID_SPACING - half,
                0.0,
                row as f32 * GRID_SPACING - half,
            );
            let spread = Vec3::new(root.x, 0.0, root.z) * 4.0;
            let jitter = Vec3::new(rng.random_range(-0.2..0.2), 0.0, rng.random_range(-0.2..0.2));
            let direction = (Vec3::Y + spread + jitter).normalize();

            let strand: Vec<Vec3> = (0..=SEGMENTS)
                .map(|k| root + direction * (k as f32 * segment_length))
                .collect();
            strands.push(strand);
        }
    }

    let mut triangles = Vec::with_capacity((GRID_SIZE - 1) * (GRID_SIZE - 1) * 2);
    for row in 0..GRID_SIZE - 1 {
        for col in 0..GRID_SIZE - 1 {
            let i = (row * GRID_SIZE + col) as u32;
            let below = i + GRID_SIZE as u32;
            triangles.push([i, i + 1, below]);
            triangles.push([i + 1, below + 1, below]);
        }
    }

    let data = HairAssetData::from_strands(&strands, &triangles)?;
    log::info!(
        "Generated synthetic asset: {} guides, {} segments, {} triangles",
        data.guides_count,
        data.segments_count,
        data.triangles_count()
    );
    Ok(data)
}

struct GpuState {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    depth: wgpu::TextureView,

    system: HairSystem<WgpuDevice>,
    instance: InstanceId,
    camera: OrbitCamera,
    wind_index: usize,
}

impl GpuState {
    async fn new(window: Arc<Window>, asset_path: Option<&str>) -> anyhow::Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;

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
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow!("surface reports no formats"))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoNoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let device = WgpuDevice::new(device, queue, surface_format);
        let depth = device.create_depth_texture(config.width, config.height);
        let mut system = HairSystem::new(device)?;

        let asset = match asset_path {
            Some(path) => system
                .load_asset(path)
                .with_context(|| format!("loading {path}"))?,
            None => system.load_asset_from_data(&synthetic_asset()?),
        };
        let instance = system.create_instance(asset)?;
        let settings = HairInstanceSettings {
            color: Vec4::new(0.35, 0.2, 0.1, 1.0),
            local_stiffness: 0.8,
            damping: 0.02,
            ..Default::default()
        };
        system.update_instance_settings(instance, settings);

        Ok(Self {
            surface,
            config,
            depth,
            system,
            instance,
            camera: OrbitCamera::new(Vec3::new(0.0, 0.08, 0.0), 0.5),
            wind_index: 0,
        })
    }

    fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            let device = self.system.device();
            self.surface.configure(device.device(), &self.config);
            self.depth = device.create_depth_texture(new_size.width, new_size.height);
        }
    }

    fn toggle(&mut self, apply: impl FnOnce(&mut HairInstanceSettings)) {
        let Some(settings) = self.system.instance_settings(self.instance) else {
            return;
        };
        let mut settings = *settings;
        apply(&mut settings);
        self.system.update_instance_settings(self.instance, settings);
    }

    fn cycle_wind(&mut self) {
        self.wind_index = (self.wind_index + 1) % WIND_STRENGTHS.len();
        let strength = WIND_STRENGTHS[self.wind_index];
        log::info!("Wind strength: {}", strength);
        self.toggle(|s| s.wind = Vec3::new(1.0, 0.0, 0.3).normalize() * strength);
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        self.system.simulate(self.instance, TIME_STEP);

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let aspect = self.config.width as f32 / self.config.height as f32;
        let proj = Mat4::perspective(FOV_Y, aspect, 0.01, 100.0);

        let device = self.system.device_mut();
        device.begin_frame(view, self.depth.clone());
        device.clear(wgpu::Color {
            r: 0.08,
            g: 0.08,
            b: 0.1,
            a: 1.0,
        });
        self.system.render(self.instance, &self.camera.view_matrix(), &proj);
        self.system.device_mut().end_frame();

        output.present();
        Ok(())
    }
}

#[derive(Default)]
struct App {
    asset_path: Option<String>,
    window: Option<Arc<Window>>,
    gpu_state: Option<GpuState>,
    pointer: PointerState,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let window_attributes = Window::default_attributes()
            .with_title("Hair")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        match pollster::block_on(GpuState::new(window, self.asset_path.as_deref())) {
            Ok(state) => self.gpu_state = Some(state),
            Err(e) => {
                log::error!("{:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(gpu_state) = &mut self.gpu_state else {
            return;
        };

        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        ..
                    },
                ..
            } => event_loop.exit(),

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match code {
                KeyCode::KeyG => gpu_state.toggle(|s| s.visualize_guides = !s.visualize_guides),
                KeyCode::KeyM => gpu_state.toggle(|s| s.visualize_growth_mesh = !s.visualize_growth_mesh),
                KeyCode::KeyH => gpu_state.toggle(|s| s.render_hair = !s.render_hair),
                KeyCode::KeyW => gpu_state.cycle_wind(),
                _ => {}
            },

            WindowEvent::Resized(physical_size) => gpu_state.resize(physical_size),

            WindowEvent::CursorMoved { position, .. } => {
                self.pointer.x = position.x as f32;
                self.pointer.y = position.y as f32;
            }

            WindowEvent::MouseInput { state, button, .. } => {
                let pressed = state == ElementState::Pressed;
                match button {
                    MouseButton::Right => self.pointer.secondary = pressed,
                    MouseButton::Middle => self.pointer.tertiary = pressed,
                    _ => {}
                }
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 20.0,
                };
                gpu_state.camera.on_scroll(lines);
            }

            WindowEvent::RedrawRequested => {
                gpu_state.camera.update(&self.pointer);
                match gpu_state.render() {
                    Ok(()) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = winit::dpi::PhysicalSize::new(gpu_state.config.width, gpu_state.config.height);
                        gpu_state.resize(size);
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => event_loop.exit(),
                    Err(e) => log::warn!("Render error: {:?}", e),
                }
            }

            _ => {}
        }

        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = self.gpu_state.take() {
            state.system.destroy();
        }
    }
}

fn main() -> anyhow::Result<()> {
    // RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut app = App {
        asset_path: std::env::args().nth(1),
        ..Default::default()
    };
    match &app.asset_path {
        Some(path) => log::info!("Starting hair viewer on {}", path),
        None => log::info!("Starting hair viewer on a synthetic asset"),
    }

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    event_loop.run_app(&mut app)?;
    Ok(())
}
