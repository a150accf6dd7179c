//! Constant blocks consumed by the render programs

use bytemuck::{Pod, Zeroable};
use hair_core::HairInstanceSettings;
use hair_math::{Mat4, Vec3, Vec4};

pub const MAX_LIGHTS: usize = 16;

pub const GUIDES_COLOR: Vec4 = Vec4::new(1.0, 0.0, 0.0, 1.0);
pub const GROWTH_MESH_COLOR: Vec4 = Vec4::new(1.0, 1.0, 0.0, 1.0);

/// Hair shape and material.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct HairRenderData {
    pub segments_count: u32,
    pub tessellation_factor: f32,
    pub density: f32,
    pub _padding0: u32,
    pub root_width: f32,
    pub tip_width: f32,
    pub thinning_start: f32,
    pub _padding1: f32,
    pub specular: f32,
    pub diffuse: f32,
    pub ambient: f32,
    pub specular_power: f32,
    pub color: Vec4,
}

impl HairRenderData {
    pub fn new(settings: &HairInstanceSettings, segments_count: u32) -> Self {
        Self {
            segments_count,
            tessellation_factor: settings.tessellation_factor,
            density: settings.density,
            _padding0: 0,
            root_width: settings.root_width,
            tip_width: settings.tip_width,
            thinning_start: settings.thinning_start,
            _padding1: 0.0,
            specular: settings.specular,
            diffuse: settings.diffuse,
            ambient: settings.ambient,
            specular_power: settings.specular_power,
            color: settings.color,
        }
    }
}

/// Camera state shared by every pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SceneRenderData {
    pub view_proj: Mat4,
    pub eye_position: Vec3,
    pub _padding: f32,
}

impl SceneRenderData {
    /// `view` must be rigid; the eye is recovered from its inverse.
    pub fn new(view: &Mat4, proj: &Mat4) -> Self {
        Self {
            view_proj: *proj * *view,
            eye_position: view.euclidean_inverse().cols[3].xyz(),
            _padding: 0.0,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Light {
    pub color: Vec4,
    pub position: Vec3,
    pub _padding: f32,
}

impl Light {
    pub fn new(position: Vec3, color: Vec4) -> Self {
        Self {
            color,
            position,
            _padding: 0.0,
        }
    }
}

impl Default for Light {
    fn default() -> Self {
        Self::new(Vec3::new(5.0, 5.0, 5.0), Vec4::new(1.0, 1.0, 1.0, 1.0))
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightRenderData {
    pub lights: [Light; MAX_LIGHTS],
    pub lights_count: u32,
    pub _padding: [u32; 3],
}

impl LightRenderData {
    /// Keeps at most [`MAX_LIGHTS`] lights.
    pub fn new(lights: &[Light]) -> Self {
        if lights.len() > MAX_LIGHTS {
            log::warn!("{} lights given, only the first {} are used", lights.len(), MAX_LIGHTS);
        }
        let mut data = Self::zeroed();
        for (slot, light) in data.lights.iter_mut().zip(lights) {
            *slot = *light;
        }
        data.lights_count = lights.len().min(MAX_LIGHTS) as u32;
        data
    }
}

impl Default for LightRenderData {
    fn default() -> Self {
        Self::new(&[Light::default()])
    }
}

/// Flat color debug passes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct VisualizationData {
    pub color: Vec4,
    pub segments_count: u32,
    pub _padding: [u32; 3],
}

impl VisualizationData {
    pub fn new(color: Vec4, segments_count: u32) -> Self {
        Self {
            color,
            segments_count,
            _padding: [0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_sizes_match_wgsl() {
        assert_eq!(std::mem::size_of::<HairRenderData>(), 64);
        assert_eq!(std::mem::size_of::<SceneRenderData>(), 80);
        assert_eq!(std::mem::size_of::<Light>(), 32);
        assert_eq!(std::mem::size_of::<LightRenderData>(), 528);
        assert_eq!(std::mem::size_of::<VisualizationData>(), 32);
    }

    #[test]
    fn test_eye_position_from_view() {
        let eye = Vec3::new(1.0, 2.0, 3.0);
        let view = Mat4::look_at(eye, Vec3::ZERO, Vec3::Y);
        let scene = SceneRenderData::new(&view, &Mat4::IDENTITY);
        assert!((scene.eye_position - eye).length() < 1e-5, "{:?}", scene.eye_position);
        assert_eq!(scene.view_proj, view);
    }

    #[test]
    fn test_default_light() {
        let data = LightRenderData::default();
        assert_eq!(data.lights_count, 1);
        assert_eq!(data.lights[0].position, Vec3::new(5.0, 5.0, 5.0));
        assert_eq!(data.lights[0].color, Vec4::new(1.0, 1.0, 1.0, 1.0));
        assert_eq!(data.lights[1], Light::zeroed());
    }

    #[test]
    fn test_lights_are_truncated() {
        let lights = vec![Light::default(); MAX_LIGHTS + 4];
        assert_eq!(LightRenderData::new(&lights).lights_count, MAX_LIGHTS as u32);
        assert_eq!(LightRenderData::new(&[]).lights_count, 0);
    }

    #[test]
    fn test_hair_data_from_settings() {
        let mut settings = HairInstanceSettings::default();
        settings.color = Vec4::new(0.3, 0.2, 0.1, 1.0);
        let data = HairRenderData::new(&settings, 7);
        assert_eq!(data.segments_count, 7);
        assert_eq!((data.density, data.tessellation_factor), (16.0, 1.0));
        assert_eq!((data.root_width, data.tip_width, data.thinning_start), (0.001, 0.0005, 0.5));
        assert_eq!(data.specular_power, 50.0);
        assert_eq!(data.color, settings.color);
    }
}
