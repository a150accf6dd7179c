//! Per-instance settings

use hair_math::{Mat4, Vec3, Vec4};

/// Everything a caller can tune on one hair instance.
///
/// Replaced wholesale by `update_instance_settings`; fields are never merged.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HairInstanceSettings {
    // Global
    pub visualize_guides: bool,
    pub visualize_growth_mesh: bool,
    pub render_hair: bool,
    pub model_matrix: Mat4,
    pub tessellation_factor: f32,
    pub density: f32,

    // Shape
    pub root_width: f32,
    pub tip_width: f32,
    /// Fraction of strand length after which the width starts tapering.
    pub thinning_start: f32,

    // Material
    pub specular: f32,
    pub diffuse: f32,
    pub ambient: f32,
    pub specular_power: f32,
    pub color: Vec4,

    // Simulation
    pub global_stiffness: f32,
    pub local_stiffness: f32,
    pub damping: f32,
    /// World-space wind, magnitude is the strength.
    pub wind: Vec3,
}

impl Default for HairInstanceSettings {
    fn default() -> Self {
        Self {
            visualize_guides: false,
            visualize_growth_mesh: false,
            render_hair: true,
            model_matrix: Mat4::IDENTITY,
            tessellation_factor: 1.0,
            density: 16.0,

            root_width: 0.001,
            tip_width: 0.0005,
            thinning_start: 0.5,

            specular: 0.5,
            diffuse: 0.5,
            ambient: 0.5,
            specular_power: 50.0,
            color: Vec4::new(0.0, 0.0, 0.0, 1.0),

            global_stiffness: 0.0,
            local_stiffness: 1.0,
            damping: 0.0,
            wind: Vec3::ZERO,
        }
    }
}
