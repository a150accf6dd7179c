//! Simulation constants and the per-step uniform block

use bytemuck::{Pod, Zeroable};
use hair_core::HairInstanceSettings;
use hair_math::{Mat3, Mat4, Quat, Vec3, Vec4, DEG_TO_RAD};

pub const GRAVITY: Vec3 = Vec3::new(0.0, -9.8, 0.0);
pub const LENGTH_CONSTRAINT_ITERATIONS: u32 = 5;
pub const LOCAL_SHAPE_ITERATIONS: u32 = 10;
pub const MAX_LOCAL_STIFFNESS: f32 = 0.95;
/// Half angle of the cone the four wind directions are spread over.
pub const WIND_CONE_HALF_ANGLE: f32 = 20.0 * DEG_TO_RAD;
/// Wind directions closer than this (radians) to +X skip the alignment rotation.
pub const WIND_ALIGN_EPSILON: f32 = 0.001;
/// Strands are laid out on a grid of this width when blending the wind corners.
pub const WIND_GRID: u32 = 20;

/// Stiffness actually applied by the local shape passes. Values above
/// [`MAX_LOCAL_STIFFNESS`] make the iteration unstable.
pub fn effective_local_stiffness(local_stiffness: f32) -> f32 {
    local_stiffness.min(MAX_LOCAL_STIFFNESS) * 0.5
}

/// Four wind vectors spread around `wind` on a cone, each with the magnitude
/// of `wind`. A zero wind gives four zero vectors.
pub fn wind_pyramid(wind: Vec3) -> [Vec4; 4] {
    let magnitude = wind.length();
    if magnitude <= 0.0 {
        return [Vec4::ZERO; 4];
    }
    let dir = wind / magnitude;
    let axis = Vec3::X.cross(dir);
    let sin = axis.length();
    let angle = sin.atan2(Vec3::X.dot(dir));

    let align = if angle.abs() <= WIND_ALIGN_EPSILON {
        Quat::IDENTITY
    } else if sin > f32::EPSILON {
        Quat::from_axis_angle(axis / sin, angle)
    } else {
        // Blowing along -X, any perpendicular axis works.
        Quat::from_axis_angle(Vec3::Y, angle)
    };

    [Vec3::Y, -Vec3::Y, Vec3::Z, -Vec3::Z].map(|cone_axis| {
        let corner = align * Quat::from_axis_angle(cone_axis, WIND_CONE_HALF_ANGLE);
        (corner * Vec3::X * magnitude).extend(0.0)
    })
}

/// Rotation part of a rigid model matrix. Column lengths are divided out so a
/// uniform scale does not leak into the quaternion.
pub fn model_rotation(model: &Mat4) -> Quat {
    let m = model.upper_left();
    let unit = |c: Vec3| if c.length_squared() > 0.0 { c.normalize() } else { c };
    let m = Mat3::from_cols(unit(m.cols[0]), unit(m.cols[1]), unit(m.cols[2]));
    Quat::from_rotation_matrix(&m).normalize()
}

/// Uniform block consumed by one simulation dispatch, laid out like the WGSL
/// `SimulationParams` struct.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SimulationParams {
    pub model: Mat4,
    pub model_rotation: Quat,
    pub wind_pyramid: [Vec4; 4],
    pub gravity: Vec4,
    pub vertices_per_strand: u32,
    pub strand_count: u32,
    pub time_step: f32,
    pub global_stiffness: f32,
    /// Already passed through [`effective_local_stiffness`].
    pub local_stiffness: f32,
    pub damping: f32,
    pub length_iterations: u32,
    pub shape_iterations: u32,
    pub frame: u32,
    pub _padding: [u32; 3],
}

impl SimulationParams {
    pub fn new(
        settings: &HairInstanceSettings,
        strand_count: u32,
        vertices_per_strand: u32,
        time_step: f32,
        frame: u32,
    ) -> Self {
        Self {
            model: settings.model_matrix,
            model_rotation: model_rotation(&settings.model_matrix),
            wind_pyramid: wind_pyramid(settings.wind),
            gravity: GRAVITY.extend(0.0),
            vertices_per_strand,
            strand_count,
            time_step,
            global_stiffness: settings.global_stiffness.clamp(0.0, 1.0),
            local_stiffness: effective_local_stiffness(settings.local_stiffness),
            damping: settings.damping,
            length_iterations: LENGTH_CONSTRAINT_ITERATIONS,
            shape_iterations: LOCAL_SHAPE_ITERATIONS,
            frame,
            _padding: [0; 3],
        }
    }

    /// Wind felt by `strand`, a bilinear blend of the pyramid corners over a
    /// [`WIND_GRID`] x [`WIND_GRID`] grid of strand indices.
    pub fn strand_wind(&self, strand: u32) -> Vec3 {
        let u = (strand % WIND_GRID) as f32 / WIND_GRID as f32;
        let w = ((strand / WIND_GRID) % WIND_GRID) as f32 / WIND_GRID as f32;
        let [a, b, c, d] = self.wind_pyramid.map(Vec4::xyz);
        a.lerp(b, u).lerp(c.lerp(d, u), w)
    }
}
