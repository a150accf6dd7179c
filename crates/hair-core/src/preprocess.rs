//! Rest pose preprocessing: length constraints and the per-vertex frame chain

use crate::HairAssetData;
use hair_math::{Mat3, Quat, Vec3, Vec4};

/// Below this length the root z axis is rebuilt against world Y instead of world X.
pub const ROOT_AXIS_EPSILON: f32 = 0.0001;
/// Incremental rotations with a smaller angle are treated as identity.
pub const FRAME_ANGLE_EPSILON: f32 = 0.001;
/// Incremental rotations whose axis has a smaller squared length are treated as identity.
pub const FRAME_AXIS_EPSILON: f32 = 0.001;

/// Buffers derived from the rest pose, one entry per vertex.
#[derive(Clone, Debug, PartialEq)]
pub struct PreprocessedStrands {
    /// Normalized rest tangent to the next vertex in `xyz`, rest length in `w`.
    /// Zero for the last vertex of every strand.
    pub tangents_distances: Vec<Vec4>,
    /// Accumulated rest frame of every vertex.
    pub global_rotations: Vec<Quat>,
    /// Incoming edge expressed in the parent vertex frame, `w = 0`. Zero for roots.
    pub ref_vectors: Vec<Vec4>,
}

pub fn preprocess(data: &HairAssetData) -> PreprocessedStrands {
    let n = data.vertices_per_strand();
    let (global_rotations, ref_vectors) = compute_rotations(&data.positions, n);
    PreprocessedStrands {
        tangents_distances: compute_constraints(&data.positions, n),
        global_rotations,
        ref_vectors,
    }
}

pub fn compute_constraints(positions: &[Vec4], vertices_per_strand: usize) -> Vec<Vec4> {
    let mut out = vec![Vec4::ZERO; positions.len()];
    if vertices_per_strand < 2 {
        return out;
    }
    for (strand, chunk) in positions.chunks_exact(vertices_per_strand).enumerate() {
        for (i, pair) in chunk.windows(2).enumerate() {
            let edge = pair[1].xyz() - pair[0].xyz();
            let length = edge.length();
            let tangent = if length > 0.0 { edge / length } else { Vec3::ZERO };
            out[strand * vertices_per_strand + i] = tangent.extend(length);
        }
    }
    out
}

/// Orthonormal frame whose local X is `tangent` (unit length).
pub fn root_frame(tangent: Vec3) -> Quat {
    let x_axis = tangent;
    let mut z_axis = x_axis.cross(Vec3::X);
    if z_axis.length() < ROOT_AXIS_EPSILON {
        z_axis = x_axis.cross(Vec3::Y);
    }
    let z_axis = z_axis.normalize();
    let y_axis = z_axis.cross(x_axis);
    Quat::from_rotation_matrix(&Mat3::from_cols(x_axis, y_axis, z_axis))
}

/// Rotation taking local X onto `local_tangent`, identity when the turn is negligible.
pub fn incremental_rotation(local_tangent: Vec3) -> Quat {
    let x_axis = local_tangent.normalize();
    let axis = Vec3::X.cross(x_axis);
    let angle = Vec3::X.dot(x_axis).clamp(-1.0, 1.0).acos();

    // A zero tangent gives NaNs, which fail both tests and land on identity.
    if angle.abs() > FRAME_ANGLE_EPSILON && axis.length_squared() > FRAME_AXIS_EPSILON {
        Quat::from_axis_angle(axis.normalize(), angle)
    } else {
        Quat::IDENTITY
    }
}

/// Walks every strand from the root, returning the global frame and the
/// reference vector of each vertex.
///
/// The first edge of each strand must have non-zero length.
pub fn compute_rotations(positions: &[Vec4], vertices_per_strand: usize) -> (Vec<Quat>, Vec<Vec4>) {
    let mut global = vec![Quat::IDENTITY; positions.len()];
    let mut refs = vec![Vec4::ZERO; positions.len()];
    if vertices_per_strand < 2 {
        return (global, refs);
    }

    for (strand, chunk) in positions.chunks_exact(vertices_per_strand).enumerate() {
        let base = strand * vertices_per_strand;
        global[base] = root_frame((chunk[1].xyz() - chunk[0].xyz()).normalize());

        for i in 1..vertices_per_strand {
            let parent = global[base + i - 1];
            let tangent = chunk[i].xyz() - chunk[i - 1].xyz();
            let local_tangent = parent.inverse() * tangent;

            global[base + i] = parent * incremental_rotation(local_tangent);
            refs[base + i] = local_tangent.extend(0.0);
        }
    }
    (global, refs)
}
