//! Rotation quaternions

use crate::{Mat3, Vec3};
use bytemuck::{Pod, Zeroable};
use std::ops::{Index, IndexMut, Mul};

/// Squared length under which a quaternion is considered unrecoverable by [`Quat::inverse`].
pub const QUAT_INVERSE_EPSILON: f32 = 0.001;

/// Quaternion stored as `(x, y, z, w)`, matching a WGSL `vec4<f32>`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Self = Self::from_xyzw(0.0, 0.0, 0.0, 1.0);

    pub const fn from_xyzw(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle` radians around `axis`. The axis must be unit length.
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let half = angle * 0.5;
        let xyz = axis * half.sin();
        Self::from_xyzw(xyz.x, xyz.y, xyz.z, half.cos())
    }

    /// Converts an orthonormal rotation matrix (Shepperd's method).
    ///
    /// When the trace is not positive the largest diagonal element picks the
    /// component computed from the square root, which avoids cancellation.
    pub fn from_rotation_matrix(m: &Mat3) -> Self {
        let trace = m.get(0, 0) + m.get(1, 1) + m.get(2, 2);

        if trace > 0.0 {
            let w = 0.5 * (trace + 1.0).sqrt();
            let d = 1.0 / (4.0 * w);
            return Self::from_xyzw(
                (m.get(2, 1) - m.get(1, 2)) * d,
                (m.get(0, 2) - m.get(2, 0)) * d,
                (m.get(1, 0) - m.get(0, 1)) * d,
                w,
            );
        }

        const NEXT: [usize; 3] = [1, 2, 0];
        let mut i = 0;
        if m.get(1, 1) > m.get(i, i) {
            i = 1;
        }
        if m.get(2, 2) > m.get(i, i) {
            i = 2;
        }
        let j = NEXT[i];
        let k = NEXT[j];

        let mut q = Self::IDENTITY;
        let root = (m.get(i, i) - m.get(j, j) - m.get(k, k) + 1.0).sqrt();
        q[i] = 0.5 * root;
        let root = 0.5 / root;
        q.w = (m.get(k, j) - m.get(j, k)) * root;
        q[j] = (m.get(j, i) + m.get(i, j)) * root;
        q[k] = (m.get(k, i) + m.get(i, k)) * root;
        q
    }

    pub fn xyz(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    pub fn normalize(self) -> Self {
        let inv = 1.0 / self.length_squared().sqrt();
        Self::from_xyzw(self.x * inv, self.y * inv, self.z * inv, self.w * inv)
    }

    pub fn conjugate(self) -> Self {
        Self::from_xyzw(-self.x, -self.y, -self.z, self.w)
    }

    /// Multiplicative inverse. Near-zero quaternions (squared length below
    /// [`QUAT_INVERSE_EPSILON`]) return the identity instead of dividing.
    pub fn inverse(self) -> Self {
        let len2 = self.length_squared();
        if len2 < QUAT_INVERSE_EPSILON {
            return Self::IDENTITY;
        }
        Self::from_xyzw(-self.x / len2, -self.y / len2, -self.z / len2, self.w / len2)
    }

    /// Rotates `v` by this (unit) quaternion.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let q = self.xyz();
        let uv = q.cross(v);
        let uuv = q.cross(uv);
        v + uv * (2.0 * self.w) + uuv * 2.0
    }

    /// Normalized linear interpolation along the shorter arc.
    pub fn nlerp(self, other: Self, t: f32) -> Self {
        let other = if self.dot(other) < 0.0 {
            Self::from_xyzw(-other.x, -other.y, -other.z, -other.w)
        } else {
            other
        };
        Self::from_xyzw(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
            self.z + (other.z - self.z) * t,
            self.w + (other.w - self.w) * t,
        )
        .normalize()
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }
}

/// Hamilton product: `a * b` rotates by `b` first, then by `a`.
impl Mul for Quat {
    type Output = Self;
    fn mul(self, o: Self) -> Self {
        Self::from_xyzw(
            self.w * o.x + self.x * o.w + self.y * o.z - self.z * o.y,
            self.w * o.y + self.y * o.w + self.z * o.x - self.x * o.z,
            self.w * o.z + self.z * o.w + self.x * o.y - self.y * o.x,
            self.w * o.w - self.x * o.x - self.y * o.y - self.z * o.z,
        )
    }
}

impl Mul<Vec3> for Quat {
    type Output = Vec3;
    fn mul(self, v: Vec3) -> Vec3 {
        self.rotate(v)
    }
}

impl Index<usize> for Quat {
    type Output = f32;
    fn index(&self, i: usize) -> &f32 {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            3 => &self.w,
            _ => panic!("Quat index out of range: {i}"),
        }
    }
}

impl IndexMut<usize> for Quat {
    fn index_mut(&mut self, i: usize) -> &mut f32 {
        match i {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            3 => &mut self.w,
            _ => panic!("Quat index out of range: {i}"),
        }
    }
}
