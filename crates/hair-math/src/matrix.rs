//! Column-major 3x3 and 4x4 matrices and camera transform builders

use crate::{Quat, Vec3, Vec4};
use bytemuck::{Pod, Zeroable};
use std::ops::Mul;

/// 3x3 matrix stored as three columns.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Mat3 {
    pub cols: [Vec3; 3],
}

impl Default for Mat3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat3 {
    pub const ZERO: Self = Self::from_cols(Vec3::ZERO, Vec3::ZERO, Vec3::ZERO);
    pub const IDENTITY: Self = Self::from_cols(Vec3::X, Vec3::Y, Vec3::Z);

    pub const fn from_cols(x: Vec3, y: Vec3, z: Vec3) -> Self {
        Self { cols: [x, y, z] }
    }

    /// Element at `row`, `col`.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.cols[col][row]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.cols[col][row] = value;
    }

    pub fn transpose(&self) -> Self {
        let mut t = Self::ZERO;
        for row in 0..3 {
            for col in 0..3 {
                t.set(col, row, self.get(row, col));
            }
        }
        t
    }

    pub fn to_cols_array(&self) -> [f32; 9] {
        let [a, b, c] = self.cols;
        [a.x, a.y, a.z, b.x, b.y, b.z, c.x, c.y, c.z]
    }
}

impl Mul for Mat3 {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::from_cols(self * rhs.cols[0], self * rhs.cols[1], self * rhs.cols[2])
    }
}

impl Mul<Vec3> for Mat3 {
    type Output = Vec3;
    fn mul(self, v: Vec3) -> Vec3 {
        self.cols[0] * v.x + self.cols[1] * v.y + self.cols[2] * v.z
    }
}

/// 4x4 matrix stored as four columns, laid out like a WGSL `mat4x4<f32>`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Mat4 {
    pub cols: [Vec4; 4],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    pub const ZERO: Self = Self::from_cols(Vec4::ZERO, Vec4::ZERO, Vec4::ZERO, Vec4::ZERO);
    pub const IDENTITY: Self = Self::from_cols(Vec4::X, Vec4::Y, Vec4::Z, Vec4::W);

    pub const fn from_cols(x: Vec4, y: Vec4, z: Vec4, w: Vec4) -> Self {
        Self { cols: [x, y, z, w] }
    }

    /// Element at `row`, `col`.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.cols[col][row]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.cols[col][row] = value;
    }

    /// Right-handed perspective projection with OpenGL clip depth (`-1..1`).
    pub fn perspective(fov_y: f32, aspect: f32, z_near: f32, z_far: f32) -> Self {
        let tf = (fov_y * 0.5).tan();
        let nf_diff = z_near - z_far;
        let mut p = Self::ZERO;
        p.set(0, 0, 1.0 / (aspect * tf));
        p.set(1, 1, 1.0 / tf);
        p.set(2, 2, (z_far + z_near) / nf_diff);
        p.set(3, 2, -1.0);
        p.set(2, 3, 2.0 * z_far * z_near / nf_diff);
        p
    }

    /// View matrix looking from `eye` towards `at`.
    ///
    /// The eye translation is folded in through dot products with the basis
    /// vectors rather than composed as a separate translation.
    pub fn look_at(eye: Vec3, at: Vec3, up: Vec3) -> Self {
        let z_axis = (at - eye).normalize();
        let x_axis = z_axis.cross(up).normalize();
        let y_axis = x_axis.cross(z_axis);

        let mut l = Self::IDENTITY;
        for i in 0..3 {
            l.set(0, i, x_axis[i]);
            l.set(1, i, y_axis[i]);
            l.set(2, i, -z_axis[i]);
        }
        l.set(0, 3, -x_axis.dot(eye));
        l.set(1, 3, -y_axis.dot(eye));
        l.set(2, 3, z_axis.dot(eye));
        l
    }

    pub fn translation(t: Vec3) -> Self {
        let mut m = Self::IDENTITY;
        m.cols[3] = t.extend(1.0);
        m
    }

    pub fn scale(s: Vec3) -> Self {
        let mut m = Self::IDENTITY;
        m.set(0, 0, s.x);
        m.set(1, 1, s.y);
        m.set(2, 2, s.z);
        m
    }

    pub fn rotate_x(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        let mut m = Self::IDENTITY;
        m.set(1, 1, c);
        m.set(2, 1, s);
        m.set(1, 2, -s);
        m.set(2, 2, c);
        m
    }

    pub fn rotate_y(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        let mut m = Self::IDENTITY;
        m.set(0, 0, c);
        m.set(2, 0, -s);
        m.set(0, 2, s);
        m.set(2, 2, c);
        m
    }

    pub fn rotate_z(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        let mut m = Self::IDENTITY;
        m.set(0, 0, c);
        m.set(1, 0, s);
        m.set(0, 1, -s);
        m.set(1, 1, c);
        m
    }

    pub fn from_quat(q: Quat) -> Self {
        Self::from_cols(
            (q * Vec3::X).extend(0.0),
            (q * Vec3::Y).extend(0.0),
            (q * Vec3::Z).extend(0.0),
            Vec4::W,
        )
    }

    /// Inverse of a rigid transform: transposed rotation, translation negated in
    /// local space.
    ///
    /// Only valid for rotation + translation matrices. Scale or shear give wrong
    /// results; this is not checked.
    pub fn euclidean_inverse(&self) -> Self {
        let mut r_inv = Self::IDENTITY;
        for row in 0..3 {
            for col in 0..3 {
                r_inv.set(row, col, self.get(col, row));
            }
        }
        r_inv * Self::translation(-self.cols[3].xyz())
    }

    pub fn upper_left(&self) -> Mat3 {
        Mat3::from_cols(self.cols[0].xyz(), self.cols[1].xyz(), self.cols[2].xyz())
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        (*self * p.extend(1.0)).xyz()
    }

    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        (*self * v.extend(0.0)).xyz()
    }

    pub fn transpose(&self) -> Self {
        let mut t = Self::ZERO;
        for row in 0..4 {
            for col in 0..4 {
                t.set(col, row, self.get(row, col));
            }
        }
        t
    }

    pub fn to_cols_array(&self) -> [f32; 16] {
        bytemuck::cast(*self)
    }

    pub fn to_cols_array_2d(&self) -> [[f32; 4]; 4] {
        bytemuck::cast(*self)
    }
}

impl Mul for Mat4 {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::from_cols(
            self * rhs.cols[0],
            self * rhs.cols[1],
            self * rhs.cols[2],
            self * rhs.cols[3],
        )
    }
}

impl Mul<Vec4> for Mat4 {
    type Output = Vec4;
    fn mul(self, v: Vec4) -> Vec4 {
        self.cols[0] * v.x + self.cols[1] * v.y + self.cols[2] * v.z + self.cols[3] * v.w
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEG_TO_RAD;

    fn assert_mat_near(ours: &Mat4, theirs: &glam::Mat4, eps: f32) {
        let a = ours.to_cols_array();
        let b = theirs.to_cols_array();
        for i in 0..16 {
            assert!((a[i] - b[i]).abs() < eps, "element {i}: {} != {}", a[i], b[i]);
        }
    }

    fn g(v: Vec3) -> glam::Vec3 {
        glam::Vec3::from_array(v.to_array())
    }

    #[test]
    fn test_perspective_matches_gl_convention() {
        let ours = Mat4::perspective(100.0 * DEG_TO_RAD, 16.0 / 9.0, 0.01, 100.0);
        let theirs = glam::Mat4::perspective_rh_gl(100.0 * DEG_TO_RAD, 16.0 / 9.0, 0.01, 100.0);
        assert_mat_near(&ours, &theirs, 1e-4);
        assert_eq!(ours.get(3, 2), -1.0);
    }

    #[test]
    fn test_look_at_matches_glam() {
        let eye = Vec3::new(1.0, 2.0, 3.0);
        let at = Vec3::new(-0.5, 0.2, 0.0);
        let ours = Mat4::look_at(eye, at, Vec3::Y);
        let theirs = glam::Mat4::look_at_rh(g(eye), g(at), glam::Vec3::Y);
        assert_mat_near(&ours, &theirs, 1e-5);

        // The eye lands at the origin of view space.
        let p = ours.transform_point(eye);
        assert!(p.length() < 1e-5);
    }

    #[test]
    fn test_multiplication_applies_right_first() {
        let t = Mat4::translation(Vec3::new(1.0, 0.0, 0.0));
        let r = Mat4::rotate_z(90.0 * DEG_TO_RAD);
        // rotate then translate
        let p = (t * r).transform_point(Vec3::X);
        assert!((p - Vec3::new(1.0, 1.0, 0.0)).length() < 1e-5);
        // translate then rotate
        let p = (r * t).transform_point(Vec3::X);
        assert!((p - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_rotations_match_glam() {
        for angle in [-2.0, 0.4, 1.3] {
            assert_mat_near(&Mat4::rotate_x(angle), &glam::Mat4::from_rotation_x(angle), 1e-6);
            assert_mat_near(&Mat4::rotate_y(angle), &glam::Mat4::from_rotation_y(angle), 1e-6);
            assert_mat_near(&Mat4::rotate_z(angle), &glam::Mat4::from_rotation_z(angle), 1e-6);
        }
    }

    #[test]
    fn test_euclidean_inverse_of_rigid_transform() {
        let m = Mat4::translation(Vec3::new(3.0, -2.0, 0.5))
            * Mat4::rotate_y(0.7)
            * Mat4::rotate_x(-0.3);
        let inv = m.euclidean_inverse();
        let id = m * inv;
        assert_mat_near(&id, &glam::Mat4::IDENTITY, 1e-5);

        let view = Mat4::look_at(Vec3::new(0.0, 1.0, 5.0), Vec3::ZERO, Vec3::Y);
        let eye = view.euclidean_inverse().cols[3].xyz();
        assert!((eye - Vec3::new(0.0, 1.0, 5.0)).length() < 1e-4);
    }

    #[test]
    fn test_from_quat_matches_rotation() {
        let q = Quat::from_axis_angle(Vec3::Y, 0.7);
        let m = Mat4::from_quat(q);
        assert_mat_near(&m, &glam::Mat4::from_rotation_y(0.7), 1e-6);
        let q2 = Quat::from_rotation_matrix(&m.upper_left());
        assert!((q2.dot(q).abs() - 1.0).abs() < 1e-5);
    }
}
