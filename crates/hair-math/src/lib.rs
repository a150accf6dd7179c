//! # Hair Math
//!
//! Small linear algebra library used by the asset preprocessor, the simulation
//! parameter builders and the orbit camera.
//!
//! Matrices are column-major and multiplication composes right to left:
//! `a * b` applies `b` first, then `a`. All types are `#[repr(C)]` and `Pod`, so
//! they can be copied straight into GPU constant blocks.

pub mod matrix;
pub mod quaternion;
pub mod vector;

pub use matrix::*;
pub use quaternion::*;
pub use vector::*;

pub const PI: f32 = std::f32::consts::PI;
pub const DEG_TO_RAD: f32 = PI / 180.0;
pub const RAD_TO_DEG: f32 = 180.0 / PI;
