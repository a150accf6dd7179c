//! # HairGL
//!
//! Strand hair simulation and rendering. A [`HairSystem`] owns the device,
//! shared read-only assets and the per-object instances simulated and drawn
//! from them.

pub mod arena;
pub mod error;
pub mod system;

pub use arena::{AssetId, InstanceId};
pub use error::*;
pub use system::*;

pub use hair_core::{HairAssetData, HairInstanceSettings};
pub use hair_renderer::Light;
