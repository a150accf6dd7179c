//! # Hair Renderer
//!
//! Up to three passes per hair instance: guide lines, growth mesh wireframe and
//! the tessellated, shaded hair itself. All passes read the simulated positions
//! and never write them.

pub mod blocks;
pub mod stage;

pub use blocks::*;
pub use stage::*;
