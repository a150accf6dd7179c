//! # Hair Simulation
//!
//! One constraint-based physics step per hair instance. Every guide strand is
//! an independent work item: integrate external forces, project rest lengths,
//! then pull the strand back towards its rest shape.

pub mod kernel;
pub mod params;
pub mod stage;

pub use kernel::*;
pub use params::*;
pub use stage::*;
