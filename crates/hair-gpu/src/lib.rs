//! # Hair GPU
//!
//! Graphics-device abstraction shared by the simulation and rendering stages.
//!
//! Stages talk to a [`Device`] only: typed buffer/shader/program handles, a fixed
//! table of [`BindingSlot`]s, compute dispatches and draws. Two backends exist,
//! [`CpuDevice`] (host memory, registered CPU kernels, command log for tests) and
//! [`WgpuDevice`].

pub mod binding;
pub mod cpu;
pub mod device;
pub mod shader;
pub mod wgpu_device;

pub use binding::*;
pub use cpu::*;
pub use device::*;
pub use shader::*;
pub use wgpu_device::*;
