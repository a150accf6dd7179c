//! # Hair Core
//!
//! Strand asset format, rest pose preprocessing and the GPU resources owned by
//! assets and instances.

pub mod error;
pub mod format;
pub mod preprocess;
pub mod resources;
pub mod settings;

pub use error::*;
pub use format::*;
pub use preprocess::*;
pub use resources::*;
pub use settings::*;
