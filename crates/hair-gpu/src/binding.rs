//! Fixed binding slot table shared by host code and WGSL sources

use std::fmt;

/// Every buffer a hair program can see, with its fixed binding index.
///
/// WGSL sources refer to slots with `${NAME}` placeholders (see
/// [`compose_shader`](crate::compose_shader)), so the indices below are the only
/// place they are spelled out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingSlot {
    /// Hair shape and material constant block.
    HairData,
    /// View/projection constant block.
    SceneData,
    /// Point light constant block.
    LightData,
    /// Current simulated positions.
    Positions,
    /// Growth mesh triangle indices.
    HairIndices,
    /// Positions from the previous step.
    PreviousPositions,
    /// Rest pose positions, `w` holds the mass mask.
    RestPositions,
    /// Rest tangent in `xyz`, rest length to the next vertex in `w`.
    TangentsDistances,
    /// Rest tangent expressed in the parent vertex frame.
    RefVectors,
    /// Accumulated rest frame per vertex.
    GlobalRotations,
    /// Scratch output written by the simulation kernel.
    Debug,
    /// Simulation frame parameters.
    SimulationData,
    /// Flat color and vertex layout for the debug passes.
    VisualizationData,
}

impl BindingSlot {
    pub const COUNT: usize = 13;

    pub const ALL: [BindingSlot; Self::COUNT] = [
        Self::HairData,
        Self::SceneData,
        Self::LightData,
        Self::Positions,
        Self::HairIndices,
        Self::PreviousPositions,
        Self::RestPositions,
        Self::TangentsDistances,
        Self::RefVectors,
        Self::GlobalRotations,
        Self::Debug,
        Self::SimulationData,
        Self::VisualizationData,
    ];

    pub const fn index(self) -> u32 {
        match self {
            Self::HairData => 0,
            Self::SceneData => 1,
            Self::LightData => 2,
            Self::Positions => 3,
            Self::HairIndices => 4,
            Self::PreviousPositions => 5,
            Self::RestPositions => 6,
            Self::TangentsDistances => 7,
            Self::RefVectors => 8,
            Self::GlobalRotations => 9,
            Self::Debug => 10,
            Self::SimulationData => 11,
            Self::VisualizationData => 12,
        }
    }

    /// Name used inside `${..}` placeholders.
    pub const fn placeholder(self) -> &'static str {
        match self {
            Self::HairData => "HAIR_DATA",
            Self::SceneData => "SCENE_DATA",
            Self::LightData => "LIGHT_DATA",
            Self::Positions => "POSITIONS",
            Self::HairIndices => "HAIR_INDICES",
            Self::PreviousPositions => "PREVIOUS_POSITIONS",
            Self::RestPositions => "REST_POSITIONS",
            Self::TangentsDistances => "TANGENTS_DISTANCES",
            Self::RefVectors => "REF_VECTORS",
            Self::GlobalRotations => "GLOBAL_ROTATIONS",
            Self::Debug => "DEBUG",
            Self::SimulationData => "SIMULATION_DATA",
            Self::VisualizationData => "VISUALIZATION_DATA",
        }
    }

    pub fn from_placeholder(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.placeholder() == name)
    }
}

impl fmt::Display for BindingSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.placeholder(), self.index())
    }
}

/// How a program accesses a bound buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Uniform,
    ReadOnly,
    ReadWrite,
}

impl Access {
    pub fn is_writable(self) -> bool {
        self == Access::ReadWrite
    }
}

/// One binding declared by a program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingDesc {
    pub slot: BindingSlot,
    pub access: Access,
}

impl BindingDesc {
    pub const fn uniform(slot: BindingSlot) -> Self {
        Self { slot, access: Access::Uniform }
    }

    pub const fn read(slot: BindingSlot) -> Self {
        Self { slot, access: Access::ReadOnly }
    }

    pub const fn read_write(slot: BindingSlot) -> Self {
        Self { slot, access: Access::ReadWrite }
    }
}
