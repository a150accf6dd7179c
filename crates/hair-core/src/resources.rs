//! Device-resident asset and instance buffers

use crate::{preprocess, HairAssetData, HairInstanceSettings};
use hair_gpu::{BufferDesc, BufferId, BufferUsage, Device};
use hair_math::Vec4;

const VEC4_SIZE: u64 = std::mem::size_of::<Vec4>() as u64;

/// Storage buffer sized for `contents`.
fn storage<'a>(label: &'a str, contents: &[u8]) -> BufferDesc<'a> {
    BufferDesc {
        label,
        size: contents.len() as u64,
        usage: BufferUsage::Storage,
    }
}

/// Read-only rest data shared by every instance of an asset.
#[derive(Debug)]
pub struct HairAsset {
    pub guides_count: u32,
    pub segments_count: u32,
    pub triangles_count: u32,

    pub rest_positions: BufferId,
    pub tangents_distances: BufferId,
    pub hair_indices: BufferId,
    pub ref_vectors: BufferId,
    pub global_rotations: BufferId,
    /// Scratch buffer written by the simulation kernel.
    pub debug: BufferId,
}

impl HairAsset {
    /// Preprocesses `data` and uploads every derived buffer.
    pub fn upload<D: Device>(device: &mut D, data: &HairAssetData) -> Self {
        let derived = preprocess(data);
        let rest_bytes: &[u8] = bytemuck::cast_slice(&data.positions);
        let rest_positions = device.create_buffer_init(&storage("Rest Positions Buffer", rest_bytes), rest_bytes);

        let index_bytes: &[u8] = bytemuck::cast_slice(&data.triangles);
        let hair_indices = device.create_buffer_init(&storage("Hair Indices Buffer", index_bytes), index_bytes);

        let td_bytes: &[u8] = bytemuck::cast_slice(&derived.tangents_distances);
        let tangents_distances =
            device.create_buffer_init(&storage("Tangents Distances Buffer", td_bytes), td_bytes);

        let ref_bytes: &[u8] = bytemuck::cast_slice(&derived.ref_vectors);
        let ref_vectors = device.create_buffer_init(&storage("Ref Vectors Buffer", ref_bytes), ref_bytes);

        let rot_bytes: &[u8] = bytemuck::cast_slice(&derived.global_rotations);
        let global_rotations =
            device.create_buffer_init(&storage("Global Rotations Buffer", rot_bytes), rot_bytes);

        let debug = device.create_buffer(&storage("Debug Buffer", rest_bytes));

        log::info!(
            "Uploaded hair asset: {} guides, {} segments, {} triangles",
            data.guides_count,
            data.segments_count,
            data.triangles.len()
        );

        Self {
            guides_count: data.guides_count,
            segments_count: data.segments_count,
            triangles_count: data.triangles_count(),
            rest_positions,
            tangents_distances,
            hair_indices,
            ref_vectors,
            global_rotations,
            debug,
        }
    }

    pub fn vertices_per_strand(&self) -> u32 {
        self.segments_count + 1
    }

    pub fn vertex_count(&self) -> u32 {
        self.guides_count * self.vertices_per_strand()
    }

    /// Size in bytes of one position buffer.
    pub fn positions_size(&self) -> u64 {
        self.vertex_count() as u64 * VEC4_SIZE
    }

    pub fn destroy<D: Device>(self, device: &mut D) {
        for buffer in [
            self.rest_positions,
            self.tangents_distances,
            self.hair_indices,
            self.ref_vectors,
            self.global_rotations,
            self.debug,
        ] {
            device.destroy_buffer(buffer);
        }
    }
}

/// Mutable simulation state of one hair object.
#[derive(Debug)]
pub struct HairInstance {
    pub settings: HairInstanceSettings,
    pub positions: BufferId,
    pub previous_positions: BufferId,
    /// Incremented once per simulation step.
    pub frame: u32,
}

impl HairInstance {
    /// Allocates both position buffers and copies the rest pose into them, so
    /// the first step starts at rest with zero velocity.
    pub fn create<D: Device>(device: &mut D, asset: &HairAsset) -> Self {
        let size = asset.positions_size();
        let desc = |label| BufferDesc {
            label,
            size,
            usage: BufferUsage::Storage,
        };
        let positions = device.create_buffer(&desc("Positions Buffer"));
        let previous_positions = device.create_buffer(&desc("Previous Positions Buffer"));
        device.copy_buffer(asset.rest_positions, 0, positions, 0, size);
        device.copy_buffer(asset.rest_positions, 0, previous_positions, 0, size);

        Self {
            settings: HairInstanceSettings::default(),
            positions,
            previous_positions,
            frame: 0,
        }
    }

    pub fn destroy<D: Device>(self, device: &mut D) {
        device.destroy_buffer(self.positions);
        device.destroy_buffer(self.previous_positions);
    }
}
