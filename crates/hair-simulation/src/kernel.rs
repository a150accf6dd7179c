//! Host implementation of the strand solver
//!
//! Mirrors `shaders/simulation.wgsl` step for step so the [`CpuDevice`] can run
//! the simulation program in tests.

use crate::SimulationParams;
use hair_core::incremental_rotation;
use hair_gpu::{BindingSlot, CpuDevice, KernelContext};
use hair_math::{Quat, Vec3, Vec4};

/// Program label the simulation stage links under.
pub const SIMULATION_PROGRAM: &str = "Hair Simulation";

/// Per-vertex rest data, read only.
pub struct StrandRest<'a> {
    pub positions: &'a [Vec4],
    pub tangents_distances: &'a [Vec4],
    pub ref_vectors: &'a [Vec4],
    pub global_rotations: &'a [Quat],
}

/// Per-vertex simulated state, updated in place.
pub struct StrandState<'a> {
    pub positions: &'a mut [Vec4],
    pub previous_positions: &'a mut [Vec4],
    /// Receives the final frame of every vertex.
    pub frames: &'a mut [Quat],
}

/// Runs one step for strands `0..strand_count`.
pub fn solve_strands(params: &SimulationParams, rest: &StrandRest, state: &mut StrandState, strand_count: u32) {
    let n = params.vertices_per_strand as usize;
    let count = (strand_count.min(params.strand_count) as usize)
        .min(rest.positions.len() / n.max(1))
        .min(state.positions.len() / n.max(1));
    if n < 2 {
        return;
    }

    for strand in 0..count {
        let base = strand * n;
        integrate(params, rest, state, strand as u32, base);
        for _ in 0..params.length_iterations {
            project_lengths(rest, state, base, n);
        }
        for _ in 0..params.shape_iterations {
            project_shape(params, rest, state, base, n);
        }
    }
}

fn rest_world(params: &SimulationParams, rest_position: Vec4) -> Vec3 {
    params.model.transform_point(rest_position.xyz())
}

fn integrate(params: &SimulationParams, rest: &StrandRest, state: &mut StrandState, strand: u32, base: usize) {
    let n = params.vertices_per_strand as usize;
    let dt2 = params.time_step * params.time_step;
    let wind = params.strand_wind(strand);

    for v in base..base + n {
        let mask = rest.positions[v].w;
        if v == base || mask == 0.0 {
            let root = rest_world(params, rest.positions[v]).extend(0.0);
            state.positions[v] = root;
            state.previous_positions[v] = root;
            continue;
        }

        let current = state.positions[v].xyz();
        let velocity = (current - state.previous_positions[v].xyz()) * (1.0 - params.damping);

        let edge = current - state.positions[v - 1].xyz();
        let length = edge.length();
        let wind_force = if length > 0.0 {
            let t = edge / length;
            wind - t * wind.dot(t)
        } else {
            wind
        };
        let acceleration = params.gravity.xyz() + wind_force;

        state.previous_positions[v] = current.extend(mask);
        state.positions[v] = (current + velocity + acceleration * dt2).extend(mask);
    }
}

fn project_lengths(rest: &StrandRest, state: &mut StrandState, base: usize, n: usize) {
    for v in base..base + n - 1 {
        let w0 = rest.positions[v].w;
        let w1 = rest.positions[v + 1].w;
        let weight = w0 + w1;
        if weight <= 0.0 {
            continue;
        }
        let p0 = state.positions[v].xyz();
        let p1 = state.positions[v + 1].xyz();
        let d = p1 - p0;
        let length = d.length();
        if length <= 0.0 {
            continue;
        }

        let delta = d * (1.0 - rest.tangents_distances[v].w / length);
        state.positions[v] = (p0 + delta * (w0 / weight)).extend(w0);
        state.positions[v + 1] = (p1 - delta * (w1 / weight)).extend(w1);
    }
}

fn project_shape(params: &SimulationParams, rest: &StrandRest, state: &mut StrandState, base: usize, n: usize) {
    let root_frame = params.model_rotation * rest.global_rotations[base];
    let mut frame = root_frame;
    state.frames[base] = root_frame;

    for i in 0..n - 1 {
        let v = base + i;
        let p0 = state.positions[v].xyz();
        let mut p1 = state.positions[v + 1].xyz();

        // Local: towards the rest edge carried by the current frame.
        let goal = p0 + frame * rest.ref_vectors[v + 1].xyz();
        let delta = (goal - p1) * params.local_stiffness;
        if i == 0 {
            p1 += delta;
        } else {
            state.positions[v] = (p0 - delta * 0.5).extend(state.positions[v].w);
            p1 += delta * 0.5;
        }

        // Global: towards the rest pose in world space.
        p1 += (rest_world(params, rest.positions[v + 1]) - p1) * params.global_stiffness;
        state.positions[v + 1] = p1.extend(state.positions[v + 1].w);

        let edge = p1 - state.positions[v].xyz();
        frame = frame * incremental_rotation(frame.inverse() * edge);
        state.frames[v + 1] = frame;
    }
}

/// Registers [`solve_strands`] as the CPU implementation of the simulation program.
pub fn register_cpu_kernel(device: &mut CpuDevice) {
    device.register_kernel(SIMULATION_PROGRAM, |ctx: &mut KernelContext<'_>, work_items| {
        let params: SimulationParams = ctx.read_block(BindingSlot::SimulationData);
        let rest_positions: Vec<Vec4> = ctx.read(BindingSlot::RestPositions);
        let tangents_distances: Vec<Vec4> = ctx.read(BindingSlot::TangentsDistances);
        let ref_vectors: Vec<Vec4> = ctx.read(BindingSlot::RefVectors);
        let global_rotations: Vec<Quat> = ctx.read(BindingSlot::GlobalRotations);
        let mut positions: Vec<Vec4> = ctx.read(BindingSlot::Positions);
        let mut previous_positions: Vec<Vec4> = ctx.read(BindingSlot::PreviousPositions);
        let mut frames: Vec<Quat> = ctx.read(BindingSlot::Debug);

        let vertices = rest_positions
            .len()
            .min(tangents_distances.len())
            .min(ref_vectors.len())
            .min(global_rotations.len())
            .min(positions.len())
            .min(previous_positions.len())
            .min(frames.len());
        let rest = StrandRest {
            positions: &rest_positions[..vertices],
            tangents_distances: &tangents_distances[..vertices],
            ref_vectors: &ref_vectors[..vertices],
            global_rotations: &global_rotations[..vertices],
        };
        let mut state = StrandState {
            positions: &mut positions[..vertices],
            previous_positions: &mut previous_positions[..vertices],
            frames: &mut frames[..vertices],
        };
        solve_strands(&params, &rest, &mut state, work_items);

        ctx.write(BindingSlot::Positions, &positions);
        ctx.write(BindingSlot::PreviousPositions, &previous_positions);
        ctx.write(BindingSlot::Debug, &frames);
    });
}
