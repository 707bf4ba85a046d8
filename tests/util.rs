#![allow(dead_code)]
use std::time::Duration;

use lbm_slab::comm::LocalComm;
use lbm_slab::domain::{EnvironmentParameters, OccupancyGrid, SolverConfig, WorldBounds};
use lbm_slab::lattice::{Face, Faces, Slab};
use lbm_slab::orchestrator::Orchestrator;
use lbm_slab::rank::LocalWorld;

/// Receives give up after this long in tests so a protocol bug fails
/// instead of hanging the suite.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gentle forcing at unit density, sampled rarely.
pub fn forced_env() -> EnvironmentParameters {
    EnvironmentParameters {
        density: 1.0,
        acceleration: 0.02,
        relaxation: 1.2,
        update_rate: 1000,
        forcing_guard: 0.0,
    }
}

/// An in-process world of `size` ranks with the orchestrator built on rank 0.
/// Also returns a clone of rank 0's endpoint for tests that talk to workers
/// directly.
pub fn spawn(size: usize, config: SolverConfig) -> (Orchestrator<LocalComm>, LocalWorld, LocalComm) {
    let mut world = LocalWorld::spawn_with_timeout(size, TEST_TIMEOUT).unwrap();
    let comm = world.take_orchestrator().unwrap();
    let raw = comm.clone();
    (Orchestrator::new(comm, config).unwrap(), world, raw)
}

pub fn unit_bounds(grid: &OccupancyGrid) -> WorldBounds {
    WorldBounds::unit_voxels(grid.dims())
}

/// Single-slab reference run over the whole lattice.
pub fn serial_reference(grid: &OccupancyGrid, env: EnvironmentParameters, steps: usize) -> Slab {
    let [nx, ny, nz] = grid.dims();
    let mut slab = Slab::new(nx, ny, nz, env.density, Faces::CLOSED).unwrap();
    for x in 0..nx {
        for y in 0..ny {
            for z in 0..nz {
                if grid.get(x, y, z) {
                    slab.set_solid(x, y, z, true);
                }
            }
        }
    }
    for _ in 0..steps {
        slab.propagate();
        slab.apply_forcing(Face::West, env.density, env.acceleration, env.forcing_guard);
        slab.apply_forcing(Face::East, env.density, env.acceleration, env.forcing_guard);
        slab.collide(env.relaxation);
    }
    slab
}

/// Cavity with an extra solid block in the middle of the channel.
pub fn obstructed_channel(dims: [usize; 3]) -> OccupancyGrid {
    let mut g = OccupancyGrid::cavity(dims).unwrap();
    let [nx, ny, nz] = dims;
    for x in nx / 2 - 1..nx / 2 + 1 {
        for y in ny / 2 - 1..ny / 2 + 1 {
            g.set(x, y, nz / 2, true);
        }
    }
    g
}
