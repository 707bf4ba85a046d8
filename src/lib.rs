#![cfg_attr(docsrs, feature(doc_cfg))]
//! # lbm-slab
//!
//! lbm-slab is a distributed D3Q19 lattice-Boltzmann solver. A voxel
//! occupancy grid is centered in a padded lattice, the lattice is cut into
//! slabs along x, and each slab is owned by one worker rank. Rank 0 runs the
//! orchestrator: it sizes the slabs, drives the step schedule and answers
//! probe queries by reading cells from the ranks that own them.
//!
//! ## Features
//! - D3Q19 stencil with BGK collision, full-way bounce-back on solid cells and
//!   in-place streaming
//! - Parity-ordered halo exchange between adjacent slabs, separated by global
//!   barriers
//! - Boundary forcing at the domain ends with an all-or-nothing positivity
//!   guard
//! - Point, plane, volume, glyph and streamline-ribbon probes
//! - Pluggable communication: in-process threads ([`comm::LocalComm`]) or MPI
//!   (`mpi-support` feature)
//!
//! ## Step schedule
//!
//! ```text
//! Propagate + forcing -> barrier -> halo round 1 -> barrier
//!                     -> halo round 2 -> barrier -> Collide -> barrier
//! ```
//!
//! A rank that never reaches a barrier breaks it for every rank, and the
//! orchestrator stops the run with [`LbmError::RankLost`].
//!
//! ## Usage
//!
//! ```no_run
//! use lbm_slab::prelude::*;
//!
//! # fn main() -> Result<(), LbmError> {
//! let mut world = LocalWorld::spawn(4)?;
//! let comm = world.take_orchestrator().ok_or(LbmError::TooFewRanks(0))?;
//! let mut orch = Orchestrator::new(comm, SolverConfig::default())?;
//! let grid = OccupancyGrid::cavity([50, 50, 50])?;
//! orch.load_domain(&grid, WorldBounds::unit_voxels(grid.dims()))?;
//! orch.run(10, |status| println!("step {}", status.step))?;
//! orch.halt();
//! world.join()?;
//! # Ok(())
//! # }
//! ```

pub mod comm;
pub mod debug_invariants;
pub mod domain;
pub mod lattice;
pub mod lbm_error;
pub mod orchestrator;
pub mod rank;
pub mod sampling;

pub use debug_invariants::DebugInvariants;
pub use lbm_error::LbmError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::comm::{Communicator, LocalComm, NoComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::domain::{
        DomainDescriptor, EnvironmentParameters, LatticeCoord, OccupancyGrid, SolverConfig,
        WorldBounds,
    };
    pub use crate::lattice::{CellSample, Direction, Slab};
    pub use crate::lbm_error::LbmError;
    pub use crate::orchestrator::{
        ControlRequest, Orchestrator, RunState, RunningStatistics, SimulationControl,
        SimulationStatus,
    };
    pub use crate::rank::{LocalWorld, WorkerRank};
    pub use crate::sampling::{
        ProbeDescriptor, ProbeGeometry, ProbeId, ProbeResult, SampleType,
    };
}
