//! Domain description: the occupancy hand-off, the slab partition and the
//! run parameters.

pub mod config;
pub mod descriptor;
pub mod environment;
pub mod occupancy;

pub use config::SolverConfig;
pub use descriptor::{DomainDescriptor, LatticeCoord, SlabExtent};
pub use environment::EnvironmentParameters;
pub use occupancy::{OccupancyGrid, WorldBounds};
