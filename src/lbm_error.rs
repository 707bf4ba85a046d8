//! LbmError: unified error type for lbm-slab public APIs
//!
//! Configuration problems are rejected at the call boundary with a structured
//! variant, communication failures carry the peer rank, and conditions that
//! cannot be recovered locally (allocation, lost ranks) surface as errors the
//! caller is expected to treat as a hard stop of the run.

use thiserror::Error;

/// Unified error type for lbm-slab operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LbmError {
    /// A physical or numerical parameter is out of its admissible range.
    #[error("invalid parameter `{name}` = {value}")]
    InvalidParameter { name: &'static str, value: f64 },
    /// A slab run needs the orchestrator plus at least one worker rank.
    #[error("need at least 2 ranks (orchestrator + worker), got {0}")]
    TooFewRanks(usize),
    /// The padded lattice is narrower along x than the number of workers.
    #[error("lattice dim_x = {dim_x} cannot be split across {workers} worker ranks")]
    DomainTooSmall { dim_x: usize, workers: usize },
    /// The occupancy grid handed over by the voxelizer has a zero extent.
    #[error("occupancy grid has an empty axis: {0:?}")]
    EmptyOccupancy([usize; 3]),
    /// Occupancy bit vector length does not match its dimensions.
    #[error("occupancy data has {actual} voxels, dimensions require {expected}")]
    OccupancyShape { expected: usize, actual: usize },
    /// An operation needs a loaded domain but none is present.
    #[error("no domain has been loaded")]
    NoDomain,
    /// A probe id was referenced that is not registered.
    #[error("unknown probe id {0}")]
    UnknownProbe(u32),
    /// Probe geometry cannot be mapped to lattice nodes.
    #[error("invalid probe geometry: {0}")]
    InvalidProbe(String),
    /// A message exchange with `neighbor` failed.
    #[error("communication with rank {neighbor} failed: {message}")]
    CommError { neighbor: usize, message: String },
    /// A peer answered with something other than the expected record.
    #[error("protocol violation from rank {rank}: {message}")]
    Protocol { rank: usize, message: String },
    /// A collective step could not complete because some rank stopped
    /// taking part. The world cannot continue.
    #[error("rank {rank} abandoned a barrier: a rank stopped participating")]
    RankLost { rank: usize },
    /// The lattice storage for a slab could not be reserved.
    #[error("failed to allocate {cells} lattice cells")]
    Allocation { cells: usize },
    /// A structural invariant does not hold.
    #[error("invariant violated: {0}")]
    Invariant(String),
    /// The run was halted and every rank disconnected.
    #[error("simulation has been halted")]
    Halted,
}

impl LbmError {
    /// Shorthand for a byte-count mismatch on a received record.
    pub(crate) fn short_read(neighbor: usize, expected: usize, actual: usize) -> Self {
        LbmError::CommError {
            neighbor,
            message: format!("expected {expected} bytes, got {actual}"),
        }
    }
}
