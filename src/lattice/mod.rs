//! Lattice cell model and the single-slab kernels: streaming, forcing,
//! collision and halo bookkeeping.

pub mod cell;
pub mod direction;
pub mod halo;
pub mod slab;

pub use cell::{CellSample, LatticeCell};
pub use direction::{Direction, CS2, FACE_COMPONENTS, Q};
pub use halo::{Face, HaloFaceCell, HaloPlane};
pub use slab::{FaceKind, Faces, Slab, SlabStats};
