//! Halo planes: the per-face ghost layer written by streaming and shipped to
//! the neighbouring slab.
//!
//! A plane is indexed by the *destination* `(y, z)` of the populations it
//! holds, so the receiving rank writes slot `(y, z)` straight into its own
//! boundary cell `(x_edge, y, z)`.

use super::direction::{Direction, FACE_COMPONENTS};
use crate::lbm_error::LbmError;

/// The five distribution values crossing one face at one `(y, z)`.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct HaloFaceCell {
    pub f: [f64; FACE_COMPONENTS],
}

/// Which x-face of a slab a plane belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    West,
    East,
}

impl Face {
    /// Directions leaving the slab through this face.
    pub fn outbound(self) -> &'static [Direction; FACE_COMPONENTS] {
        match self {
            Face::West => &Direction::WESTBOUND,
            Face::East => &Direction::EASTBOUND,
        }
    }

    /// Directions entering the slab through this face.
    pub fn inbound(self) -> &'static [Direction; FACE_COMPONENTS] {
        match self {
            Face::West => &Direction::EASTBOUND,
            Face::East => &Direction::WESTBOUND,
        }
    }

    pub fn opposite(self) -> Face {
        match self {
            Face::West => Face::East,
            Face::East => Face::West,
        }
    }
}

/// One ghost plane of `ny * nz` face cells.
#[derive(Clone, Debug, PartialEq)]
pub struct HaloPlane {
    ny: usize,
    nz: usize,
    cells: Vec<HaloFaceCell>,
}

impl HaloPlane {
    pub fn new(ny: usize, nz: usize) -> Self {
        Self {
            ny,
            nz,
            cells: vec![HaloFaceCell::default(); ny * nz],
        }
    }

    #[inline]
    pub fn dims(&self) -> (usize, usize) {
        (self.ny, self.nz)
    }

    #[inline]
    pub fn at(&self, y: usize, z: usize) -> &HaloFaceCell {
        &self.cells[y * self.nz + z]
    }

    #[inline]
    pub fn at_mut(&mut self, y: usize, z: usize) -> &mut HaloFaceCell {
        &mut self.cells[y * self.nz + z]
    }

    /// Number of `f64` words in one packet: 5 × ny × nz.
    #[inline]
    pub fn packet_len(&self) -> usize {
        FACE_COMPONENTS * self.cells.len()
    }

    /// Serialize into little-endian `f64` words, reusing `out`.
    pub fn encode_le(&self, out: &mut Vec<u64>) {
        out.clear();
        out.reserve(self.packet_len());
        for c in &self.cells {
            out.extend(c.f.iter().map(|v| v.to_bits().to_le()));
        }
    }

    /// Overwrite this plane from a received packet.
    pub fn decode_le(&mut self, words: &[u64], from: usize) -> Result<(), LbmError> {
        if words.len() != self.packet_len() {
            return Err(LbmError::short_read(
                from,
                self.packet_len() * 8,
                words.len() * 8,
            ));
        }
        for (c, chunk) in self.cells.iter_mut().zip(words.chunks_exact(FACE_COMPONENTS)) {
            for (dst, w) in c.f.iter_mut().zip(chunk) {
                *dst = f64::from_bits(u64::from_le(*w));
            }
        }
        Ok(())
    }
}
