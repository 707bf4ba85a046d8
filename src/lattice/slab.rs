//! One rank's slab of the lattice and the per-step kernels that act on it.
//!
//! Cells are stored x-major (`(x * ny + y) * nz + z`) so an x-plane is a
//! contiguous run. Streaming is done in place: directions with a positive
//! linear offset are streamed in descending index order, the others in
//! ascending order, so a source value is always read before anything
//! overwrites it.
//!
//! Populations that would leave the lattice through a y/z edge, or through an
//! x-face that has no neighbour, are reflected into the opposite slot of the
//! cell they left. Populations leaving through an exchanged x-face are written
//! into that face's [`HaloPlane`] and delivered by the halo exchange.

use itertools::iproduct;

use super::cell::{CellSample, LatticeCell};
use super::direction::{Direction, FACE_COMPONENTS};
use super::halo::{Face, HaloPlane};
use crate::debug_invariants::DebugInvariants;
use crate::lbm_error::LbmError;

/// How an x-face of a slab is closed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FaceKind {
    /// A neighbouring slab supplies inbound populations through the halo.
    Exchange,
    /// Physical domain end: outbound populations bounce back.
    Wall,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Faces {
    pub west: FaceKind,
    pub east: FaceKind,
}

impl Faces {
    pub const CLOSED: Faces = Faces {
        west: FaceKind::Wall,
        east: FaceKind::Wall,
    };

    #[inline]
    pub fn kind(&self, face: Face) -> FaceKind {
        match face {
            Face::West => self.west,
            Face::East => self.east,
        }
    }
}

/// Rank-local extrema of density and squared speed over fluid cells.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SlabStats {
    pub density_min: f64,
    pub density_max: f64,
    pub speed2_min: f64,
    pub speed2_max: f64,
}

impl SlabStats {
    pub const EMPTY: SlabStats = SlabStats {
        density_min: f64::INFINITY,
        density_max: f64::NEG_INFINITY,
        speed2_min: f64::INFINITY,
        speed2_max: f64::NEG_INFINITY,
    };

    #[inline]
    pub fn observe(&mut self, density: f64, speed2: f64) {
        self.density_min = self.density_min.min(density);
        self.density_max = self.density_max.max(density);
        self.speed2_min = self.speed2_min.min(speed2);
        self.speed2_max = self.speed2_max.max(speed2);
    }

    pub fn merge(&mut self, other: &SlabStats) {
        self.density_min = self.density_min.min(other.density_min);
        self.density_max = self.density_max.max(other.density_max);
        self.speed2_min = self.speed2_min.min(other.speed2_min);
        self.speed2_max = self.speed2_max.max(other.speed2_max);
    }

    pub fn merged(mut self, other: SlabStats) -> SlabStats {
        self.merge(&other);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.density_min > self.density_max
    }
}

impl Default for SlabStats {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[inline]
fn face_slot(dirs: &[Direction; FACE_COMPONENTS], d: Direction) -> Option<usize> {
    dirs.iter().position(|&o| o == d)
}

fn collide_run(cells: &mut [LatticeCell], relaxation: f64) -> SlabStats {
    let mut stats = SlabStats::EMPTY;
    for c in cells {
        if c.solid {
            c.bounce_back();
        } else {
            let (rho, u2) = c.collide(relaxation);
            stats.observe(rho, u2);
        }
    }
    stats
}

/// Lattice storage for one slab plus its two halo planes.
#[derive(Clone, Debug)]
pub struct Slab {
    width: usize,
    ny: usize,
    nz: usize,
    cells: Vec<LatticeCell>,
    west: HaloPlane,
    east: HaloPlane,
    faces: Faces,
    reflections: Vec<(usize, Direction, f64)>,
    stats: SlabStats,
}

impl Slab {
    /// Allocate a `width × ny × nz` slab at rest with the given density.
    pub fn new(
        width: usize,
        ny: usize,
        nz: usize,
        density: f64,
        faces: Faces,
    ) -> Result<Self, LbmError> {
        let n = width * ny * nz;
        if n == 0 {
            return Err(LbmError::EmptyOccupancy([width, ny, nz]));
        }
        let mut cells = Vec::new();
        cells
            .try_reserve_exact(n)
            .map_err(|_| LbmError::Allocation { cells: n })?;
        cells.resize(n, LatticeCell::at_rest(density));
        Ok(Self {
            width,
            ny,
            nz,
            cells,
            west: HaloPlane::new(ny, nz),
            east: HaloPlane::new(ny, nz),
            faces,
            reflections: Vec::new(),
            stats: SlabStats::EMPTY,
        })
    }

    #[inline]
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.width, self.ny, self.nz)
    }

    #[inline]
    pub fn faces(&self) -> Faces {
        self.faces
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (x * self.ny + y) * self.nz + z
    }

    #[inline]
    fn coords(&self, idx: usize) -> (usize, usize, usize) {
        let z = idx % self.nz;
        let rest = idx / self.nz;
        (rest / self.ny, rest % self.ny, z)
    }

    #[inline]
    pub fn contains(&self, x: usize, y: usize, z: usize) -> bool {
        x < self.width && y < self.ny && z < self.nz
    }

    pub fn cell(&self, x: usize, y: usize, z: usize) -> Option<&LatticeCell> {
        if self.contains(x, y, z) {
            Some(&self.cells[self.index(x, y, z)])
        } else {
            None
        }
    }

    pub fn cell_mut(&mut self, x: usize, y: usize, z: usize) -> Option<&mut LatticeCell> {
        if self.contains(x, y, z) {
            let i = self.index(x, y, z);
            Some(&mut self.cells[i])
        } else {
            None
        }
    }

    pub fn cells(&self) -> &[LatticeCell] {
        &self.cells
    }

    /// Mark a voxel solid. Returns `false` when the coordinate is outside the
    /// slab.
    pub fn set_solid(&mut self, x: usize, y: usize, z: usize, solid: bool) -> bool {
        match self.cell_mut(x, y, z) {
            Some(c) => {
                c.solid = solid;
                true
            }
            None => false,
        }
    }

    /// Put every cell back to rest equilibrium, keeping solid flags.
    pub fn reset(&mut self, density: f64) {
        for c in &mut self.cells {
            c.reset(density);
        }
        self.stats = SlabStats::EMPTY;
    }

    pub fn halo(&self, face: Face) -> &HaloPlane {
        match face {
            Face::West => &self.west,
            Face::East => &self.east,
        }
    }

    pub fn halo_mut(&mut self, face: Face) -> &mut HaloPlane {
        match face {
            Face::West => &mut self.west,
            Face::East => &mut self.east,
        }
    }

    fn stream_cell(&mut self, d: Direction, idx: usize) {
        let (x, y, z) = self.coords(idx);
        let (dx, dy, dz) = d.offset();
        let tx = x as isize + dx as isize;
        let ty = y as isize + dy as isize;
        let tz = z as isize + dz as isize;
        let v = self.cells[idx].f[d.index()];

        if ty < 0 || tz < 0 || ty >= self.ny as isize || tz >= self.nz as isize {
            self.reflections.push((idx, d.opposite(), v));
            return;
        }
        if tx < 0 || tx >= self.width as isize {
            let face = if tx < 0 { Face::West } else { Face::East };
            match (self.faces.kind(face), face_slot(face.outbound(), d)) {
                (FaceKind::Exchange, Some(k)) => {
                    self.halo_mut(face).at_mut(ty as usize, tz as usize).f[k] = v;
                }
                _ => self.reflections.push((idx, d.opposite(), v)),
            }
            return;
        }
        let t = self.index(tx as usize, ty as usize, tz as usize);
        self.cells[t].f[d.index()] = v;
    }

    /// Stream all 18 moving components one cell along their direction.
    pub fn propagate(&mut self) {
        let n = self.cells.len();
        self.reflections.clear();
        for d in Direction::MOVING {
            if d.is_forward() {
                for idx in (0..n).rev() {
                    self.stream_cell(d, idx);
                }
            } else {
                for idx in 0..n {
                    self.stream_cell(d, idx);
                }
            }
        }
        for (idx, d, v) in self.reflections.drain(..) {
            self.cells[idx].f[d.index()] = v;
        }
    }

    /// Add a momentum increment in +x to every fluid cell of the boundary
    /// layer on `face`.
    ///
    /// Each west-going component hands `density * acceleration * w_i` to its
    /// east-going opposite (ρa/18 on the axis, ρa/36 on the diagonals), so
    /// mass is unchanged. A cell is skipped entirely when any of its five
    /// west-going components would drop below `guard`. Returns the number of
    /// cells updated.
    pub fn apply_forcing(&mut self, face: Face, density: f64, acceleration: f64, guard: f64) -> usize {
        let base = density * acceleration;
        if base.is_nan() || base <= 0.0 {
            return 0;
        }
        let increments = Direction::WESTBOUND.map(|d| base * d.weight());
        let x = match face {
            Face::West => 0,
            Face::East => self.width - 1,
        };
        let mut forced = 0;
        for (y, z) in iproduct!(0..self.ny, 0..self.nz) {
            let i = self.index(x, y, z);
            let cell = &mut self.cells[i];
            if cell.solid {
                continue;
            }
            if Direction::WESTBOUND
                .iter()
                .zip(&increments)
                .any(|(&d, &inc)| cell.get(d) - inc < guard)
            {
                continue;
            }
            for (k, &inc) in increments.iter().enumerate() {
                let (e, w) = (Direction::EASTBOUND[k], Direction::WESTBOUND[k]);
                cell.set(e, cell.get(e) + inc);
                cell.set(w, cell.get(w) - inc);
            }
            forced += 1;
        }
        forced
    }

    /// Write a plane received from the neighbour across `face` into the
    /// boundary layer on that face. Slots whose upstream cell lies outside
    /// the y/z range were never filled by the sender and are skipped; those
    /// populations arrive through edge reflection instead.
    pub fn absorb_halo(&mut self, face: Face, plane: &HaloPlane) {
        let x = match face {
            Face::West => 0,
            Face::East => self.width - 1,
        };
        let (ny, nz) = (self.ny as isize, self.nz as isize);
        for (y, z) in iproduct!(0..self.ny, 0..self.nz) {
            let i = self.index(x, y, z);
            let src = *plane.at(y, z);
            for (k, &d) in face.inbound().iter().enumerate() {
                let (_, dy, dz) = d.offset();
                let (sy, sz) = (y as isize - dy as isize, z as isize - dz as isize);
                if sy < 0 || sz < 0 || sy >= ny || sz >= nz {
                    continue;
                }
                self.cells[i].f[d.index()] = src.f[k];
            }
        }
    }

    /// BGK collision on fluid cells and bounce-back on solid cells.
    /// Returns the extrema of this pass and folds them into the running
    /// rank-local statistics.
    pub fn collide(&mut self, relaxation: f64) -> SlabStats {
        let plane = self.ny * self.nz;
        #[cfg(feature = "rayon")]
        let stats = {
            use rayon::prelude::*;
            self.cells
                .par_chunks_mut(plane)
                .map(|p| collide_run(p, relaxation))
                .reduce(|| SlabStats::EMPTY, SlabStats::merged)
        };
        #[cfg(not(feature = "rayon"))]
        let stats = self
            .cells
            .chunks_mut(plane)
            .map(|p| collide_run(p, relaxation))
            .fold(SlabStats::EMPTY, SlabStats::merged);
        self.stats.merge(&stats);
        stats
    }

    pub fn stats(&self) -> SlabStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = SlabStats::EMPTY;
    }

    /// Sum of every distribution value in the slab, solid cells included.
    pub fn total_mass(&self) -> f64 {
        self.cells.iter().map(LatticeCell::mass).sum()
    }

    /// Sum of distribution values over fluid cells only.
    pub fn fluid_mass(&self) -> f64 {
        self.cells
            .iter()
            .filter(|c| !c.solid)
            .map(LatticeCell::mass)
            .sum()
    }

    pub fn sample(&self, x: usize, y: usize, z: usize) -> Option<CellSample> {
        self.cell(x, y, z).map(LatticeCell::sample)
    }
}

impl DebugInvariants for Slab {
    const CONTEXT: &'static str = "Slab";

    /// Holds right after a collision step: every fluid cell's stored density
    /// equals the sum of its distribution values.
    fn validate_invariants(&self) -> Result<(), LbmError> {
        for (idx, c) in self.cells.iter().enumerate() {
            if c.solid {
                continue;
            }
            let m = c.mass();
            if (m - c.density).abs() > 1e-12 * m.abs().max(1.0) {
                let (x, y, z) = self.coords(idx);
                return Err(LbmError::Invariant(format!(
                    "cell ({x},{y},{z}) density {} != sum(f) {m}",
                    c.density
                )));
            }
        }
        Ok(())
    }
}
