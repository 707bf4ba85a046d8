//! Global-to-local partition of the lattice.
//!
//! The scaled occupancy box is centered inside a padded lattice whose every
//! axis length is even, and the x axis is split into one slab per worker
//! rank. Rank 0 is the orchestrator and owns no cells; worker `w` is rank
//! `w + 1`. The last worker absorbs the remainder of the division.

use serde::{Deserialize, Serialize};

use super::occupancy::WorldBounds;
use crate::debug_invariants::DebugInvariants;
use crate::lbm_error::LbmError;

/// A node in global lattice coordinates.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LatticeCoord {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl LatticeCoord {
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }
}

/// One worker's slab: `[start, start + width)` along x.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SlabExtent {
    pub rank: usize,
    pub start: usize,
    pub width: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DomainDescriptor {
    /// Lattice dimensions `(dim_x, dim_y, dim_z)`.
    pub dim: [usize; 3],
    pub slice_width: usize,
    pub slice_last_width: usize,
    pub workers: usize,
    /// Padding offsets `(x_sub, y_sub, z_sub)` of the occupied box.
    pub sub: [usize; 3],
    /// Size of the occupied box in lattice nodes.
    pub extent: [usize; 3],
    /// Occupancy grid dimensions the descriptor was built from.
    pub grid: [usize; 3],
    pub scale: [f64; 3],
    pub bounds: WorldBounds,
}

const SCALE_NAMES: [&str; 3] = ["scale_x", "scale_y", "scale_z"];

impl DomainDescriptor {
    /// Compute lattice dimensions and the slab partition for `nranks` total
    /// ranks (orchestrator included).
    pub fn compute(
        grid: [usize; 3],
        scale: [f64; 3],
        padding: [usize; 3],
        bounds: WorldBounds,
        nranks: usize,
    ) -> Result<Self, LbmError> {
        if nranks < 2 {
            return Err(LbmError::TooFewRanks(nranks));
        }
        if grid.contains(&0) {
            return Err(LbmError::EmptyOccupancy(grid));
        }
        for a in 0..3 {
            if !scale[a].is_finite() || scale[a] <= 0.0 {
                return Err(LbmError::InvalidParameter {
                    name: SCALE_NAMES[a],
                    value: scale[a],
                });
            }
        }
        let mut extent = [0usize; 3];
        let mut dim = [0usize; 3];
        let mut sub = [0usize; 3];
        for a in 0..3 {
            extent[a] = ((grid[a] as f64 * scale[a]).ceil() as usize).max(1);
            dim[a] = extent[a] + 2 * padding[a];
            if dim[a] % 2 == 1 {
                dim[a] += 1;
            }
            sub[a] = (dim[a] - extent[a]) / 2;
        }
        let workers = nranks - 1;
        if dim[0] < workers {
            return Err(LbmError::DomainTooSmall {
                dim_x: dim[0],
                workers,
            });
        }
        let slice_width = dim[0] / workers;
        let slice_last_width = dim[0] - slice_width * (workers - 1);
        let d = Self {
            dim,
            slice_width,
            slice_last_width,
            workers,
            sub,
            extent,
            grid,
            scale,
            bounds,
        };
        d.debug_assert_invariants();
        Ok(d)
    }

    #[inline]
    pub fn rank_of_worker(worker: usize) -> usize {
        worker + 1
    }

    pub fn slab_width(&self, worker: usize) -> usize {
        if worker + 1 == self.workers {
            self.slice_last_width
        } else {
            self.slice_width
        }
    }

    pub fn slabs(&self) -> impl Iterator<Item = SlabExtent> + '_ {
        (0..self.workers).map(|w| SlabExtent {
            rank: Self::rank_of_worker(w),
            start: w * self.slice_width,
            width: self.slab_width(w),
        })
    }

    pub fn contains(&self, c: LatticeCoord) -> bool {
        c.x < self.dim[0] && c.y < self.dim[1] && c.z < self.dim[2]
    }

    /// Owning rank and local x of a global node.
    pub fn owner(&self, c: LatticeCoord) -> Option<(usize, usize)> {
        if !self.contains(c) {
            return None;
        }
        let w = (c.x / self.slice_width).min(self.workers - 1);
        Some((Self::rank_of_worker(w), c.x - w * self.slice_width))
    }

    /// Continuous lattice position of a world-space point.
    pub fn world_to_lattice(&self, p: [f64; 3]) -> [f64; 3] {
        let span = self.bounds.span();
        let mut out = [0.0; 3];
        for a in 0..3 {
            out[a] = self.sub[a] as f64 + (p[a] - self.bounds.min[a]) / span[a] * self.extent[a] as f64;
        }
        out
    }

    pub fn lattice_to_world(&self, p: [f64; 3]) -> [f64; 3] {
        let span = self.bounds.span();
        let mut out = [0.0; 3];
        for a in 0..3 {
            out[a] = self.bounds.min[a] + (p[a] - self.sub[a] as f64) / self.extent[a] as f64 * span[a];
        }
        out
    }

    /// The node containing a continuous lattice position, if inside.
    pub fn node_at(&self, p: [f64; 3]) -> Option<LatticeCoord> {
        if p.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return None;
        }
        let c = LatticeCoord::new(p[0] as usize, p[1] as usize, p[2] as usize);
        self.contains(c).then_some(c)
    }

    /// Occupancy voxel that a lattice node samples, if it lies inside the
    /// occupied box.
    pub fn voxel_of(&self, c: LatticeCoord) -> Option<[usize; 3]> {
        let n = [c.x, c.y, c.z];
        let mut v = [0usize; 3];
        for a in 0..3 {
            if n[a] < self.sub[a] || n[a] >= self.sub[a] + self.extent[a] {
                return None;
            }
            v[a] = (((n[a] - self.sub[a]) as f64) / self.scale[a]) as usize;
            if v[a] >= self.grid[a] {
                return None;
            }
        }
        Some(v)
    }

    pub fn cell_count(&self) -> usize {
        self.dim[0] * self.dim[1] * self.dim[2]
    }
}

impl DebugInvariants for DomainDescriptor {
    const CONTEXT: &'static str = "DomainDescriptor";

    fn validate_invariants(&self) -> Result<(), LbmError> {
        let covered: usize = self.slabs().map(|s| s.width).sum();
        if covered != self.dim[0] {
            return Err(LbmError::Invariant(format!(
                "slab widths sum to {covered}, dim_x is {}",
                self.dim[0]
            )));
        }
        if let Some(a) = self.dim.iter().position(|d| d % 2 == 1) {
            return Err(LbmError::Invariant(format!("axis {a} has odd length {}", self.dim[a])));
        }
        if self.slabs().any(|s| s.width == 0) {
            return Err(LbmError::Invariant("empty slab".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn unit(grid: [usize; 3]) -> WorldBounds {
        WorldBounds::unit_voxels(grid)
    }

    #[test]
    fn cavity_partition_on_three_workers() {
        let d = DomainDescriptor::compute([50, 50, 50], [1.0; 3], [0; 3], unit([50; 3]), 4).unwrap();
        assert_eq!(d.dim, [50, 50, 50]);
        assert_eq!(d.slice_width, 16);
        assert_eq!(d.slice_last_width, 18);
        assert_eq!(d.owner(LatticeCoord::new(49, 0, 0)), Some((3, 17)));
        assert_eq!(d.owner(LatticeCoord::new(16, 0, 0)), Some((2, 0)));
        assert_eq!(d.owner(LatticeCoord::new(50, 0, 0)), None);
    }

    #[test]
    fn odd_axes_are_padded_to_even() {
        let d = DomainDescriptor::compute([7, 9, 10], [1.0; 3], [1, 0, 0], unit([7, 9, 10]), 3).unwrap();
        assert_eq!(d.dim, [10, 10, 10]);
        assert_eq!(d.sub, [1, 0, 0]);
    }

    #[test]
    fn rejects_bad_input() {
        let b = unit([4; 3]);
        assert_eq!(
            DomainDescriptor::compute([4; 3], [1.0; 3], [0; 3], b, 1),
            Err(LbmError::TooFewRanks(1))
        );
        assert!(matches!(
            DomainDescriptor::compute([4; 3], [1.0, 0.0, 1.0], [0; 3], b, 2),
            Err(LbmError::InvalidParameter { name: "scale_y", .. })
        ));
        assert!(matches!(
            DomainDescriptor::compute([4; 3], [1.0; 3], [0; 3], b, 10),
            Err(LbmError::DomainTooSmall { .. })
        ));
    }

    #[test]
    fn world_and_lattice_maps_invert() {
        let b = WorldBounds::new([-1.0, 0.0, 2.0], [1.0, 4.0, 3.0]).unwrap();
        let d = DomainDescriptor::compute([10, 20, 6], [2.0, 1.0, 1.5], [3, 3, 3], b, 3).unwrap();
        let p = [0.25, 1.5, 2.75];
        let q = d.lattice_to_world(d.world_to_lattice(p));
        for a in 0..3 {
            assert!((p[a] - q[a]).abs() < 1e-12);
        }
    }

    #[test]
    fn voxels_map_through_scale() {
        let d = DomainDescriptor::compute([4, 4, 4], [2.0, 2.0, 2.0], [0; 3], unit([4; 3]), 2).unwrap();
        assert_eq!(d.voxel_of(LatticeCoord::new(7, 0, 3)), Some([3, 0, 1]));
    }

    proptest! {
        #[test]
        fn partition_covers_dim_x(
            gx in 1usize..120, gy in 1usize..40, gz in 1usize..40,
            px in 0usize..4, nranks in 2usize..9,
            sx in 0.5f64..2.5,
        ) {
            let grid = [gx, gy, gz];
            match DomainDescriptor::compute(grid, [sx, 1.0, 1.0], [px, 0, 1], unit(grid), nranks) {
                Ok(d) => {
                    prop_assert!(d.validate_invariants().is_ok());
                    prop_assert_eq!(d.slabs().map(|s| s.width).sum::<usize>(), d.dim[0]);
                    prop_assert!(d.dim.iter().all(|v| v % 2 == 0));
                    for x in 0..d.dim[0] {
                        let (rank, lx) = d.owner(LatticeCoord::new(x, 0, 0)).unwrap();
                        prop_assert!(lx < d.slab_width(rank - 1));
                    }
                }
                Err(LbmError::DomainTooSmall { dim_x, workers }) => prop_assert!(dim_x < workers),
                Err(e) => prop_assert!(false, "unexpected error {e}"),
            }
        }
    }
}
