//! The voxelizer hand-off: a 3D solid/void grid plus the physical corners of
//! the region it covers.

use crate::lbm_error::LbmError;

/// Physical min/max corners of the occupied region.
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WorldBounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl WorldBounds {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Result<Self, LbmError> {
        const NAMES: [&str; 3] = ["bounds_x", "bounds_y", "bounds_z"];
        for a in 0..3 {
            let span = max[a] - min[a];
            if !span.is_finite() || span <= 0.0 {
                return Err(LbmError::InvalidParameter {
                    name: NAMES[a],
                    value: span,
                });
            }
        }
        Ok(Self { min, max })
    }

    /// Unit cube bounds matching grid dimensions one to one.
    pub fn unit_voxels(dims: [usize; 3]) -> Self {
        Self {
            min: [0.0; 3],
            max: [dims[0] as f64, dims[1] as f64, dims[2] as f64],
        }
    }

    #[inline]
    pub fn span(&self) -> [f64; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

/// Dense boolean occupancy, x-major like the lattice itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OccupancyGrid {
    dims: [usize; 3],
    solid: Vec<bool>,
}

impl OccupancyGrid {
    /// An all-void grid.
    pub fn new(dims: [usize; 3]) -> Result<Self, LbmError> {
        if dims.contains(&0) {
            return Err(LbmError::EmptyOccupancy(dims));
        }
        Ok(Self {
            dims,
            solid: vec![false; dims[0] * dims[1] * dims[2]],
        })
    }

    pub fn from_vec(dims: [usize; 3], solid: Vec<bool>) -> Result<Self, LbmError> {
        if dims.contains(&0) {
            return Err(LbmError::EmptyOccupancy(dims));
        }
        let expected = dims[0] * dims[1] * dims[2];
        if solid.len() != expected {
            return Err(LbmError::OccupancyShape {
                expected,
                actual: solid.len(),
            });
        }
        Ok(Self { dims, solid })
    }

    /// Empty channel with every voxel on a y or z boundary face marked solid.
    pub fn cavity(dims: [usize; 3]) -> Result<Self, LbmError> {
        let mut g = Self::new(dims)?;
        let [nx, ny, nz] = dims;
        for x in 0..nx {
            for y in 0..ny {
                for z in 0..nz {
                    if y == 0 || z == 0 || y + 1 == ny || z + 1 == nz {
                        g.set(x, y, z, true);
                    }
                }
            }
        }
        Ok(g)
    }

    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    #[inline]
    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (x * self.dims[1] + y) * self.dims[2] + z
    }

    /// Out-of-range voxels read as void.
    pub fn get(&self, x: usize, y: usize, z: usize) -> bool {
        if x < self.dims[0] && y < self.dims[1] && z < self.dims[2] {
            self.solid[self.index(x, y, z)]
        } else {
            false
        }
    }

    pub fn set(&mut self, x: usize, y: usize, z: usize, solid: bool) {
        if x < self.dims[0] && y < self.dims[1] && z < self.dims[2] {
            let i = self.index(x, y, z);
            self.solid[i] = solid;
        }
    }

    pub fn solid_count(&self) -> usize {
        self.solid.iter().filter(|s| **s).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cavity_marks_only_yz_faces() {
        let g = OccupancyGrid::cavity([4, 4, 4]).unwrap();
        assert!(g.get(0, 0, 2));
        assert!(g.get(3, 2, 3));
        assert!(!g.get(0, 1, 1));
        assert!(!g.get(3, 2, 2));
        // 4 x (16 - 4 interior)
        assert_eq!(g.solid_count(), 4 * 12);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let err = OccupancyGrid::from_vec([2, 2, 2], vec![false; 7]).unwrap_err();
        assert_eq!(
            err,
            LbmError::OccupancyShape {
                expected: 8,
                actual: 7
            }
        );
        assert!(OccupancyGrid::new([0, 3, 3]).is_err());
    }

    #[test]
    fn degenerate_bounds_are_rejected() {
        assert!(WorldBounds::new([0.0; 3], [1.0, 0.0, 1.0]).is_err());
        assert!(WorldBounds::new([0.0; 3], [1.0, 2.0, 3.0]).is_ok());
    }
}
