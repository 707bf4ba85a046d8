//! Probe definitions and their lattice-space mapping.
//!
//! A probe is kept twice: the world-space descriptor as the user supplied it,
//! and the lattice nodes derived from it for the current domain. Reloading
//! the domain re-derives the nodes from the world-space copy.

use serde::{Deserialize, Serialize};

use crate::domain::{DomainDescriptor, LatticeCoord};
use crate::lattice::{CellSample, CS2};
use crate::lbm_error::LbmError;

pub type ProbeId = u32;

/// Physical quantity a probe reports.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleType {
    Density,
    /// Velocity magnitude.
    Velocity,
    /// `density * c_s²` in lattice units.
    Pressure,
}

impl SampleType {
    /// Scalar value of one sample. Solid cells report zero.
    pub fn scalar(self, s: &CellSample) -> f64 {
        if s.solid {
            return 0.0;
        }
        match self {
            SampleType::Density => s.density,
            SampleType::Velocity => s.speed2().sqrt(),
            SampleType::Pressure => s.density * CS2,
        }
    }
}

/// World-space probe geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ProbeGeometry {
    Point {
        position: [f64; 3],
    },
    /// Parallelogram `origin + s*u + t*v` with `s, t` in `[0, 1]`.
    Plane {
        origin: [f64; 3],
        u: [f64; 3],
        v: [f64; 3],
        resolution: [usize; 2],
    },
    Volume {
        min: [f64; 3],
        max: [f64; 3],
        resolution: [usize; 3],
    },
    /// Streamline ribbon. `width` and `step_length` are in lattice cells.
    Ribbon {
        seed: [f64; 3],
        width: f64,
        max_steps: usize,
        step_length: f64,
    },
    Glyph {
        min: [f64; 3],
        max: [f64; 3],
        resolution: [usize; 3],
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProbeDescriptor {
    pub id: ProbeId,
    pub sample: SampleType,
    pub geometry: ProbeGeometry,
}

fn finite(p: &[f64; 3]) -> bool {
    p.iter().all(|v| v.is_finite())
}

fn invalid(id: ProbeId, what: &str) -> LbmError {
    LbmError::InvalidProbe(format!("probe {id}: {what}"))
}

/// `i`-th of `n` evenly spaced parameters in `[0, 1]`.
#[inline]
fn along(i: usize, n: usize) -> f64 {
    if n <= 1 { 0.5 } else { i as f64 / (n - 1) as f64 }
}

fn box_points(min: [f64; 3], max: [f64; 3], res: [usize; 3]) -> Vec<[f64; 3]> {
    let mut pts = Vec::with_capacity(res.iter().product());
    for i in 0..res[0] {
        for j in 0..res[1] {
            for k in 0..res[2] {
                let t = [along(i, res[0]), along(j, res[1]), along(k, res[2])];
                pts.push([
                    min[0] + t[0] * (max[0] - min[0]),
                    min[1] + t[1] * (max[1] - min[1]),
                    min[2] + t[2] * (max[2] - min[2]),
                ]);
            }
        }
    }
    pts
}

impl ProbeDescriptor {
    pub fn validate(&self) -> Result<(), LbmError> {
        let id = self.id;
        match &self.geometry {
            ProbeGeometry::Point { position } => {
                if !finite(position) {
                    return Err(invalid(id, "non-finite position"));
                }
            }
            ProbeGeometry::Plane {
                origin,
                u,
                v,
                resolution,
            } => {
                if !finite(origin) || !finite(u) || !finite(v) {
                    return Err(invalid(id, "non-finite plane"));
                }
                if resolution.contains(&0) {
                    return Err(invalid(id, "zero plane resolution"));
                }
            }
            ProbeGeometry::Volume {
                min,
                max,
                resolution,
            }
            | ProbeGeometry::Glyph {
                min,
                max,
                resolution,
            } => {
                if !finite(min) || !finite(max) {
                    return Err(invalid(id, "non-finite box"));
                }
                if (0..3).any(|a| min[a] > max[a]) {
                    return Err(invalid(id, "box min exceeds max"));
                }
                if resolution.contains(&0) {
                    return Err(invalid(id, "zero box resolution"));
                }
            }
            ProbeGeometry::Ribbon {
                seed,
                width,
                max_steps,
                step_length,
            } => {
                if !finite(seed) {
                    return Err(invalid(id, "non-finite seed"));
                }
                if !width.is_finite() || *width < 0.0 {
                    return Err(invalid(id, "negative ribbon width"));
                }
                if !step_length.is_finite() || *step_length <= 0.0 {
                    return Err(invalid(id, "step length must be positive"));
                }
                if *max_steps == 0 {
                    return Err(invalid(id, "ribbon needs at least one step"));
                }
            }
        }
        Ok(())
    }

    /// World-space sample points of grid-shaped probes, in output order.
    /// Ribbons have none; they are traced instead.
    pub fn sample_points(&self) -> Vec<[f64; 3]> {
        match &self.geometry {
            ProbeGeometry::Point { position } => vec![*position],
            ProbeGeometry::Plane {
                origin,
                u,
                v,
                resolution,
            } => {
                let mut pts = Vec::with_capacity(resolution[0] * resolution[1]);
                for i in 0..resolution[0] {
                    let s = along(i, resolution[0]);
                    for j in 0..resolution[1] {
                        let t = along(j, resolution[1]);
                        pts.push([
                            origin[0] + s * u[0] + t * v[0],
                            origin[1] + s * u[1] + t * v[1],
                            origin[2] + s * u[2] + t * v[2],
                        ]);
                    }
                }
                pts
            }
            ProbeGeometry::Volume {
                min,
                max,
                resolution,
            }
            | ProbeGeometry::Glyph {
                min,
                max,
                resolution,
            } => box_points(*min, *max, *resolution),
            ProbeGeometry::Ribbon { .. } => Vec::new(),
        }
    }

    /// Output grid shape of grid-shaped probes.
    pub fn grid_dims(&self) -> [usize; 3] {
        match &self.geometry {
            ProbeGeometry::Point { .. } | ProbeGeometry::Ribbon { .. } => [1, 1, 1],
            ProbeGeometry::Plane { resolution, .. } => [resolution[0], resolution[1], 1],
            ProbeGeometry::Volume { resolution, .. } | ProbeGeometry::Glyph { resolution, .. } => {
                *resolution
            }
        }
    }
}

/// A registered probe with its cached lattice mapping.
#[derive(Clone, Debug, PartialEq)]
pub struct SavedProbe {
    pub descriptor: ProbeDescriptor,
    /// Lattice node of every sample point; `None` outside the lattice.
    pub nodes: Vec<Option<LatticeCoord>>,
    /// Continuous lattice position of a ribbon seed.
    pub seed: Option<[f64; 3]>,
}

impl SavedProbe {
    pub fn new(descriptor: ProbeDescriptor) -> Result<Self, LbmError> {
        descriptor.validate()?;
        Ok(Self {
            descriptor,
            nodes: Vec::new(),
            seed: None,
        })
    }

    pub fn id(&self) -> ProbeId {
        self.descriptor.id
    }

    pub fn is_mapped(&self) -> bool {
        self.seed.is_some() || !self.nodes.is_empty()
    }

    /// Derive lattice coordinates for `domain` from the world-space copy.
    pub fn map_to(&mut self, domain: &DomainDescriptor) {
        match &self.descriptor.geometry {
            ProbeGeometry::Ribbon { seed, .. } => {
                self.nodes.clear();
                self.seed = Some(domain.world_to_lattice(*seed));
            }
            _ => {
                self.seed = None;
                self.nodes = self
                    .descriptor
                    .sample_points()
                    .into_iter()
                    .map(|p| domain.node_at(domain.world_to_lattice(p)))
                    .collect();
            }
        }
    }

    pub fn unmap(&mut self) {
        self.nodes.clear();
        self.seed = None;
    }
}

/// What one probe returned on its last sampling pass.
#[derive(Clone, Debug, PartialEq)]
pub enum ProbeResult {
    /// Scalars on a regular grid, x-major over `dims`.
    Grid { dims: [usize; 3], values: Vec<f64> },
    /// Edge positions of the ribbon at every station plus the scalar at its
    /// centre line. `breaks` lists stations where the ribbon was cut and
    /// restarted.
    Ribbon {
        left: Vec<[f64; 3]>,
        right: Vec<[f64; 3]>,
        values: Vec<f64>,
        breaks: Vec<usize>,
    },
    /// World positions with the velocity found there.
    Glyphs {
        positions: Vec<[f64; 3]>,
        vectors: Vec<[f64; 3]>,
    },
}
