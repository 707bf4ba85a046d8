//! Ribbon integration along the local velocity field.
//!
//! Integration runs in continuous lattice coordinates with explicit Euler
//! steps. At every station the velocity of the containing node and of its
//! six axis neighbours is fetched in one batch; the neighbours give the curl
//! by central differences. The ribbon's cross direction is the part of the
//! curl perpendicular to the heading. Where that part is negligible the
//! previous cross direction is carried on instead, twisted by half the
//! streamwise vorticity over the step's travel time and re-orthogonalised
//! against the new heading.
//!
//! All magnitude tests compare squared magnitudes against squared
//! tolerances.

use super::probe::SampleType;
use super::remote::CellSource;
use crate::domain::{DomainDescriptor, LatticeCoord};
use crate::lattice::CellSample;
use crate::lbm_error::LbmError;

/// Below this speed the streamline stops.
pub const VELOCITY_FLOOR: f64 = 1e-9;
/// Cross-flow vorticity below this fraction of the speed (per lattice unit)
/// gives no usable direction, and the previous cross vector is carried on.
/// When that carried vector, re-orthogonalised, is shorter than this the
/// heading turned too sharply; the ribbon is cut and reseeded.
pub const RIBBON_CUT: f64 = 1e-3;

type V3 = [f64; 3];

#[inline]
fn dot(a: V3, b: V3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
fn cross(a: V3, b: V3) -> V3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
fn scale(a: V3, s: f64) -> V3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

#[inline]
fn add(a: V3, b: V3) -> V3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
fn sub(a: V3, b: V3) -> V3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Why tracing ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    MaxSteps,
    Stalled,
    Solid,
    Exited,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RibbonParams {
    pub width: f64,
    pub max_steps: usize,
    pub step_length: f64,
    pub sample: SampleType,
}

/// Traced ribbon in world space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ribbon {
    pub left: Vec<V3>,
    pub right: Vec<V3>,
    pub values: Vec<f64>,
    pub breaks: Vec<usize>,
    pub stop: Option<StopReason>,
}

impl Ribbon {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Any unit vector perpendicular to unit `t`.
fn perpendicular(t: V3) -> V3 {
    let a = t.map(f64::abs);
    let axis = if a[0] <= a[1] && a[0] <= a[2] {
        [1.0, 0.0, 0.0]
    } else if a[1] <= a[2] {
        [0.0, 1.0, 0.0]
    } else {
        [0.0, 0.0, 1.0]
    };
    let p = cross(t, axis);
    scale(p, 1.0 / dot(p, p).sqrt())
}

/// Rotate `v` about unit axis `k` by `angle` (Rodrigues).
fn rotate(v: V3, k: V3, angle: f64) -> V3 {
    let (s, c) = angle.sin_cos();
    add(
        add(scale(v, c), scale(cross(k, v), s)),
        scale(k, dot(k, v) * (1.0 - c)),
    )
}

/// The node and its six axis neighbours, clamped to the lattice. Returns the
/// stencil plus, per axis, the lattice distance between the `+` and `-`
/// samples.
fn stencil(domain: &DomainDescriptor, n: LatticeCoord) -> ([LatticeCoord; 7], [f64; 3]) {
    let mut nodes = [n; 7];
    let mut span = [0.0; 3];
    let c = [n.x, n.y, n.z];
    for a in 0..3 {
        let mut lo = c;
        let mut hi = c;
        if c[a] > 0 {
            lo[a] -= 1;
        }
        if c[a] + 1 < domain.dim[a] {
            hi[a] += 1;
        }
        span[a] = (hi[a] - lo[a]) as f64;
        nodes[1 + 2 * a] = LatticeCoord::new(hi[0], hi[1], hi[2]);
        nodes[2 + 2 * a] = LatticeCoord::new(lo[0], lo[1], lo[2]);
    }
    (nodes, span)
}

fn velocity(s: &CellSample) -> V3 {
    if s.solid { [0.0; 3] } else { s.velocity }
}

/// Curl of the velocity field from a [`stencil`] batch.
fn curl(samples: &[CellSample], span: [f64; 3]) -> V3 {
    // d[a][b] = d u_b / d x_a
    let mut d = [[0.0; 3]; 3];
    for a in 0..3 {
        if span[a] > 0.0 {
            let hi = velocity(&samples[1 + 2 * a]);
            let lo = velocity(&samples[2 + 2 * a]);
            for b in 0..3 {
                d[a][b] = (hi[b] - lo[b]) / span[a];
            }
        }
    }
    [d[1][2] - d[2][1], d[2][0] - d[0][2], d[0][1] - d[1][0]]
}

/// Trace a ribbon from `seed` (continuous lattice position).
pub fn trace<S: CellSource>(
    source: &mut S,
    domain: &DomainDescriptor,
    seed: V3,
    params: RibbonParams,
) -> Result<Ribbon, LbmError> {
    let half = 0.5 * params.width;
    let mut ribbon = Ribbon::default();
    let mut pos = seed;
    let mut side: Option<V3> = None;

    for _ in 0..params.max_steps {
        let Some(node) = domain.node_at(pos) else {
            ribbon.stop = Some(StopReason::Exited);
            return Ok(ribbon);
        };
        let (nodes, span) = stencil(domain, node);
        let samples = source.read(&nodes)?;
        let here = samples[0];
        if here.solid {
            ribbon.stop = Some(StopReason::Solid);
            return Ok(ribbon);
        }
        let u = here.velocity;
        let speed2 = dot(u, u);
        if !speed2.is_finite() || speed2 < VELOCITY_FLOOR * VELOCITY_FLOOR {
            ribbon.stop = Some(StopReason::Stalled);
            return Ok(ribbon);
        }
        let speed = speed2.sqrt();
        let t = scale(u, 1.0 / speed);

        let w = curl(&samples, span);
        let across = sub(w, scale(t, dot(w, t)));
        let across2 = dot(across, across);
        let n = if across2 >= RIBBON_CUT * RIBBON_CUT * speed2 {
            scale(across, 1.0 / across2.sqrt())
        } else {
            match side {
                None => perpendicular(t),
                Some(prev) => {
                    let dt = params.step_length / speed;
                    let twisted = rotate(prev, t, 0.5 * dot(w, t) * dt);
                    let ortho = sub(twisted, scale(t, dot(twisted, t)));
                    let len2 = dot(ortho, ortho);
                    if len2 < RIBBON_CUT * RIBBON_CUT {
                        ribbon.breaks.push(ribbon.len());
                        perpendicular(t)
                    } else {
                        scale(ortho, 1.0 / len2.sqrt())
                    }
                }
            }
        };
        side = Some(n);

        let offset = scale(n, half);
        ribbon.left.push(domain.lattice_to_world(sub(pos, offset)));
        ribbon.right.push(domain.lattice_to_world(add(pos, offset)));
        ribbon.values.push(params.sample.scalar(&here));

        pos = add(pos, scale(t, params.step_length));
    }
    ribbon.stop = Some(StopReason::MaxSteps);
    Ok(ribbon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorldBounds;
    use crate::lattice::{Faces, Slab};

    fn uniform_flow(n: usize, u: V3) -> (Slab, DomainDescriptor) {
        let mut slab = Slab::new(n, n, n, 1.0, Faces::CLOSED).unwrap();
        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    slab.cell_mut(x, y, z).unwrap().velocity = u;
                }
            }
        }
        let d = DomainDescriptor::compute([n; 3], [1.0; 3], [0; 3], WorldBounds::unit_voxels([n; 3]), 2)
            .unwrap();
        (slab, d)
    }

    fn params(max_steps: usize) -> RibbonParams {
        RibbonParams {
            width: 1.0,
            max_steps,
            step_length: 0.5,
            sample: SampleType::Velocity,
        }
    }

    #[test]
    fn straight_flow_gives_a_flat_ribbon() {
        let (mut slab, d) = uniform_flow(10, [0.1, 0.0, 0.0]);
        let r = trace(&mut slab, &d, [1.5, 5.5, 5.5], params(6)).unwrap();
        assert_eq!(r.stop, Some(StopReason::MaxSteps));
        assert_eq!(r.len(), 6);
        assert!(r.breaks.is_empty());
        for i in 0..r.len() {
            let w = sub(r.right[i], r.left[i]);
            assert!((dot(w, w) - 1.0).abs() < 1e-12);
            assert!(w[0].abs() < 1e-12);
            assert!((r.values[i] - 0.1).abs() < 1e-12);
        }
        assert!((r.left[5][0] - r.left[0][0] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn shear_flow_ribbon_spans_the_vorticity() {
        // u_x grows with z, so the curl points along +y
        let (mut slab, d) = uniform_flow(20, [0.0; 3]);
        for x in 0..20 {
            for y in 0..20 {
                for z in 0..20 {
                    let ux = 0.1 + 0.01 * (z as f64 - 10.0);
                    slab.cell_mut(x, y, z).unwrap().velocity = [ux, 0.0, 0.0];
                }
            }
        }
        let (nodes, span) = stencil(&d, LatticeCoord::new(4, 10, 10));
        let w = curl(&slab.read(&nodes).unwrap(), span);
        assert!((w[1] - 0.01).abs() < 1e-12 && w[0] == 0.0 && w[2] == 0.0);

        let r = trace(&mut slab, &d, [2.0, 10.0, 10.0], params(8)).unwrap();
        assert_eq!(r.stop, Some(StopReason::MaxSteps));
        assert_eq!(r.len(), 8);
        assert!(r.breaks.is_empty());
        for i in 0..r.len() {
            let across = sub(r.right[i], r.left[i]);
            assert!((across[1] - 1.0).abs() < 1e-12, "station {i}: {across:?}");
            assert!(across[0].abs() < 1e-12 && across[2].abs() < 1e-12, "station {i}: {across:?}");
        }
    }

    #[test]
    fn leaving_the_lattice_stops_tracing() {
        let (mut slab, d) = uniform_flow(6, [0.0, 0.0, -0.2]);
        let r = trace(&mut slab, &d, [3.0, 3.0, 1.0], params(100)).unwrap();
        assert_eq!(r.stop, Some(StopReason::Exited));
        assert_eq!(r.len(), 3);
    }

    #[test]
    fn still_fluid_stalls_immediately() {
        let (mut slab, d) = uniform_flow(6, [0.0; 3]);
        let r = trace(&mut slab, &d, [3.0, 3.0, 3.0], params(10)).unwrap();
        assert_eq!(r.stop, Some(StopReason::Stalled));
        assert!(r.is_empty());
    }

    #[test]
    fn solid_cells_stop_tracing() {
        let (mut slab, d) = uniform_flow(6, [0.1, 0.0, 0.0]);
        slab.set_solid(4, 2, 2, true);
        let r = trace(&mut slab, &d, [1.2, 2.5, 2.5], params(20)).unwrap();
        assert_eq!(r.stop, Some(StopReason::Solid));
        assert_eq!(r.len(), 6);
    }

    #[test]
    fn rigid_rotation_curl_is_twice_the_angular_rate() {
        // u = omega x r about the z axis through (5, 5)
        let (mut slab, d) = uniform_flow(11, [0.0; 3]);
        let omega = 0.01;
        for x in 0..11 {
            for y in 0..11 {
                for z in 0..11 {
                    let (rx, ry) = (x as f64 - 5.0, y as f64 - 5.0);
                    slab.cell_mut(x, y, z).unwrap().velocity = [-omega * ry, omega * rx, 0.0];
                }
            }
        }
        let (nodes, span) = stencil(&d, LatticeCoord::new(5, 5, 5));
        let samples = slab.read(&nodes).unwrap();
        let w = curl(&samples, span);
        assert!(w[0].abs() < 1e-15 && w[1].abs() < 1e-15);
        assert!((w[2] - 2.0 * omega).abs() < 1e-15);
    }

    #[test]
    fn rotation_preserves_length_and_axis() {
        let k = [0.0, 0.0, 1.0];
        let v = rotate([1.0, 0.0, 0.0], k, std::f64::consts::FRAC_PI_2);
        assert!((v[1] - 1.0).abs() < 1e-15 && v[0].abs() < 1e-15);
        let p = perpendicular([0.6, 0.8, 0.0]);
        assert!(dot(p, [0.6, 0.8, 0.0]).abs() < 1e-15);
        assert!((dot(p, p) - 1.0).abs() < 1e-15);
    }
}
