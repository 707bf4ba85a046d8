//! Probe registry and the sampling pass.

use hashbrown::HashMap;
use itertools::Itertools;

use super::probe::{ProbeDescriptor, ProbeGeometry, ProbeId, ProbeResult, SavedProbe};
use super::remote::{CellSource, OUTSIDE};
use super::streamline::{self, RibbonParams};
use crate::domain::{DomainDescriptor, LatticeCoord};
use crate::lattice::CellSample;
use crate::lbm_error::LbmError;

/// Registered probes and the results of the last pass.
#[derive(Debug, Default)]
pub struct SamplingEngine {
    probes: HashMap<ProbeId, SavedProbe>,
    results: HashMap<ProbeId, ProbeResult>,
}

impl SamplingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Probe ids in ascending order.
    pub fn ids(&self) -> Vec<ProbeId> {
        self.probes.keys().copied().sorted().collect()
    }

    pub fn probe(&self, id: ProbeId) -> Option<&SavedProbe> {
        self.probes.get(&id)
    }

    pub fn result(&self, id: ProbeId) -> Option<&ProbeResult> {
        self.results.get(&id)
    }

    /// Register a probe, replacing any probe with the same id together with
    /// its last result.
    pub fn insert(
        &mut self,
        descriptor: ProbeDescriptor,
        domain: Option<&DomainDescriptor>,
    ) -> Result<(), LbmError> {
        let mut probe = SavedProbe::new(descriptor)?;
        if let Some(d) = domain {
            probe.map_to(d);
        }
        let id = probe.id();
        self.results.remove(&id);
        if self.probes.insert(id, probe).is_some() {
            log::debug!("probe {id} replaced");
        }
        Ok(())
    }

    pub fn remove(&mut self, id: ProbeId) -> Result<(), LbmError> {
        self.results.remove(&id);
        self.probes
            .remove(&id)
            .map(|_| ())
            .ok_or(LbmError::UnknownProbe(id))
    }

    /// Drop every probe and result.
    pub fn clear(&mut self) {
        self.probes.clear();
        self.results.clear();
    }

    /// Re-derive lattice coordinates for a new domain. Old results are
    /// discarded.
    pub fn rescale(&mut self, domain: &DomainDescriptor) {
        self.results.clear();
        for p in self.probes.values_mut() {
            p.map_to(domain);
        }
    }

    pub fn unmap_all(&mut self) {
        self.results.clear();
        for p in self.probes.values_mut() {
            p.unmap();
        }
    }

    /// Sample one probe without storing the result.
    pub fn sample<S: CellSource>(
        &self,
        id: ProbeId,
        source: &mut S,
        domain: &DomainDescriptor,
    ) -> Result<ProbeResult, LbmError> {
        let probe = self.probes.get(&id).ok_or(LbmError::UnknownProbe(id))?;
        sample_probe(probe, source, domain)
    }

    /// Sample every probe and keep the results.
    pub fn sample_all<S: CellSource>(
        &mut self,
        source: &mut S,
        domain: &DomainDescriptor,
    ) -> Result<(), LbmError> {
        for id in self.ids() {
            let Some(probe) = self.probes.get(&id) else {
                continue;
            };
            let result = sample_probe(probe, source, domain)?;
            self.results.insert(id, result);
        }
        Ok(())
    }
}

fn sample_probe<S: CellSource>(
    probe: &SavedProbe,
    source: &mut S,
    domain: &DomainDescriptor,
) -> Result<ProbeResult, LbmError> {
    let d = &probe.descriptor;
    if !probe.is_mapped() {
        return Err(LbmError::InvalidProbe(format!("probe {} is not mapped to a domain", d.id)));
    }
    match &d.geometry {
        ProbeGeometry::Ribbon {
            width,
            max_steps,
            step_length,
            ..
        } => {
            let seed = probe
                .seed
                .ok_or_else(|| LbmError::InvalidProbe(format!("probe {} has no seed", d.id)))?;
            let params = RibbonParams {
                width: *width,
                max_steps: *max_steps,
                step_length: *step_length,
                sample: d.sample,
            };
            let r = streamline::trace(source, domain, seed, params)?;
            log::debug!("ribbon {} traced {} stations, stop {:?}", d.id, r.len(), r.stop);
            Ok(ProbeResult::Ribbon {
                left: r.left,
                right: r.right,
                values: r.values,
                breaks: r.breaks,
            })
        }
        ProbeGeometry::Point { .. } => {
            let s = match probe.nodes.first().copied().flatten() {
                Some(n) => source.read_one(n)?,
                None => OUTSIDE,
            };
            Ok(ProbeResult::Grid {
                dims: [1, 1, 1],
                values: vec![d.sample.scalar(&s)],
            })
        }
        ProbeGeometry::Glyph { .. } => {
            let samples = read_nodes(source, &probe.nodes)?;
            let positions = d.sample_points();
            let vectors = samples
                .iter()
                .map(|s| if s.solid { [0.0; 3] } else { s.velocity })
                .collect();
            Ok(ProbeResult::Glyphs { positions, vectors })
        }
        ProbeGeometry::Plane { .. } | ProbeGeometry::Volume { .. } => {
            let samples = read_nodes(source, &probe.nodes)?;
            Ok(ProbeResult::Grid {
                dims: d.grid_dims(),
                values: samples.iter().map(|s| d.sample.scalar(s)).collect(),
            })
        }
    }
}

/// Read the mapped nodes; unmapped entries come back as [`OUTSIDE`].
fn read_nodes<S: CellSource>(
    source: &mut S,
    nodes: &[Option<LatticeCoord>],
) -> Result<Vec<CellSample>, LbmError> {
    let present: Vec<LatticeCoord> = nodes.iter().flatten().copied().collect();
    let mut got = source.read(&present)?.into_iter();
    Ok(nodes
        .iter()
        .map(|n| match n {
            Some(_) => got.next().unwrap_or(OUTSIDE),
            None => OUTSIDE,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorldBounds;
    use crate::lattice::{Faces, Slab};
    use crate::sampling::probe::SampleType;

    fn setup() -> (Slab, DomainDescriptor) {
        let slab = Slab::new(8, 8, 8, 0.5, Faces::CLOSED).unwrap();
        let d = DomainDescriptor::compute([8; 3], [1.0; 3], [0; 3], WorldBounds::unit_voxels([8; 3]), 2)
            .unwrap();
        (slab, d)
    }

    fn volume(id: ProbeId) -> ProbeDescriptor {
        ProbeDescriptor {
            id,
            sample: SampleType::Pressure,
            geometry: ProbeGeometry::Volume {
                min: [0.5; 3],
                max: [7.5; 3],
                resolution: [2, 3, 4],
            },
        }
    }

    #[test]
    fn volume_probe_reports_pressure_grid() {
        let (mut slab, d) = setup();
        let mut e = SamplingEngine::new();
        e.insert(volume(1), Some(&d)).unwrap();
        e.sample_all(&mut slab, &d).unwrap();
        match e.result(1).unwrap() {
            ProbeResult::Grid { dims, values } => {
                assert_eq!(*dims, [2, 3, 4]);
                assert_eq!(values.len(), 24);
                assert!(values.iter().all(|v| (v - 0.5 / 3.0).abs() < 1e-15));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn replace_and_delete() {
        let (mut slab, d) = setup();
        let mut e = SamplingEngine::new();
        e.insert(volume(4), Some(&d)).unwrap();
        e.sample_all(&mut slab, &d).unwrap();
        let point = ProbeDescriptor {
            id: 4,
            sample: SampleType::Density,
            geometry: ProbeGeometry::Point {
                position: [2.0, 2.0, 2.0],
            },
        };
        e.insert(point, Some(&d)).unwrap();
        assert_eq!(e.len(), 1);
        assert!(e.result(4).is_none());
        assert!(matches!(e.probe(4).unwrap().descriptor.geometry, ProbeGeometry::Point { .. }));
        e.remove(4).unwrap();
        assert_eq!(e.remove(4), Err(LbmError::UnknownProbe(4)));
        assert!(e.is_empty());
    }

    #[test]
    fn glyphs_carry_solid_cells_as_zero_vectors() {
        let (mut slab, d) = setup();
        slab.cell_mut(1, 1, 1).unwrap().velocity = [0.2, 0.0, 0.0];
        slab.cell_mut(6, 6, 6).unwrap().velocity = [0.3, 0.0, 0.0];
        slab.set_solid(6, 6, 6, true);
        let mut e = SamplingEngine::new();
        let glyph = ProbeDescriptor {
            id: 9,
            sample: SampleType::Velocity,
            geometry: ProbeGeometry::Glyph {
                min: [1.5; 3],
                max: [6.5; 3],
                resolution: [2, 2, 2],
            },
        };
        e.insert(glyph, Some(&d)).unwrap();
        match e.sample(9, &mut slab, &d).unwrap() {
            ProbeResult::Glyphs { positions, vectors } => {
                assert_eq!(positions.len(), 8);
                assert_eq!(vectors[0], [0.2, 0.0, 0.0]);
                assert_eq!(vectors[7], [0.0; 3]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unmapped_probes_are_rejected() {
        let (mut slab, d) = setup();
        let mut e = SamplingEngine::new();
        e.insert(volume(2), None).unwrap();
        assert!(matches!(e.sample(2, &mut slab, &d), Err(LbmError::InvalidProbe(_))));
        e.rescale(&d);
        assert!(e.sample(2, &mut slab, &d).is_ok());
    }
}
