mod util;

use lbm_slab::comm::protocol::{self, tags, Command};
use lbm_slab::comm::{Communicator, LocalComm};
use lbm_slab::domain::{LatticeCoord, OccupancyGrid, SolverConfig};
use lbm_slab::lbm_error::LbmError;
use lbm_slab::orchestrator::Orchestrator;
use lbm_slab::rank::LocalWorld;
use lbm_slab::sampling::{ProbeDescriptor, ProbeGeometry, ProbeResult, SampleType};
use serial_test::serial;
use util::*;

fn probes() -> Vec<ProbeDescriptor> {
    vec![
        ProbeDescriptor {
            id: 1,
            sample: SampleType::Velocity,
            geometry: ProbeGeometry::Plane {
                origin: [0.5, 1.5, 3.5],
                u: [11.0, 0.0, 0.0],
                v: [0.0, 5.0, 0.0],
                resolution: [12, 6],
            },
        },
        ProbeDescriptor {
            id: 2,
            sample: SampleType::Pressure,
            geometry: ProbeGeometry::Volume {
                min: [1.0; 3],
                max: [10.0, 6.0, 6.0],
                resolution: [4, 3, 3],
            },
        },
        ProbeDescriptor {
            id: 3,
            sample: SampleType::Velocity,
            geometry: ProbeGeometry::Ribbon {
                seed: [0.5, 2.5, 2.5],
                width: 0.5,
                max_steps: 40,
                step_length: 0.25,
            },
        },
        ProbeDescriptor {
            id: 4,
            sample: SampleType::Velocity,
            geometry: ProbeGeometry::Glyph {
                min: [0.5; 3],
                max: [11.5, 6.5, 6.5],
                resolution: [3, 2, 2],
            },
        },
    ]
}

fn flowing(size: usize) -> (Orchestrator<LocalComm>, LocalWorld, LocalComm) {
    let grid = OccupancyGrid::cavity([12, 8, 8]).unwrap();
    let config = SolverConfig {
        environment: forced_env(),
        ..Default::default()
    };
    let (mut orch, world, raw) = spawn(size, config);
    orch.load_domain(&grid, unit_bounds(&grid)).unwrap();
    for p in probes() {
        orch.add_probe(p).unwrap();
    }
    for _ in 0..5 {
        orch.step().unwrap();
    }
    (orch, world, raw)
}

#[test]
#[serial]
fn resampling_without_a_step_is_idempotent() {
    let (mut orch, world, _) = flowing(4);
    for id in 1..=4 {
        let a = orch.sample_probe(id).unwrap();
        let b = orch.sample_probe(id).unwrap();
        assert_eq!(a, b, "probe {id}");
    }
    orch.sample_all().unwrap();
    let stored = orch.probe_result(2).cloned().unwrap();
    assert_eq!(stored, orch.sample_probe(2).unwrap());
    orch.halt();
    world.join().unwrap();
}

#[test]
#[serial]
fn plane_probe_agrees_with_direct_cell_reads() {
    let (mut orch, world, _) = flowing(3);
    let ProbeResult::Grid { dims, values } = orch.sample_probe(1).unwrap() else {
        panic!("plane probe must return a grid");
    };
    assert_eq!(dims, [12, 6, 1]);
    let mut nodes = Vec::new();
    for x in 0..12 {
        for y in 1..7 {
            nodes.push(LatticeCoord::new(x, y, 3));
        }
    }
    let cells = orch.read_cells(&nodes).unwrap();
    for (v, c) in values.iter().zip(&cells) {
        let want = if c.solid { 0.0 } else { c.speed2().sqrt() };
        assert_eq!(*v, want);
    }
    assert!(values.iter().any(|v| *v > 0.0));
    orch.halt();
    world.join().unwrap();
}

#[test]
#[serial]
fn ribbon_follows_the_forced_flow() {
    let (mut orch, world, _) = flowing(4);
    let ProbeResult::Ribbon { left, right, values, .. } = orch.sample_probe(3).unwrap() else {
        panic!("ribbon probe must return a ribbon");
    };
    assert!(!values.is_empty());
    assert_eq!(left.len(), values.len());
    assert_eq!(right.len(), values.len());
    assert!(left.iter().chain(&right).flatten().all(|v| v.is_finite()));
    orch.halt();
    world.join().unwrap();
}

#[test]
#[serial]
fn unknown_and_deleted_probes() {
    let (mut orch, world, _) = flowing(3);
    assert_eq!(orch.sample_probe(99), Err(LbmError::UnknownProbe(99)));
    orch.delete_probe(4).unwrap();
    assert_eq!(orch.delete_probe(4), Err(LbmError::UnknownProbe(4)));
    assert_eq!(orch.probes().ids(), vec![1, 2, 3]);
    orch.clear_domain();
    assert!(orch.probes().is_empty());
    assert_eq!(orch.step(), Err(LbmError::NoDomain));
    orch.halt();
    world.join().unwrap();
}

#[test]
#[serial]
fn workers_survive_garbage_and_stray_commands() {
    let (mut orch, world, raw) = flowing(3);
    let before = orch.sample_probe(2).unwrap();
    for rank in 1..raw.size() {
        raw.isend(rank, tags::COMMAND.as_u16(), &[0xAB; 7]);
        raw.isend(rank, tags::COMMAND.as_u16(), &[0xFF; 40]);
        protocol::send_command(&raw, rank, Command::FieldDone);
        protocol::send_command(&raw, rank, Command::GetCell { x: 0, y: 0, z: 0 });
    }
    assert_eq!(before, orch.sample_probe(2).unwrap());
    orch.step().unwrap();
    assert!(orch.total_mass().unwrap().is_finite());
    orch.halt();
    world.join().unwrap();
}
