mod util;

use lbm_slab::domain::{EnvironmentParameters, LatticeCoord, OccupancyGrid, SolverConfig, WorldBounds};
use lbm_slab::lbm_error::LbmError;
use lbm_slab::sampling::{ProbeDescriptor, ProbeGeometry, SampleType};
use serial_test::serial;
use util::*;

#[test]
#[serial]
fn padded_scaled_domain_places_solids_on_owning_ranks() {
    let mut grid = OccupancyGrid::new([5, 3, 3]).unwrap();
    grid.set(4, 1, 1, true);
    let config = SolverConfig {
        scale: [2.0, 1.0, 1.0],
        padding: [1, 1, 0],
        ..Default::default()
    };
    let (mut orch, world, _) = spawn(3, config);
    let d = orch.load_domain(&grid, unit_bounds(&grid)).unwrap().clone();
    // x: 10 + 2 = 12; y: 3 + 2 = 5 -> 6; z: 3 -> 4
    assert_eq!(d.dim, [12, 6, 4]);
    assert_eq!(d.sub, [1, 1, 0]);

    // voxel x = 4 covers lattice x 9 and 10 after scaling and padding
    let nodes = [
        LatticeCoord::new(8, 2, 1),
        LatticeCoord::new(9, 2, 1),
        LatticeCoord::new(10, 2, 1),
        LatticeCoord::new(11, 2, 1),
    ];
    let solid: Vec<bool> = orch.read_cells(&nodes).unwrap().iter().map(|c| c.solid).collect();
    assert_eq!(solid, vec![false, true, true, false]);
    assert!((orch.total_mass().unwrap() - 0.5 * d.cell_count() as f64).abs() < 1e-10);

    orch.halt();
    world.join().unwrap();
}

#[test]
#[serial]
fn reloading_rescales_saved_probes() {
    let small = OccupancyGrid::new([4, 4, 4]).unwrap();
    let (mut orch, world, _) = spawn(3, SolverConfig::default());
    orch.add_probe(ProbeDescriptor {
        id: 1,
        sample: SampleType::Density,
        geometry: ProbeGeometry::Point {
            position: [0.75, 0.5, 0.5],
        },
    })
    .unwrap();
    assert!(!orch.probes().probe(1).unwrap().is_mapped());

    let bounds = WorldBounds::new([0.0; 3], [1.0; 3]).unwrap();
    orch.load_domain(&small, bounds).unwrap();
    assert_eq!(orch.probes().probe(1).unwrap().nodes, vec![Some(LatticeCoord::new(3, 2, 2))]);

    let large = OccupancyGrid::new([8, 8, 8]).unwrap();
    orch.load_domain(&large, bounds).unwrap();
    assert_eq!(orch.probes().probe(1).unwrap().nodes, vec![Some(LatticeCoord::new(6, 4, 4))]);
    assert!(orch.sample_probe(1).is_ok());

    orch.halt();
    world.join().unwrap();
}

#[test]
#[serial]
fn environment_changes_are_validated_and_acknowledged() {
    let grid = OccupancyGrid::cavity([6, 6, 6]).unwrap();
    let (mut orch, world, _) = spawn(4, SolverConfig::default());
    orch.load_domain(&grid, unit_bounds(&grid)).unwrap();

    let bad = EnvironmentParameters {
        density: 0.0,
        ..Default::default()
    };
    assert!(matches!(
        orch.update_environment(bad),
        Err(LbmError::InvalidParameter { name: "density", .. })
    ));
    assert_eq!(orch.environment().density, 0.5);

    let env = EnvironmentParameters {
        relaxation: 0.9,
        acceleration: 0.0,
        ..Default::default()
    };
    orch.update_environment(env).unwrap();
    assert_eq!(*orch.environment(), env);
    orch.step().unwrap();

    orch.halt();
    world.join().unwrap();
}

#[test]
#[serial]
fn too_many_workers_for_the_lattice() {
    let grid = OccupancyGrid::new([2, 2, 2]).unwrap();
    let (mut orch, world, _) = spawn(5, SolverConfig::default());
    assert!(matches!(
        orch.load_domain(&grid, unit_bounds(&grid)),
        Err(LbmError::DomainTooSmall { dim_x: 2, workers: 4 })
    ));
    assert!(orch.domain().is_none());
    orch.halt();
    world.join().unwrap();
}
