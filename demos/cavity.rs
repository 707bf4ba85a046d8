// Lid-less cavity run on in-process ranks with a centre probe and a
// mid-plane slice.
// Run with `cargo run --example cavity -- [config.json] [workers]`

use std::fs;

use lbm_slab::prelude::*;

fn load_config(path: Option<&String>) -> Result<SolverConfig, Box<dyn std::error::Error>> {
    match path {
        Some(p) => Ok(serde_json::from_str(&fs::read_to_string(p)?)?),
        None => Ok(SolverConfig {
            max_steps: 100,
            ..Default::default()
        }),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = load_config(args.first())?;
    let workers: usize = match args.get(1) {
        Some(w) => w.parse()?,
        None => 4,
    };

    let mut world = LocalWorld::spawn(workers + 1)?;
    let comm = world.take_orchestrator().ok_or(LbmError::TooFewRanks(0))?;
    let max_steps = config.max_steps;
    let mut orch = Orchestrator::new(comm, config)?;

    let grid = OccupancyGrid::cavity([50, 50, 50])?;
    let d = orch
        .load_domain(&grid, WorldBounds::unit_voxels(grid.dims()))?
        .clone();
    println!(
        "lattice {:?}, {} workers, slab width {} (last {})",
        d.dim, d.workers, d.slice_width, d.slice_last_width
    );

    orch.add_probe(ProbeDescriptor {
        id: 1,
        sample: SampleType::Density,
        geometry: ProbeGeometry::Point {
            position: [25.0, 25.0, 25.0],
        },
    })?;
    orch.add_probe(ProbeDescriptor {
        id: 2,
        sample: SampleType::Velocity,
        geometry: ProbeGeometry::Plane {
            origin: [0.5, 0.5, 25.0],
            u: [49.0, 0.0, 0.0],
            v: [0.0, 49.0, 0.0],
            resolution: [25, 25],
        },
    })?;

    let initial = orch.total_mass()?;
    let ran = orch.run(max_steps, |s| {
        if s.step % 10 == 0 {
            println!("step {:>5} {:?}", s.step, s.state);
        }
    })?;

    if let Some(ProbeResult::Grid { values, .. }) = orch.probe_result(1) {
        println!("centre density {:.6}", values[0]);
    }
    if let Some(ProbeResult::Grid { dims, values }) = orch.probe_result(2) {
        let peak = values.iter().cloned().fold(0.0_f64, f64::max);
        println!("mid-plane {}x{} peak speed {:.3e}", dims[0], dims[1], peak);
    }
    if let Some((lo, hi)) = orch.statistics().density_range() {
        println!("density range [{lo:.6}, {hi:.6}]");
    }
    let mass = orch.total_mass()?;
    println!("{ran} steps, mass {initial:.6} -> {mass:.6}");

    orch.halt();
    world.join()?;
    Ok(())
}
