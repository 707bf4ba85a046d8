use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use lbm_slab::comm::LocalComm;
use lbm_slab::domain::{OccupancyGrid, SolverConfig, WorldBounds};
use lbm_slab::lattice::{Face, Faces, Slab};
use lbm_slab::orchestrator::Orchestrator;
use lbm_slab::rank::LocalWorld;

fn cavity_slab(n: usize) -> Slab {
    let mut slab = Slab::new(n, n, n, 1.0, Faces::CLOSED).unwrap();
    for x in 0..n {
        for i in 0..n {
            slab.set_solid(x, 0, i, true);
            slab.set_solid(x, n - 1, i, true);
            slab.set_solid(x, i, 0, true);
            slab.set_solid(x, i, n - 1, true);
        }
    }
    slab
}

fn bench_slab_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("slab");
    for &n in &[16usize, 32, 48] {
        let mut slab = cavity_slab(n);
        group.bench_with_input(BenchmarkId::new("propagate", n), &n, |b, _| {
            b.iter(|| slab.propagate());
        });
        let mut slab = cavity_slab(n);
        group.bench_with_input(BenchmarkId::new("collide", n), &n, |b, _| {
            b.iter(|| slab.collide(1.85));
        });
        let mut slab = cavity_slab(n);
        group.bench_with_input(BenchmarkId::new("full_step", n), &n, |b, _| {
            b.iter(|| {
                slab.propagate();
                slab.apply_forcing(Face::West, 0.5, 0.05, 0.0);
                slab.apply_forcing(Face::East, 0.5, 0.05, 0.0);
                slab.collide(1.2);
            });
        });
    }
    group.finish();
}

fn local_world(size: usize, n: usize) -> (Orchestrator<LocalComm>, LocalWorld) {
    let mut world = LocalWorld::spawn(size).unwrap();
    let comm = world.take_orchestrator().unwrap();
    let mut orch = Orchestrator::new(comm, SolverConfig::default()).unwrap();
    let grid = OccupancyGrid::cavity([n, n, n]).unwrap();
    orch.load_domain(&grid, WorldBounds::unit_voxels(grid.dims()))
        .unwrap();
    (orch, world)
}

fn bench_distributed_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("distributed");
    group.sample_size(20);
    for &workers in &[1usize, 2, 4] {
        let (mut orch, world) = local_world(workers + 1, 32);
        group.bench_with_input(BenchmarkId::new("step_32", workers), &workers, |b, _| {
            b.iter(|| orch.step().unwrap());
        });
        orch.halt();
        world.join().unwrap();
    }
    group.finish();
}

criterion_group!(benches, bench_slab_kernels, bench_distributed_step);
criterion_main!(benches);
