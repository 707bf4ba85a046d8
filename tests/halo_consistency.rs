mod util;

use lbm_slab::comm::halo_exchange::{HaloExchange, Neighbors};
use lbm_slab::comm::{Communicator, LocalComm};
use lbm_slab::lattice::{Direction, Face, FaceKind, Faces, Slab, Q};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const W: usize = 4;
const PARTS: usize = 3;
const NY: usize = 6;
const NZ: usize = 5;

fn random_whole(seed: u64) -> Slab {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut s = Slab::new(W * PARTS, NY, NZ, 1.0, Faces::CLOSED).unwrap();
    for x in 0..W * PARTS {
        for y in 0..NY {
            for z in 0..NZ {
                let c = s.cell_mut(x, y, z).unwrap();
                for d in Direction::ALL {
                    c.set(d, d.weight() * rng.gen_range(0.8..1.2));
                }
            }
        }
    }
    s.set_solid(5, 2, 2, true);
    s.set_solid(8, 3, 1, true);
    s
}

fn faces_of(k: usize) -> Faces {
    Faces {
        west: if k == 0 { FaceKind::Wall } else { FaceKind::Exchange },
        east: if k + 1 == PARTS { FaceKind::Wall } else { FaceKind::Exchange },
    }
}

/// Cut the whole lattice into `PARTS` slabs with identical cell state.
fn split(whole: &Slab) -> Vec<Slab> {
    (0..PARTS)
        .map(|k| {
            let mut s = Slab::new(W, NY, NZ, 1.0, faces_of(k)).unwrap();
            for x in 0..W {
                for y in 0..NY {
                    for z in 0..NZ {
                        *s.cell_mut(x, y, z).unwrap() = *whole.cell(k * W + x, y, z).unwrap();
                    }
                }
            }
            s
        })
        .collect()
}

fn exchange_by_hand(parts: &mut [Slab]) {
    let east: Vec<_> = parts.iter().map(|s| s.halo(Face::East).clone()).collect();
    let west: Vec<_> = parts.iter().map(|s| s.halo(Face::West).clone()).collect();
    for k in 0..parts.len() - 1 {
        parts[k + 1].absorb_halo(Face::West, &east[k]);
        parts[k].absorb_halo(Face::East, &west[k + 1]);
    }
}

fn assert_same(whole: &Slab, parts: &[Slab]) {
    for (k, p) in parts.iter().enumerate() {
        for x in 0..W {
            for y in 0..NY {
                for z in 0..NZ {
                    let a = whole.cell(k * W + x, y, z).unwrap();
                    let b = p.cell(x, y, z).unwrap();
                    for i in 0..Q {
                        assert_eq!(a.f[i], b.f[i], "slab {k} cell ({x},{y},{z}) component {i}");
                    }
                }
            }
        }
    }
}

fn step_whole(s: &mut Slab, a: f64) {
    s.propagate();
    s.apply_forcing(Face::West, 1.0, a, 0.0);
    s.apply_forcing(Face::East, 1.0, a, 0.0);
    s.collide(1.3);
}

#[test]
fn split_slabs_match_one_slab_over_several_steps() {
    let mut whole = random_whole(7);
    let mut parts = split(&whole);
    for _ in 0..4 {
        step_whole(&mut whole, 0.02);
        for p in parts.iter_mut() {
            p.propagate();
        }
        parts[0].apply_forcing(Face::West, 1.0, 0.02, 0.0);
        parts[PARTS - 1].apply_forcing(Face::East, 1.0, 0.02, 0.0);
        exchange_by_hand(&mut parts);
        for p in parts.iter_mut() {
            p.collide(1.3);
        }
        assert_same(&whole, &parts);
    }
}

#[test]
fn east_halo_carries_what_leaves_the_west_neighbour() {
    let whole = random_whole(11);
    let mut parts = split(&whole);
    for p in parts.iter_mut() {
        p.propagate();
    }
    let outbound = parts[1].halo(Face::West).clone();
    exchange_by_hand(&mut parts);
    for y in 0..NY {
        for z in 0..NZ {
            let cell = parts[0].cell(W - 1, y, z).unwrap();
            for (k, &d) in Direction::WESTBOUND.iter().enumerate() {
                let (_, dy, dz) = d.offset();
                let sy = y as isize - dy as isize;
                let sz = z as isize - dz as isize;
                if sy < 0 || sz < 0 || sy >= NY as isize || sz >= NZ as isize {
                    continue;
                }
                assert_eq!(cell.get(d), outbound.at(y, z).f[k]);
                // and it is what the neighbour's boundary cell held before streaming
                let src = whole.cell(W, sy as usize, sz as usize).unwrap();
                assert_eq!(cell.get(d), src.get(d));
            }
        }
    }
}

#[test]
fn threaded_exchange_matches_hand_exchange() {
    let whole = random_whole(23);
    let mut expected = split(&whole);
    for p in expected.iter_mut() {
        p.propagate();
    }
    exchange_by_hand(&mut expected);

    let size = PARTS + 1;
    let mut world = LocalComm::world_with_timeout(size, util::TEST_TIMEOUT);
    let root = world.remove(0);
    let handles: Vec<_> = world
        .into_iter()
        .zip(split(&whole))
        .map(|(comm, mut slab)| {
            std::thread::spawn(move || {
                let nb = Neighbors::for_rank(comm.rank(), comm.size());
                assert_eq!(nb.faces(), slab.faces());
                slab.propagate();
                HaloExchange::new().exchange(&comm, &mut slab, nb).map(|_| slab)
            })
        })
        .collect();
    // rank 0 owns no slab but takes part in both barriers
    root.barrier().unwrap();
    root.barrier().unwrap();
    let got: Vec<Slab> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();
    for (g, e) in got.iter().zip(&expected) {
        assert_eq!(g.cells(), e.cells());
    }
}
