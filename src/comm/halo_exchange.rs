//! Parity-ordered halo exchange between adjacent slabs.
//!
//! Worker ranks are numbered `1..size`; worker `w = rank - 1` owns the w-th
//! slab along x. Round one: even workers send both outbound planes, odd
//! workers receive. A global barrier separates the rounds. Round two swaps
//! the roles. Adjacent workers always have opposite parity, so every pair is
//! served exactly once per round and no rank ever sends and receives in the
//! same round.
//!
//! The first and last workers have no neighbour on their outer face. Those
//! faces are closed walls handled during streaming, not wrap-around partners.

use super::communicator::{Communicator, Wait};
use super::protocol::tags;
use super::wire::{cast_slice, read_records};
use crate::lattice::{Face, FaceKind, Faces, HaloPlane, Slab};
use crate::lbm_error::LbmError;

/// Neighbouring worker ranks of one slab.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Neighbors {
    pub west: Option<usize>,
    pub east: Option<usize>,
}

impl Neighbors {
    /// Neighbours of worker `rank` in a world of `size` ranks (rank 0 being
    /// the orchestrator).
    pub fn for_rank(rank: usize, size: usize) -> Self {
        let first = 1;
        let last = size.saturating_sub(1);
        Self {
            west: (rank > first).then(|| rank - 1),
            east: (rank < last).then(|| rank + 1),
        }
    }

    pub fn get(&self, face: Face) -> Option<usize> {
        match face {
            Face::West => self.west,
            Face::East => self.east,
        }
    }

    pub fn faces(&self) -> Faces {
        let kind = |n: Option<usize>| match n {
            Some(_) => FaceKind::Exchange,
            None => FaceKind::Wall,
        };
        Faces {
            west: kind(self.west),
            east: kind(self.east),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    pub fn of_rank(rank: usize) -> Self {
        if rank.saturating_sub(1) % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }
}

fn outbound_tag(face: Face) -> u16 {
    match face {
        Face::East => tags::HALO_EASTWARD.as_u16(),
        Face::West => tags::HALO_WESTWARD.as_u16(),
    }
}

/// Reusable scratch for one rank's halo traffic.
#[derive(Debug, Default)]
pub struct HaloExchange {
    words: Vec<u64>,
    inbound: Option<HaloPlane>,
}

impl HaloExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run both parity rounds, entering one barrier after each. Barriers are
    /// always entered, even when a receive fails, so the other ranks are
    /// never left waiting; the first receive error is returned afterwards.
    /// A broken barrier is returned at once.
    pub fn exchange<C: Communicator>(
        &mut self,
        comm: &C,
        slab: &mut Slab,
        neighbors: Neighbors,
    ) -> Result<(), LbmError> {
        let me = Parity::of_rank(comm.rank());
        let mut first_err = None;
        for round in [Parity::Even, Parity::Odd] {
            if me == round {
                self.send_planes(comm, slab, neighbors);
            } else if let Err(e) = self.receive_planes(comm, slab, neighbors) {
                first_err.get_or_insert(e);
            }
            comm.barrier()?;
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn send_planes<C: Communicator>(&mut self, comm: &C, slab: &Slab, neighbors: Neighbors) {
        for face in [Face::West, Face::East] {
            if let Some(peer) = neighbors.get(face) {
                slab.halo(face).encode_le(&mut self.words);
                comm.isend(peer, outbound_tag(face), cast_slice(&self.words))
                    .wait();
                log::trace!("rank {} sent {:?} plane to {peer}", comm.rank(), face);
            }
        }
    }

    fn receive_planes<C: Communicator>(
        &mut self,
        comm: &C,
        slab: &mut Slab,
        neighbors: Neighbors,
    ) -> Result<(), LbmError> {
        let (_, ny, nz) = slab.dims();
        let mut result = Ok(());
        for face in [Face::West, Face::East] {
            let Some(peer) = neighbors.get(face) else {
                continue;
            };
            let plane = self.inbound.get_or_insert_with(|| HaloPlane::new(ny, nz));
            if plane.dims() != (ny, nz) {
                *plane = HaloPlane::new(ny, nz);
            }
            // the neighbour across our west face sends its east plane
            let tag = outbound_tag(face.opposite());
            let expected = plane.packet_len() * 8;
            let step = comm
                .recv(peer, tag, expected)
                .ok_or_else(|| LbmError::CommError {
                    neighbor: peer,
                    message: format!("no halo plane for {face:?} face"),
                })
                .and_then(|bytes| {
                    read_records::<u64>(&bytes)
                        .ok_or_else(|| LbmError::short_read(peer, expected, bytes.len()))
                })
                .and_then(|words| plane.decode_le(&words, peer));
            match step {
                Ok(()) => slab.absorb_halo(face, plane),
                Err(e) => {
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }
        result
    }
}
