//! Reading cells that live on other ranks.
//!
//! While the workers sit in their filter sub-loop the orchestrator can ask
//! for single cells (`GetCell`) or for batches (`SetReqSize` followed by a
//! coordinate array on [`tags::REQ_COORDS`]). Batches are grouped by owning
//! rank, all requests go out first and the replies are collected afterwards.
//! Request buffers only ever grow.

use std::mem::size_of;

use bytemuck::Pod;

use crate::comm::protocol::{self, tags, Command};
use crate::comm::wire::{cast_slice, read_record, read_records, WireCellCoord, WireCellSample, WireMinMax};
use crate::comm::{Communicator, Wait};
use crate::domain::{DomainDescriptor, LatticeCoord};
use crate::lattice::{CellSample, Slab};
use crate::lbm_error::LbmError;

/// A grow-only record buffer.
#[derive(Clone, Debug, Default)]
pub struct RequestArena<T: Pod> {
    buf: Vec<T>,
}

impl<T: Pod> RequestArena<T> {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Make room for at least `n` records. Never shrinks.
    pub fn ensure_capacity(&mut self, n: usize) {
        if self.buf.len() < n {
            self.buf.resize(n, T::zeroed());
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// The first `n` records; grows the arena if needed.
    pub fn slice_mut(&mut self, n: usize) -> &mut [T] {
        self.ensure_capacity(n);
        &mut self.buf[..n]
    }

    pub fn slice(&self, n: usize) -> &[T] {
        &self.buf[..n.min(self.buf.len())]
    }
}

/// Where probes get their cell data from.
pub trait CellSource {
    /// Sample every node in `nodes`, in order.
    fn read(&mut self, nodes: &[LatticeCoord]) -> Result<Vec<CellSample>, LbmError>;

    fn read_one(&mut self, node: LatticeCoord) -> Result<CellSample, LbmError> {
        self.read(std::slice::from_ref(&node))?
            .pop()
            .ok_or_else(|| LbmError::Invariant("empty sample batch".into()))
    }
}

/// Sample reported for nodes no rank owns.
pub(crate) const OUTSIDE: CellSample = CellSample {
    density: 0.0,
    velocity: [0.0; 3],
    solid: true,
};

/// A slab whose local coordinates are the global ones, as in a
/// single-worker run.
impl CellSource for Slab {
    fn read(&mut self, nodes: &[LatticeCoord]) -> Result<Vec<CellSample>, LbmError> {
        Ok(nodes
            .iter()
            .map(|c| self.sample(c.x, c.y, c.z).unwrap_or(OUTSIDE))
            .collect())
    }
}

/// Per-rank request buffers kept by the orchestrator across passes.
#[derive(Debug, Default)]
pub struct RemoteBuffers {
    coords: Vec<RequestArena<WireCellCoord>>,
    origin: Vec<Vec<usize>>,
}

impl RemoteBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    fn prepare(&mut self, ranks: usize) {
        if self.coords.len() < ranks {
            self.coords.resize_with(ranks, RequestArena::new);
            self.origin.resize_with(ranks, Vec::new);
        }
        for o in &mut self.origin {
            o.clear();
        }
    }

    /// Largest batch any rank has been asked for so far.
    pub fn high_water(&self) -> usize {
        self.coords.iter().map(RequestArena::capacity).max().unwrap_or(0)
    }
}

/// Reader over an open filter session. Built by [`RemoteReader::open`],
/// which puts every worker into its filter loop, and finished by
/// [`RemoteReader::close`].
pub struct RemoteReader<'a, C: Communicator> {
    comm: &'a C,
    domain: &'a DomainDescriptor,
    buffers: &'a mut RemoteBuffers,
    open: bool,
}

impl<'a, C: Communicator> RemoteReader<'a, C> {
    pub fn open(comm: &'a C, domain: &'a DomainDescriptor, buffers: &'a mut RemoteBuffers) -> Self {
        protocol::broadcast(comm, Command::Filter);
        Self {
            comm,
            domain,
            buffers,
            open: true,
        }
    }

    /// Send `FilterDone` to every worker.
    pub fn close(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.open {
            protocol::broadcast(self.comm, Command::FilterDone);
            self.open = false;
        }
    }

    fn recv_samples(&self, rank: usize, n: usize) -> Result<Vec<WireCellSample>, LbmError> {
        let expected = n * size_of::<WireCellSample>();
        let bytes = self
            .comm
            .recv(rank, tags::SAMPLE_REPLY.as_u16(), expected)
            .ok_or_else(|| LbmError::CommError {
                neighbor: rank,
                message: "no sample reply".into(),
            })?;
        if bytes.len() != expected {
            return Err(LbmError::short_read(rank, expected, bytes.len()));
        }
        read_records(&bytes).ok_or_else(|| LbmError::short_read(rank, expected, bytes.len()))
    }

    /// Ask every worker for its rank-local extrema.
    pub fn min_max(&mut self) -> Result<Vec<[f64; 4]>, LbmError> {
        for rank in 1..self.comm.size() {
            protocol::send_command(self.comm, rank, Command::SendMinMax);
        }
        let mut out = Vec::with_capacity(self.comm.size().saturating_sub(1));
        let mut first_err = None;
        for rank in 1..self.comm.size() {
            let reply = self
                .comm
                .recv(rank, tags::MINMAX_REPLY.as_u16(), size_of::<WireMinMax>())
                .and_then(|b| read_record::<WireMinMax>(&b));
            match reply {
                Some(m) => out.push(m.values()),
                None => {
                    first_err.get_or_insert(LbmError::CommError {
                        neighbor: rank,
                        message: "no min/max reply".into(),
                    });
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(out),
        }
    }

    /// Sum of every rank's slab mass.
    pub fn total_mass(&mut self) -> Result<f64, LbmError> {
        for rank in 1..self.comm.size() {
            protocol::send_command(self.comm, rank, Command::SendMass);
        }
        let mut total = 0.0;
        let mut first_err = None;
        for rank in 1..self.comm.size() {
            let reply = self
                .comm
                .recv(rank, tags::MASS_REPLY.as_u16(), size_of::<u64>())
                .and_then(|b| read_record::<u64>(&b));
            match reply {
                Some(w) => total += crate::comm::wire::f64_from_wire(w),
                None => {
                    first_err.get_or_insert(LbmError::CommError {
                        neighbor: rank,
                        message: "no mass reply".into(),
                    });
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }
}

impl<C: Communicator> CellSource for RemoteReader<'_, C> {
    fn read(&mut self, nodes: &[LatticeCoord]) -> Result<Vec<CellSample>, LbmError> {
        let size = self.comm.size();
        self.buffers.prepare(size);
        let mut out = vec![OUTSIDE; nodes.len()];
        for (i, &c) in nodes.iter().enumerate() {
            if let Some((rank, lx)) = self.domain.owner(c) {
                let n = self.buffers.origin[rank].len();
                self.buffers.coords[rank].slice_mut(n + 1)[n] = WireCellCoord::new(lx, c.y, c.z);
                self.buffers.origin[rank].push(i);
            }
        }
        for rank in 1..size {
            let n = self.buffers.origin[rank].len();
            if n == 0 {
                continue;
            }
            protocol::send_command(self.comm, rank, Command::SetReqSize(n));
            self.comm
                .isend(rank, tags::REQ_COORDS.as_u16(), cast_slice(self.buffers.coords[rank].slice(n)))
                .wait();
        }
        let mut first_err = None;
        for rank in 1..size {
            let n = self.buffers.origin[rank].len();
            if n == 0 {
                continue;
            }
            match self.recv_samples(rank, n) {
                Ok(samples) => {
                    for (&i, s) in self.buffers.origin[rank].iter().zip(&samples) {
                        out[i] = CellSample {
                            density: s.density(),
                            velocity: s.velocity(),
                            solid: s.solid(),
                        };
                    }
                }
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(out),
        }
    }

    fn read_one(&mut self, node: LatticeCoord) -> Result<CellSample, LbmError> {
        let Some((rank, lx)) = self.domain.owner(node) else {
            return Ok(OUTSIDE);
        };
        protocol::send_command(
            self.comm,
            rank,
            Command::GetCell {
                x: lx,
                y: node.y,
                z: node.z,
            },
        );
        let s = self
            .recv_samples(rank, 1)?
            .pop()
            .ok_or_else(|| LbmError::short_read(rank, size_of::<WireCellSample>(), 0))?;
        Ok(CellSample {
            density: s.density(),
            velocity: s.velocity(),
            solid: s.solid(),
        })
    }
}

impl<C: Communicator> Drop for RemoteReader<'_, C> {
    fn drop(&mut self) {
        self.finish();
    }
}
