//! Worker rank: owns one slab and executes orchestrator commands.
//!
//! The command loop never crashes on bad input. A malformed or out-of-place
//! command is logged and dropped, and the rank keeps listening. A failed slab
//! allocation, a failed halo exchange and a broken barrier are fatal: the
//! rank leaves its loop, and the remaining ranks find the barrier broken at
//! their next collective step.

use std::mem::size_of;

use crate::comm::halo_exchange::{HaloExchange, Neighbors};
use crate::comm::protocol::{self, tags, Command, ORCHESTRATOR, PROPAGATE_BARRIERS};
use crate::comm::wire::{cast_slice, f64_to_wire, read_records, WireCellCoord, WireCellSample, WireMinMax};
use crate::comm::{Communicator, Wait};
use crate::debug_invariants::DebugInvariants;
use crate::domain::EnvironmentParameters;
use crate::lattice::{CellSample, Face, Slab};
use crate::lbm_error::LbmError;
use crate::sampling::remote::RequestArena;

enum Flow {
    Continue,
    Exit,
}

fn wire_sample(s: CellSample) -> WireCellSample {
    WireCellSample::new(s.density, s.velocity, s.solid)
}

/// Reply sent for coordinates outside the slab.
const MISSING: CellSample = CellSample {
    density: 0.0,
    velocity: [0.0; 3],
    solid: true,
};

pub struct WorkerRank<C: Communicator> {
    comm: C,
    neighbors: Neighbors,
    env: EnvironmentParameters,
    slab: Option<Slab>,
    exchange: HaloExchange,
    coords: RequestArena<WireCellCoord>,
    replies: RequestArena<WireCellSample>,
    steps: u64,
}

impl<C: Communicator> WorkerRank<C> {
    pub fn new(comm: C) -> Self {
        let neighbors = Neighbors::for_rank(comm.rank(), comm.size());
        Self {
            comm,
            neighbors,
            env: EnvironmentParameters::default(),
            slab: None,
            exchange: HaloExchange::new(),
            coords: RequestArena::new(),
            replies: RequestArena::new(),
            steps: 0,
        }
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn slab(&self) -> Option<&Slab> {
        self.slab.as_ref()
    }

    pub fn environment(&self) -> &EnvironmentParameters {
        &self.env
    }

    /// Serve commands until `Disconnect`.
    pub fn run(&mut self) -> Result<(), LbmError> {
        log::debug!("rank {} waiting for commands ({:?})", self.rank(), self.neighbors);
        loop {
            let Some(cmd) = self.next_command() else {
                continue;
            };
            if let Flow::Exit = self.handle(cmd)? {
                log::debug!("rank {} disconnected after {} steps", self.rank(), self.steps);
                return Ok(());
            }
        }
    }

    /// `None` when nothing usable arrived; timeouts and malformed records
    /// both just go round the loop again.
    fn next_command(&self) -> Option<Command> {
        match protocol::recv_command(&self.comm, ORCHESTRATOR) {
            Ok(Some(cmd)) => Some(cmd),
            Ok(None) => {
                log::trace!("rank {} idle", self.rank());
                None
            }
            Err(e) => {
                log::warn!("rank {} dropped command: {e}", self.rank());
                None
            }
        }
    }

    fn handle(&mut self, cmd: Command) -> Result<Flow, LbmError> {
        match cmd {
            Command::SetArea {
                slice_width,
                dim_y,
                dim_z,
            } => return self.set_area(slice_width, dim_y, dim_z),
            Command::UpdateEnvironment(env) => {
                self.env = EnvironmentParameters {
                    update_rate: self.env.update_rate,
                    ..env
                };
                log::debug!("rank {} environment {:?}", self.rank(), self.env);
                protocol::send_ack(&self.comm, ORCHESTRATOR, cmd.kind(), true);
            }
            Command::Propagate => self.propagate()?,
            Command::Collide => self.collide()?,
            Command::Filter => return self.filter(),
            Command::ResetStats => {
                if let Some(slab) = self.slab.as_mut() {
                    slab.reset_stats();
                }
            }
            Command::Reset => {
                if let Some(slab) = self.slab.as_mut() {
                    slab.reset(self.env.density);
                }
                self.steps = 0;
            }
            Command::Disconnect => return Ok(Flow::Exit),
            other => {
                log::warn!("rank {} ignoring {:?} outside its phase", self.rank(), other);
            }
        }
        Ok(Flow::Continue)
    }

    fn set_area(&mut self, width: usize, ny: usize, nz: usize) -> Result<Flow, LbmError> {
        let kind = Command::SetArea {
            slice_width: width,
            dim_y: ny,
            dim_z: nz,
        }
        .kind();
        self.slab = None;
        let slab = match Slab::new(width, ny, nz, self.env.density, self.neighbors.faces()) {
            Ok(s) => s,
            Err(e) => {
                log::error!("rank {} cannot hold a {width}x{ny}x{nz} slab: {e}", self.rank());
                protocol::send_ack(&self.comm, ORCHESTRATOR, kind, false);
                return Err(e);
            }
        };
        self.slab = Some(slab);
        self.steps = 0;
        protocol::send_ack(&self.comm, ORCHESTRATOR, kind, true);
        log::debug!("rank {} allocated {width}x{ny}x{nz}", self.rank());

        let mut solid = 0usize;
        loop {
            let Some(cmd) = self.next_command() else {
                continue;
            };
            match cmd {
                Command::Field { x, y, z } => {
                    let inside = self
                        .slab
                        .as_mut()
                        .is_some_and(|s| s.set_solid(x, y, z, true));
                    if inside {
                        solid += 1;
                    } else {
                        log::warn!("rank {} solid marker ({x},{y},{z}) outside slab", self.rank());
                    }
                }
                Command::FieldDone => break,
                Command::Disconnect => return Ok(Flow::Exit),
                other => {
                    log::warn!("rank {} ignoring {:?} while loading solids", self.rank(), other);
                }
            }
        }
        log::debug!("rank {} marked {solid} solid cells", self.rank());
        Ok(Flow::Continue)
    }

    fn propagate(&mut self) -> Result<(), LbmError> {
        let Some(slab) = self.slab.as_mut() else {
            log::warn!("rank {} propagating without a slab", self.comm.rank());
            for _ in 0..PROPAGATE_BARRIERS {
                self.comm.barrier()?;
            }
            return Ok(());
        };
        slab.propagate();
        for face in [Face::West, Face::East] {
            if self.neighbors.get(face).is_none() {
                slab.apply_forcing(
                    face,
                    self.env.density,
                    self.env.acceleration,
                    self.env.forcing_guard,
                );
            }
        }
        self.comm.barrier()?;
        let res = self.exchange.exchange(&self.comm, slab, self.neighbors);
        self.steps += 1;
        if let Err(e) = &res {
            log::error!("rank {} halo exchange failed: {e}", self.comm.rank());
        }
        res
    }

    fn collide(&mut self) -> Result<(), LbmError> {
        if let Some(slab) = self.slab.as_mut() {
            slab.collide(self.env.relaxation);
            slab.debug_assert_invariants();
        }
        self.comm.barrier()
    }

    fn filter(&mut self) -> Result<Flow, LbmError> {
        loop {
            let Some(cmd) = self.next_command() else {
                continue;
            };
            match cmd {
                Command::GetCell { x, y, z } => {
                    let s = self.sample(x, y, z);
                    let reply = [wire_sample(s)];
                    self.comm
                        .isend(ORCHESTRATOR, tags::SAMPLE_REPLY.as_u16(), cast_slice(&reply))
                        .wait();
                }
                Command::SetReqSize(n) => self.answer_batch(n),
                Command::SendMinMax => {
                    let st = self.slab.as_ref().map(Slab::stats).unwrap_or_default();
                    let reply = [WireMinMax::new(
                        st.density_min,
                        st.density_max,
                        st.speed2_min,
                        st.speed2_max,
                    )];
                    self.comm
                        .isend(ORCHESTRATOR, tags::MINMAX_REPLY.as_u16(), cast_slice(&reply))
                        .wait();
                }
                Command::SendMass => {
                    let mass = self.slab.as_ref().map_or(0.0, Slab::total_mass);
                    let reply = [f64_to_wire(mass)];
                    self.comm
                        .isend(ORCHESTRATOR, tags::MASS_REPLY.as_u16(), cast_slice(&reply))
                        .wait();
                }
                Command::FilterDone => return Ok(Flow::Continue),
                Command::Disconnect => return Ok(Flow::Exit),
                other => {
                    log::warn!("rank {} ignoring {:?} inside filter", self.rank(), other);
                }
            }
        }
    }

    fn sample(&self, x: usize, y: usize, z: usize) -> CellSample {
        self.slab
            .as_ref()
            .and_then(|s| s.sample(x, y, z))
            .unwrap_or(MISSING)
    }

    /// Receive `n` coordinates and answer with `n` samples. A short or
    /// missing coordinate array still gets a full-length reply so the
    /// orchestrator is never left waiting.
    fn answer_batch(&mut self, n: usize) {
        self.coords.ensure_capacity(n);
        self.replies.ensure_capacity(n);
        let expected = n * size_of::<WireCellCoord>();
        let received = self
            .comm
            .recv(ORCHESTRATOR, tags::REQ_COORDS.as_u16(), expected)
            .and_then(|b| read_records::<WireCellCoord>(&b));
        let got = match received {
            Some(c) => {
                let k = c.len().min(n);
                self.coords.slice_mut(k).copy_from_slice(&c[..k]);
                k
            }
            None => 0,
        };
        if got != n {
            log::warn!("rank {} got {got} of {n} request coordinates", self.rank());
        }
        for i in 0..n {
            let s = if i < got {
                let (x, y, z) = self.coords.slice(got)[i].get();
                self.sample(x, y, z)
            } else {
                MISSING
            };
            self.replies.slice_mut(n)[i] = wire_sample(s);
        }
        self.comm
            .isend(
                ORCHESTRATOR,
                tags::SAMPLE_REPLY.as_u16(),
                cast_slice(self.replies.slice(n)),
            )
            .wait();
    }
}
