//! Rank 0: partitions the domain, drives the step schedule and answers
//! sampling queries.
//!
//! Every configuration change that a worker must apply before stepping
//! (`UpdateEnvironment`, `SetArea`) is acknowledged by every rank before the
//! orchestrator returns, and the command channel is FIFO per rank, so no
//! rank can join a step with stale parameters.

pub mod control;
pub mod statistics;

use crate::comm::protocol::{self, Command, COLLIDE_BARRIERS, PROPAGATE_BARRIERS};
use crate::comm::Communicator;
use crate::domain::{DomainDescriptor, EnvironmentParameters, LatticeCoord, OccupancyGrid, SolverConfig, WorldBounds};
use crate::lattice::CellSample;
use crate::lbm_error::LbmError;
use crate::sampling::{
    CellSource, ProbeDescriptor, ProbeId, ProbeResult, RemoteBuffers, RemoteReader, SamplingEngine,
};

pub use control::{ControlRequest, RunState, SimulationControl, SimulationStatus};
pub use statistics::RunningStatistics;

pub struct Orchestrator<C: Communicator> {
    comm: C,
    config: SolverConfig,
    domain: Option<DomainDescriptor>,
    sampling: SamplingEngine,
    buffers: RemoteBuffers,
    stats: RunningStatistics,
    control: SimulationControl,
    step: u64,
    halted: bool,
}

/// Wait for an ack of `kind` from every worker; all acks are drained before
/// the first failure is returned.
fn collect_acks<C: Communicator>(comm: &C, kind: u16) -> Result<(), LbmError> {
    let mut first_err = None;
    for rank in 1..comm.size() {
        if let Err(e) = protocol::recv_ack(comm, rank, kind) {
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

impl<C: Communicator> Orchestrator<C> {
    pub fn new(comm: C, config: SolverConfig) -> Result<Self, LbmError> {
        config.validate()?;
        if comm.size() < 2 {
            return Err(LbmError::TooFewRanks(comm.size()));
        }
        if comm.rank() != protocol::ORCHESTRATOR {
            return Err(LbmError::Protocol {
                rank: comm.rank(),
                message: "the orchestrator must run on rank 0".into(),
            });
        }
        Ok(Self {
            comm,
            config,
            domain: None,
            sampling: SamplingEngine::new(),
            buffers: RemoteBuffers::new(),
            stats: RunningStatistics::new(),
            control: SimulationControl::new(),
            step: 0,
            halted: false,
        })
    }

    /// A handle other threads can use to pause, resume, halt or queue
    /// requests.
    pub fn control(&self) -> SimulationControl {
        self.control.clone()
    }

    pub fn environment(&self) -> &EnvironmentParameters {
        &self.config.environment
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn domain(&self) -> Option<&DomainDescriptor> {
        self.domain.as_ref()
    }

    pub fn statistics(&self) -> &RunningStatistics {
        &self.stats
    }

    pub fn step_count(&self) -> u64 {
        self.step
    }

    pub fn status(&self) -> SimulationStatus {
        SimulationStatus {
            state: self.control.state(),
            step: self.step,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    fn ensure_live(&self) -> Result<(), LbmError> {
        if self.halted {
            Err(LbmError::Halted)
        } else {
            Ok(())
        }
    }

    fn live_domain(&self) -> Result<&DomainDescriptor, LbmError> {
        self.ensure_live()?;
        self.domain.as_ref().ok_or(LbmError::NoDomain)
    }

    /// Partition `grid`, size every worker's slab and stream the solid
    /// voxels to their owners. Saved probes are remapped onto the new
    /// lattice.
    pub fn load_domain(
        &mut self,
        grid: &OccupancyGrid,
        bounds: WorldBounds,
    ) -> Result<&DomainDescriptor, LbmError> {
        self.ensure_live()?;
        let domain = DomainDescriptor::compute(
            grid.dims(),
            self.config.scale,
            self.config.padding,
            bounds,
            self.comm.size(),
        )?;
        self.domain = None;
        self.broadcast_environment(self.config.environment)?;

        for slab in domain.slabs() {
            let cmd = Command::SetArea {
                slice_width: slab.width,
                dim_y: domain.dim[1],
                dim_z: domain.dim[2],
            };
            protocol::send_command(&self.comm, slab.rank, cmd);
        }
        let kind = Command::SetArea {
            slice_width: 0,
            dim_y: 0,
            dim_z: 0,
        }
        .kind();
        if let Err(e) = collect_acks(&self.comm, kind) {
            // ranks that did allocate are waiting for their solid stream
            protocol::broadcast(&self.comm, Command::FieldDone);
            return Err(e);
        }

        let mut solid = 0usize;
        for x in 0..domain.dim[0] {
            for y in 0..domain.dim[1] {
                for z in 0..domain.dim[2] {
                    let c = LatticeCoord::new(x, y, z);
                    let Some([vx, vy, vz]) = domain.voxel_of(c) else {
                        continue;
                    };
                    if !grid.get(vx, vy, vz) {
                        continue;
                    }
                    if let Some((rank, lx)) = domain.owner(c) {
                        protocol::send_command(&self.comm, rank, Command::Field { x: lx, y, z });
                        solid += 1;
                    }
                }
            }
        }
        protocol::broadcast(&self.comm, Command::FieldDone);

        log::info!(
            "domain {:?} on {} workers (slab {} / last {}), {solid} solid nodes",
            domain.dim,
            domain.workers,
            domain.slice_width,
            domain.slice_last_width
        );
        self.sampling.rescale(&domain);
        self.stats.reset();
        self.step = 0;
        self.control.set_step(0);
        Ok(self.domain.insert(domain))
    }

    /// Forget the domain and every saved probe. Worker slabs stay allocated
    /// until the next `load_domain`.
    pub fn clear_domain(&mut self) {
        self.domain = None;
        self.sampling.clear();
        self.stats.reset();
        self.step = 0;
        self.control.set_step(0);
        log::info!("domain cleared");
    }

    fn broadcast_environment(&self, env: EnvironmentParameters) -> Result<(), LbmError> {
        let cmd = Command::UpdateEnvironment(env);
        protocol::broadcast(&self.comm, cmd);
        collect_acks(&self.comm, cmd.kind())
    }

    /// Validate, send to every rank and wait for all acknowledgements.
    pub fn update_environment(&mut self, env: EnvironmentParameters) -> Result<(), LbmError> {
        env.validate()?;
        self.ensure_live()?;
        self.broadcast_environment(env)?;
        self.config.environment = env;
        log::info!(
            "environment: density {} acceleration {} relaxation {} update rate {}",
            env.density,
            env.acceleration,
            env.relaxation,
            env.update_rate
        );
        Ok(())
    }

    /// One full step: propagate with halo exchange, then collide. A sampling
    /// pass follows every `update_rate` steps.
    pub fn step(&mut self) -> Result<(), LbmError> {
        self.live_domain()?;
        protocol::broadcast(&self.comm, Command::Propagate);
        self.join_barriers(PROPAGATE_BARRIERS)?;
        protocol::broadcast(&self.comm, Command::Collide);
        self.join_barriers(COLLIDE_BARRIERS)?;
        self.step += 1;
        self.control.set_step(self.step);
        log::debug!("step {} done", self.step);
        if self.step % u64::from(self.config.environment.update_rate) == 0 {
            self.sample_all()?;
        }
        Ok(())
    }

    /// Enter `n` step barriers alongside the workers. Losing a rank stops
    /// the whole run: the remaining ranks are disconnected and the error is
    /// returned.
    fn join_barriers(&mut self, n: usize) -> Result<(), LbmError> {
        for _ in 0..n {
            if let Err(e) = self.comm.barrier() {
                log::error!("step {} cannot complete: {e}", self.step + 1);
                self.halt();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Sample every probe and refresh the global statistics.
    pub fn sample_all(&mut self) -> Result<(), LbmError> {
        self.ensure_live()?;
        let domain = self.domain.as_ref().ok_or(LbmError::NoDomain)?;
        let mut reader = RemoteReader::open(&self.comm, domain, &mut self.buffers);
        let res = self.sampling.sample_all(&mut reader, domain);
        let extrema = reader.min_max();
        reader.close();
        res?;
        for v in extrema? {
            self.stats.merge_rank(v);
        }
        Ok(())
    }

    /// Sample one probe now, without storing the result.
    pub fn sample_probe(&mut self, id: ProbeId) -> Result<ProbeResult, LbmError> {
        self.ensure_live()?;
        let domain = self.domain.as_ref().ok_or(LbmError::NoDomain)?;
        if self.sampling.probe(id).is_none() {
            return Err(LbmError::UnknownProbe(id));
        }
        let mut reader = RemoteReader::open(&self.comm, domain, &mut self.buffers);
        let res = self.sampling.sample(id, &mut reader, domain);
        reader.close();
        res
    }

    /// Read arbitrary lattice nodes.
    pub fn read_cells(&mut self, nodes: &[LatticeCoord]) -> Result<Vec<CellSample>, LbmError> {
        self.ensure_live()?;
        let domain = self.domain.as_ref().ok_or(LbmError::NoDomain)?;
        let mut reader = RemoteReader::open(&self.comm, domain, &mut self.buffers);
        let res = reader.read(nodes);
        reader.close();
        res
    }

    /// Sum of every distribution value on every rank.
    pub fn total_mass(&mut self) -> Result<f64, LbmError> {
        self.ensure_live()?;
        let domain = self.domain.as_ref().ok_or(LbmError::NoDomain)?;
        let mut reader = RemoteReader::open(&self.comm, domain, &mut self.buffers);
        let res = reader.total_mass();
        reader.close();
        res
    }

    pub fn probe_result(&self, id: ProbeId) -> Option<&ProbeResult> {
        self.sampling.result(id)
    }

    pub fn probes(&self) -> &SamplingEngine {
        &self.sampling
    }

    /// Register or replace a probe.
    pub fn add_probe(&mut self, probe: ProbeDescriptor) -> Result<(), LbmError> {
        self.sampling.insert(probe, self.domain.as_ref())
    }

    pub fn delete_probe(&mut self, id: ProbeId) -> Result<(), LbmError> {
        self.sampling.remove(id)
    }

    pub fn reset_statistics(&mut self) -> Result<(), LbmError> {
        self.ensure_live()?;
        protocol::broadcast(&self.comm, Command::ResetStats);
        self.stats.reset();
        Ok(())
    }

    /// Put every cell back to rest at the current density and restart the
    /// step count.
    pub fn restart(&mut self) -> Result<(), LbmError> {
        self.live_domain()?;
        protocol::broadcast(&self.comm, Command::Reset);
        self.stats.reset();
        self.step = 0;
        self.control.set_step(0);
        log::info!("simulation restarted");
        Ok(())
    }

    fn apply(&mut self, req: ControlRequest) -> Result<(), LbmError> {
        log::debug!("applying {req:?}");
        match req {
            ControlRequest::Environment(env) => self.update_environment(env),
            ControlRequest::NewProbe(p) => self.add_probe(p),
            ControlRequest::DeleteProbe(id) => self.delete_probe(id),
            ControlRequest::ResetStatistics => self.reset_statistics(),
            ControlRequest::Restart => self.restart(),
        }
    }

    /// Step until `max_steps` more steps have run (0 means no limit) or the
    /// run is halted. Control flags and queued requests are honoured only
    /// between steps. `on_step` sees the status after every step. Returns
    /// the number of steps run. A halt disconnects every rank.
    pub fn run<F>(&mut self, max_steps: u64, mut on_step: F) -> Result<u64, LbmError>
    where
        F: FnMut(SimulationStatus),
    {
        self.live_domain()?;
        let mut ran = 0;
        loop {
            let state = self.control.wait_while_paused();
            if state == RunState::Halted {
                self.halt();
                break;
            }
            for req in self.control.take_requests() {
                match self.apply(req) {
                    Ok(()) => {}
                    Err(
                        e @ (LbmError::CommError { .. }
                        | LbmError::Protocol { .. }
                        | LbmError::RankLost { .. }
                        | LbmError::Halted),
                    ) => {
                        return Err(e);
                    }
                    Err(e) => log::warn!("request rejected: {e}"),
                }
            }
            if self.control.state() != RunState::Running {
                continue;
            }
            if max_steps > 0 && ran >= max_steps {
                break;
            }
            self.step()?;
            ran += 1;
            on_step(self.status());
        }
        Ok(ran)
    }

    /// Broadcast `Disconnect` to every rank. Further calls are no-ops.
    pub fn halt(&mut self) {
        if self.halted {
            return;
        }
        protocol::broadcast(&self.comm, Command::Disconnect);
        self.halted = true;
        self.control.halt();
        log::info!("halted after {} steps", self.step);
    }
}

impl<C: Communicator> Drop for Orchestrator<C> {
    fn drop(&mut self) {
        self.halt();
    }
}
