//! Run control shared between the step loop and other threads.
//!
//! Pause, resume and halt only change a flag; the step loop looks at it
//! between full steps. Configuration requests are validated when they are
//! queued and applied by the loop at the next step boundary, so every rank
//! sees them before the next `Propagate`.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::domain::EnvironmentParameters;
use crate::lbm_error::LbmError;
use crate::sampling::{ProbeDescriptor, ProbeId};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    Halted,
}

/// What the visualization side sees after every step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SimulationStatus {
    pub state: RunState,
    pub step: u64,
}

/// A request applied by the step loop at the next step boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlRequest {
    Environment(EnvironmentParameters),
    NewProbe(ProbeDescriptor),
    DeleteProbe(ProbeId),
    ResetStatistics,
    Restart,
}

#[derive(Debug)]
struct Inner {
    state: RunState,
    step: u64,
    queue: VecDeque<ControlRequest>,
}

/// Cloneable handle; all clones control the same run.
#[derive(Clone, Debug)]
pub struct SimulationControl {
    inner: Arc<(Mutex<Inner>, Condvar)>,
}

impl Default for SimulationControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationControl {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((
                Mutex::new(Inner {
                    state: RunState::Running,
                    step: 0,
                    queue: VecDeque::new(),
                }),
                Condvar::new(),
            )),
        }
    }

    fn set_state(&self, state: RunState) {
        let (lock, cv) = &*self.inner;
        let mut g = lock.lock();
        if g.state != RunState::Halted {
            g.state = state;
        }
        cv.notify_all();
    }

    pub fn pause(&self) {
        self.set_state(RunState::Paused);
    }

    pub fn resume(&self) {
        self.set_state(RunState::Running);
    }

    /// Final; a halted run cannot be resumed.
    pub fn halt(&self) {
        self.set_state(RunState::Halted);
    }

    pub fn state(&self) -> RunState {
        self.inner.0.lock().state
    }

    pub fn status(&self) -> SimulationStatus {
        let g = self.inner.0.lock();
        SimulationStatus {
            state: g.state,
            step: g.step,
        }
    }

    pub(crate) fn set_step(&self, step: u64) {
        self.inner.0.lock().step = step;
    }

    /// Queue a request after checking it.
    pub fn request(&self, req: ControlRequest) -> Result<(), LbmError> {
        match &req {
            ControlRequest::Environment(env) => env.validate()?,
            ControlRequest::NewProbe(p) => p.validate()?,
            ControlRequest::DeleteProbe(_)
            | ControlRequest::ResetStatistics
            | ControlRequest::Restart => {}
        }
        let (lock, cv) = &*self.inner;
        let mut g = lock.lock();
        if g.state == RunState::Halted {
            return Err(LbmError::Halted);
        }
        g.queue.push_back(req);
        cv.notify_all();
        Ok(())
    }

    pub fn restart(&self) -> Result<(), LbmError> {
        self.request(ControlRequest::Restart)
    }

    pub fn reset_statistics(&self) -> Result<(), LbmError> {
        self.request(ControlRequest::ResetStatistics)
    }

    pub(crate) fn take_requests(&self) -> Vec<ControlRequest> {
        self.inner.0.lock().queue.drain(..).collect()
    }

    /// Block while paused with nothing queued. Returns the state seen on
    /// wake-up; queued requests wake a paused loop so they are applied
    /// without resuming.
    pub(crate) fn wait_while_paused(&self) -> RunState {
        let (lock, cv) = &*self.inner;
        let mut g = lock.lock();
        while g.state == RunState::Paused && g.queue.is_empty() {
            cv.wait(&mut g);
        }
        g.state
    }
}
