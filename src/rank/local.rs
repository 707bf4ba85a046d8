//! Thread-per-rank worlds for running a whole simulation inside one process.

use std::thread::JoinHandle;
use std::time::Duration;

use crate::comm::communicator::DEFAULT_RECV_TIMEOUT;
use crate::comm::{Communicator, LocalComm};
use crate::lbm_error::LbmError;

use super::worker::WorkerRank;

/// Worker threads of an in-process world plus the orchestrator's endpoint.
pub struct LocalWorld {
    orchestrator: Option<LocalComm>,
    workers: Vec<JoinHandle<Result<(), LbmError>>>,
}

impl LocalWorld {
    /// Spawn `size - 1` worker ranks, each running its command loop on its
    /// own thread.
    pub fn spawn(size: usize) -> Result<Self, LbmError> {
        Self::spawn_with_timeout(size, DEFAULT_RECV_TIMEOUT)
    }

    pub fn spawn_with_timeout(size: usize, timeout: Duration) -> Result<Self, LbmError> {
        if size < 2 {
            return Err(LbmError::TooFewRanks(size));
        }
        let mut comms = LocalComm::world_with_timeout(size, timeout).into_iter();
        let orchestrator = comms.next();
        let mut workers = Vec::with_capacity(size - 1);
        for comm in comms {
            let rank = comm.rank();
            let handle = std::thread::Builder::new()
                .name(format!("lbm-rank-{rank}"))
                .spawn(move || WorkerRank::new(comm).run())
                .map_err(|e| LbmError::CommError {
                    neighbor: rank,
                    message: format!("cannot spawn worker thread: {e}"),
                })?;
            workers.push(handle);
        }
        log::info!("spawned {} worker ranks", workers.len());
        Ok(Self {
            orchestrator,
            workers,
        })
    }

    /// Rank 0's endpoint. Can be taken once.
    pub fn take_orchestrator(&mut self) -> Option<LocalComm> {
        self.orchestrator.take()
    }

    /// Wait for every worker to leave its loop and return the first failure.
    pub fn join(self) -> Result<(), LbmError> {
        let mut first_err = None;
        for (i, handle) in self.workers.into_iter().enumerate() {
            let res = handle.join().unwrap_or_else(|_| {
                Err(LbmError::CommError {
                    neighbor: i + 1,
                    message: "worker thread panicked".into(),
                })
            });
            if let Err(e) = res {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
