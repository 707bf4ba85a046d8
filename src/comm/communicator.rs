//! Thin façade over intra-process (thread-per-rank) or inter-process (MPI)
//! message passing.
//!
//! Messages are *contiguous byte slices* matched by `(source, tag)` in FIFO
//! order. `irecv` hands back a waitable handle; the MPI backend may block
//! inside `irecv` itself, so callers must never post a receive that depends
//! on one of their own later sends.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::lbm_error::LbmError;

/// Message-passing interface used by every rank.
pub trait Communicator: 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of at most `buf.len()` bytes from `peer` on `tag`.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    /// Block until every rank has entered the barrier. Fails with
    /// [`LbmError::RankLost`] when the barrier can never complete.
    fn barrier(&self) -> Result<(), LbmError>;

    /// Blocking receive of up to `len` bytes.
    fn recv(&self, peer: usize, tag: u16, len: usize) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.irecv(peer, tag, &mut buf).wait()
    }

    /// Returns true if this is a no-op communicator.
    fn is_no_comm(&self) -> bool {
        false
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

/// Compile-time no-op comm for single-rank unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn barrier(&self) -> Result<(), LbmError> {
        Ok(())
    }

    fn is_no_comm(&self) -> bool {
        true
    }
}

// --- LocalComm: one thread per rank inside a single process ---

type Key = (usize, usize, u16); // (src, dst, tag)

/// Receives give up after this long so a dead rank surfaces as an error
/// instead of a hang.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(120);

struct Shared {
    mailbox: DashMap<Key, VecDeque<Bytes>>,
    lock: Mutex<()>,
    arrived: Condvar,
    gate: Mutex<Gate>,
    gate_open: Condvar,
    size: usize,
    timeout: Duration,
}

/// Generation-counting barrier. A rank that waits longer than the world's
/// timeout breaks it for good: every later `barrier` call fails at once,
/// because the ranks can no longer agree on who has arrived.
#[derive(Debug, Default)]
struct Gate {
    waiting: usize,
    generation: u64,
    broken: bool,
}

impl Shared {
    fn pop(&self, key: &Key) -> Option<Bytes> {
        self.mailbox.get_mut(key).and_then(|mut q| q.pop_front())
    }
}

/// In-process communicator. Create all ranks of a world at once with
/// [`LocalComm::world`] and move each one onto its own thread.
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.shared.size)
            .finish()
    }
}

impl LocalComm {
    pub fn world(size: usize) -> Vec<LocalComm> {
        Self::world_with_timeout(size, DEFAULT_RECV_TIMEOUT)
    }

    pub fn world_with_timeout(size: usize, timeout: Duration) -> Vec<LocalComm> {
        let shared = Arc::new(Shared {
            mailbox: DashMap::new(),
            lock: Mutex::new(()),
            arrived: Condvar::new(),
            gate: Mutex::new(Gate::default()),
            gate_open: Condvar::new(),
            size,
            timeout,
        });
        (0..size)
            .map(|rank| LocalComm {
                rank,
                shared: shared.clone(),
            })
            .collect()
    }
}

pub struct LocalHandle {
    shared: Arc<Shared>,
    key: Key,
    len: usize,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let deadline = Instant::now() + self.shared.timeout;
        let mut guard = self.shared.lock.lock();
        loop {
            if let Some(bytes) = self.shared.pop(&self.key) {
                let n = bytes.len().min(self.len);
                return Some(bytes[..n].to_vec());
            }
            if self
                .shared
                .arrived
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                return self
                    .shared
                    .pop(&self.key)
                    .map(|b| b[..b.len().min(self.len)].to_vec());
            }
        }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.rank, peer, tag);
        self.shared
            .mailbox
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
        let _guard = self.shared.lock.lock();
        self.shared.arrived.notify_all();
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        LocalHandle {
            shared: self.shared.clone(),
            key: (peer, self.rank, tag),
            len: buf.len(),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) -> Result<(), LbmError> {
        let lost = LbmError::RankLost { rank: self.rank };
        let mut gate = self.shared.gate.lock();
        if gate.broken {
            return Err(lost);
        }
        gate.waiting += 1;
        if gate.waiting == self.shared.size {
            gate.waiting = 0;
            gate.generation = gate.generation.wrapping_add(1);
            self.shared.gate_open.notify_all();
            return Ok(());
        }
        let generation = gate.generation;
        let deadline = Instant::now() + self.shared.timeout;
        while gate.generation == generation {
            if gate.broken {
                return Err(lost);
            }
            if self
                .shared
                .gate_open
                .wait_until(&mut gate, deadline)
                .timed_out()
                && gate.generation == generation
            {
                gate.broken = true;
                self.shared.gate_open.notify_all();
                log::error!(
                    "rank {}: barrier timed out with {} of {} ranks present",
                    self.rank,
                    gate.waiting,
                    self.shared.size
                );
                return Err(lost);
            }
        }
        Ok(())
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use crate::lbm_error::LbmError;
    use mpi::environment::Universe;
    use mpi::topology::{Communicator as MpiCommunicator, SimpleCommunicator};
    use mpi::traits::{CommunicatorCollectives, Destination, Source};

    /// MPI world communicator. Sends are blocking standard-mode sends, which
    /// is why the halo exchange alternates sender and receiver parity.
    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
        _universe: Universe,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, LbmError> {
            let universe = mpi::initialize().ok_or_else(|| LbmError::CommError {
                neighbor: 0,
                message: "MPI was already initialized".into(),
            })?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                world,
                rank,
                size,
                _universe: universe,
            })
        }
    }

    pub struct MpiRecv(Option<Vec<u8>>);

    impl Wait for MpiRecv {
        fn wait(self) -> Option<Vec<u8>> {
            self.0
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecv;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, tag as i32);
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiRecv {
            let (mut data, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(tag as i32);
            data.truncate(buf.len());
            MpiRecv(Some(data))
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) -> Result<(), LbmError> {
            self.world.barrier();
            Ok(())
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
