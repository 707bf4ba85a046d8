//! Message transport, wire records, the rank command protocol and the halo
//! exchange built on top of them.

pub mod communicator;
pub mod halo_exchange;
pub mod protocol;
pub mod wire;

pub use communicator::{CommTag, Communicator, LocalComm, NoComm, Wait};
#[cfg(feature = "mpi-support")]
pub use communicator::MpiComm;
pub use halo_exchange::{HaloExchange, Neighbors, Parity};
pub use protocol::{Command, ORCHESTRATOR};
