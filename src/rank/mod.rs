//! Worker ranks and in-process worlds of them.

pub mod local;
pub mod worker;

pub use local::LocalWorld;
pub use worker::WorkerRank;
