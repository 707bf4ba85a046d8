//! Probe sampling: geometry mapping, remote cell reads and streamline
//! ribbons.

pub mod engine;
pub mod probe;
pub mod remote;
pub mod streamline;

pub use engine::SamplingEngine;
pub use probe::{ProbeDescriptor, ProbeGeometry, ProbeId, ProbeResult, SampleType, SavedProbe};
pub use remote::{CellSource, RemoteBuffers, RemoteReader, RequestArena};
pub use streamline::{Ribbon, RibbonParams, StopReason};
