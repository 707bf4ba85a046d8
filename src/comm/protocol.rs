//! The orchestrator ↔ worker command protocol.
//!
//! Every command is one fixed-size [`WireCommand`] on the [`tags::COMMAND`]
//! channel, so commands from rank 0 arrive at a worker in the order they were
//! issued. Replies use their own tags and are always requested explicitly.

use super::communicator::{CommTag, Communicator, Wait};
use super::wire::{cast_slice, read_record, WireAck, WireCommand, WIRE_VERSION};
use crate::domain::EnvironmentParameters;
use crate::lbm_error::LbmError;
use std::mem::size_of;

/// Rank that runs the orchestrator.
pub const ORCHESTRATOR: usize = 0;

/// Barriers a rank enters while handling `Propagate`: one after streaming and
/// forcing, one after each halo parity round.
pub const PROPAGATE_BARRIERS: usize = 3;
/// Barriers a rank enters while handling `Collide`.
pub const COLLIDE_BARRIERS: usize = 1;

pub mod tags {
    use super::CommTag;

    pub const COMMAND: CommTag = CommTag(0x4C00);
    pub const ACK: CommTag = CommTag(0x4C01);
    /// Populations moving +x: the sender's east plane.
    pub const HALO_EASTWARD: CommTag = CommTag(0x4C10);
    /// Populations moving -x: the sender's west plane.
    pub const HALO_WESTWARD: CommTag = CommTag(0x4C11);
    pub const REQ_COORDS: CommTag = CommTag(0x4C20);
    pub const SAMPLE_REPLY: CommTag = CommTag(0x4C21);
    pub const MINMAX_REPLY: CommTag = CommTag(0x4C22);
    pub const MASS_REPLY: CommTag = CommTag(0x4C23);
}

mod kind {
    pub const SET_AREA: u16 = 1;
    pub const FIELD: u16 = 2;
    pub const FIELD_DONE: u16 = 3;
    pub const UPDATE_ENVIRONMENT: u16 = 4;
    pub const PROPAGATE: u16 = 5;
    pub const COLLIDE: u16 = 6;
    pub const FILTER: u16 = 7;
    pub const GET_CELL: u16 = 8;
    pub const SET_REQ_SIZE: u16 = 9;
    pub const SEND_MIN_MAX: u16 = 10;
    pub const FILTER_DONE: u16 = 11;
    pub const RESET_STATS: u16 = 12;
    pub const RESET: u16 = 13;
    pub const DISCONNECT: u16 = 14;
    pub const SEND_MASS: u16 = 15;
}

/// Commands a worker rank understands. Coordinates are slab-local.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Command {
    SetArea {
        slice_width: usize,
        dim_y: usize,
        dim_z: usize,
    },
    Field {
        x: usize,
        y: usize,
        z: usize,
    },
    FieldDone,
    UpdateEnvironment(EnvironmentParameters),
    Propagate,
    Collide,
    Filter,
    GetCell {
        x: usize,
        y: usize,
        z: usize,
    },
    SetReqSize(usize),
    SendMinMax,
    /// Reply with the sum of every distribution value in the slab.
    SendMass,
    FilterDone,
    ResetStats,
    Reset,
    Disconnect,
}

impl Command {
    pub fn kind(&self) -> u16 {
        match self {
            Command::SetArea { .. } => kind::SET_AREA,
            Command::Field { .. } => kind::FIELD,
            Command::FieldDone => kind::FIELD_DONE,
            Command::UpdateEnvironment(_) => kind::UPDATE_ENVIRONMENT,
            Command::Propagate => kind::PROPAGATE,
            Command::Collide => kind::COLLIDE,
            Command::Filter => kind::FILTER,
            Command::GetCell { .. } => kind::GET_CELL,
            Command::SetReqSize(_) => kind::SET_REQ_SIZE,
            Command::SendMinMax => kind::SEND_MIN_MAX,
            Command::SendMass => kind::SEND_MASS,
            Command::FilterDone => kind::FILTER_DONE,
            Command::ResetStats => kind::RESET_STATS,
            Command::Reset => kind::RESET,
            Command::Disconnect => kind::DISCONNECT,
        }
    }

    pub fn encode(&self) -> WireCommand {
        let args = match *self {
            Command::SetArea {
                slice_width,
                dim_y,
                dim_z,
            } => [slice_width as u64, dim_y as u64, dim_z as u64, 0],
            Command::Field { x, y, z } | Command::GetCell { x, y, z } => {
                [x as u64, y as u64, z as u64, 0]
            }
            Command::UpdateEnvironment(env) => [
                env.density.to_bits(),
                env.acceleration.to_bits(),
                env.relaxation.to_bits(),
                env.forcing_guard.to_bits(),
            ],
            Command::SetReqSize(n) => [n as u64, 0, 0, 0],
            _ => [0; 4],
        };
        WireCommand::new(self.kind(), args)
    }

    pub fn decode(w: &WireCommand, from: usize) -> Result<Command, LbmError> {
        if w.version() != WIRE_VERSION {
            return Err(LbmError::Protocol {
                rank: from,
                message: format!("wire version {} != {WIRE_VERSION}", w.version()),
            });
        }
        let u = |i: usize| w.arg(i) as usize;
        Ok(match w.kind() {
            kind::SET_AREA => Command::SetArea {
                slice_width: u(0),
                dim_y: u(1),
                dim_z: u(2),
            },
            kind::FIELD => Command::Field {
                x: u(0),
                y: u(1),
                z: u(2),
            },
            kind::FIELD_DONE => Command::FieldDone,
            kind::UPDATE_ENVIRONMENT => Command::UpdateEnvironment(EnvironmentParameters {
                density: w.arg_f64(0),
                acceleration: w.arg_f64(1),
                relaxation: w.arg_f64(2),
                forcing_guard: w.arg_f64(3),
                ..EnvironmentParameters::default()
            }),
            kind::PROPAGATE => Command::Propagate,
            kind::COLLIDE => Command::Collide,
            kind::FILTER => Command::Filter,
            kind::GET_CELL => Command::GetCell {
                x: u(0),
                y: u(1),
                z: u(2),
            },
            kind::SET_REQ_SIZE => Command::SetReqSize(u(0)),
            kind::SEND_MIN_MAX => Command::SendMinMax,
            kind::SEND_MASS => Command::SendMass,
            kind::FILTER_DONE => Command::FilterDone,
            kind::RESET_STATS => Command::ResetStats,
            kind::RESET => Command::Reset,
            kind::DISCONNECT => Command::Disconnect,
            other => {
                return Err(LbmError::Protocol {
                    rank: from,
                    message: format!("unknown command tag {other}"),
                });
            }
        })
    }
}

pub fn send_command<C: Communicator>(comm: &C, peer: usize, cmd: Command) {
    let w = cmd.encode();
    comm.isend(peer, tags::COMMAND.as_u16(), cast_slice(std::slice::from_ref(&w)))
        .wait();
}

/// Send `cmd` to every worker rank.
pub fn broadcast<C: Communicator>(comm: &C, cmd: Command) {
    for peer in 1..comm.size() {
        send_command(comm, peer, cmd);
    }
}

/// Receive the next command from `from`.
///
/// `Ok(None)` means nothing arrived before the transport gave up; a
/// malformed record is reported as [`LbmError::Protocol`].
pub fn recv_command<C: Communicator>(comm: &C, from: usize) -> Result<Option<Command>, LbmError> {
    let Some(bytes) = comm.recv(from, tags::COMMAND.as_u16(), size_of::<WireCommand>()) else {
        return Ok(None);
    };
    let w: WireCommand = read_record(&bytes).ok_or_else(|| LbmError::Protocol {
        rank: from,
        message: format!("command record of {} bytes", bytes.len()),
    })?;
    Command::decode(&w, from).map(Some)
}

pub fn send_ack<C: Communicator>(comm: &C, to: usize, cmd_kind: u16, ok: bool) {
    let ack = WireAck::new(cmd_kind, comm.rank(), ok);
    comm.isend(to, tags::ACK.as_u16(), cast_slice(std::slice::from_ref(&ack)))
        .wait();
}

/// Wait for an ack of `cmd_kind` from `from`.
pub fn recv_ack<C: Communicator>(comm: &C, from: usize, cmd_kind: u16) -> Result<(), LbmError> {
    let bytes = comm
        .recv(from, tags::ACK.as_u16(), size_of::<WireAck>())
        .ok_or_else(|| LbmError::CommError {
            neighbor: from,
            message: format!("no ack for command {cmd_kind}"),
        })?;
    let ack: WireAck = read_record(&bytes)
        .ok_or_else(|| LbmError::short_read(from, size_of::<WireAck>(), bytes.len()))?;
    if ack.kind() != cmd_kind || ack.rank() != from {
        return Err(LbmError::Protocol {
            rank: from,
            message: format!(
                "ack for command {} from rank {}, expected {cmd_kind}",
                ack.kind(),
                ack.rank()
            ),
        });
    }
    if !ack.ok() {
        return Err(LbmError::Protocol {
            rank: from,
            message: format!("command {cmd_kind} failed on the rank"),
        });
    }
    Ok(())
}
