//! Fixed, versioned, little-endian wire records for the rank protocol.
//!
//! All multi-byte integers are stored pre-LE with `.to_le()` and decoded with
//! `.from_le()`. `f64` values travel as their LE bit patterns.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

/// Decode a record array from a received byte buffer. The buffer may be
/// unaligned, so records are copied out.
pub fn read_records<T: Pod>(bytes: &[u8]) -> Option<Vec<T>> {
    if bytes.len() % size_of::<T>() != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect(),
    )
}

pub fn read_record<T: Pod>(bytes: &[u8]) -> Option<T> {
    (bytes.len() == size_of::<T>()).then(|| bytemuck::pod_read_unaligned(bytes))
}

#[inline]
pub fn f64_to_wire(v: f64) -> u64 {
    v.to_bits().to_le()
}

#[inline]
pub fn f64_from_wire(w: u64) -> f64 {
    f64::from_bits(u64::from_le(w))
}

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// One command from the orchestrator. `args` is interpreted per `kind`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCommand {
    pub version_le: u16,
    pub kind_le: u16,
    pub reserved_le: u32,
    pub args_le: [u64; 4],
}

impl WireCommand {
    pub fn new(kind: u16, args: [u64; 4]) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
            args_le: args.map(u64::to_le),
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn arg(&self, i: usize) -> u64 {
        u64::from_le(self.args_le[i])
    }
    pub fn arg_f64(&self, i: usize) -> f64 {
        f64_from_wire(self.args_le[i])
    }
}

/// Acknowledgement of a command that mutates rank configuration.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireAck {
    pub kind_le: u16,
    pub ok_le: u16,
    pub rank_le: u32,
}

impl WireAck {
    pub fn new(kind: u16, rank: usize, ok: bool) -> Self {
        Self {
            kind_le: kind.to_le(),
            ok_le: (ok as u16).to_le(),
            rank_le: (rank as u32).to_le(),
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn ok(&self) -> bool {
        u16::from_le(self.ok_le) != 0
    }
    pub fn rank(&self) -> usize {
        u32::from_le(self.rank_le) as usize
    }
}

/// Slab-local lattice coordinate in a sampling request.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WireCellCoord {
    pub x_le: u32,
    pub y_le: u32,
    pub z_le: u32,
}

impl WireCellCoord {
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Self {
            x_le: (x as u32).to_le(),
            y_le: (y as u32).to_le(),
            z_le: (z as u32).to_le(),
        }
    }
    pub fn get(&self) -> (usize, usize, usize) {
        (
            u32::from_le(self.x_le) as usize,
            u32::from_le(self.y_le) as usize,
            u32::from_le(self.z_le) as usize,
        )
    }
}

/// `(density, velocity, solid)` of one cell.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct WireCellSample {
    pub density_le: u64,
    pub velocity_le: [u64; 3],
    pub solid_le: u64,
}

impl WireCellSample {
    pub fn new(density: f64, velocity: [f64; 3], solid: bool) -> Self {
        Self {
            density_le: f64_to_wire(density),
            velocity_le: velocity.map(f64_to_wire),
            solid_le: (solid as u64).to_le(),
        }
    }
    pub fn density(&self) -> f64 {
        f64_from_wire(self.density_le)
    }
    pub fn velocity(&self) -> [f64; 3] {
        self.velocity_le.map(f64_from_wire)
    }
    pub fn solid(&self) -> bool {
        u64::from_le(self.solid_le) != 0
    }
}

/// Rank-local extrema of density and squared speed.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct WireMinMax {
    pub values_le: [u64; 4],
}

impl WireMinMax {
    pub fn new(density_min: f64, density_max: f64, speed2_min: f64, speed2_max: f64) -> Self {
        Self {
            values_le: [density_min, density_max, speed2_min, speed2_max].map(f64_to_wire),
        }
    }
    pub fn values(&self) -> [f64; 4] {
        self.values_le.map(f64_from_wire)
    }
}

const_assert_eq!(size_of::<WireCommand>(), 40);
const_assert_eq!(size_of::<WireAck>(), 8);
const_assert_eq!(size_of::<WireCellCoord>(), 12);
const_assert_eq!(size_of::<WireCellSample>(), 40);
const_assert_eq!(size_of::<WireMinMax>(), 32);
