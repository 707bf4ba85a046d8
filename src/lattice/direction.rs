//! The D3Q19 velocity stencil.
//!
//! This is the only place the discrete velocity set is defined. Every other
//! module addresses distribution components through [`Direction`] and reads
//! offsets, opposites and lattice weights from [`Direction::stencil`].
//!
//! Layout of the 19 directions:
//! - 1 rest (0)
//! - 6 axis neighbours (±x, ±y, ±z)
//! - 12 diagonal neighbours (±x±y, ±x±z, ±y±z)
//!
//! Opposite directions are stored next to each other so that the nine
//! bounce-back pairs are `(1,2), (3,4), ..., (17,18)`.

/// Number of discrete velocities.
pub const Q: usize = 19;

/// Number of components whose propagation crosses one x-face of a slab.
pub const FACE_COMPONENTS: usize = 5;

/// Lattice speed of sound squared, c_s² = 1/3.
pub const CS2: f64 = 1.0 / 3.0;

/// Lattice weight class of a direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum WeightClass {
    Rest,
    Axis,
    Diagonal,
}

impl WeightClass {
    #[inline]
    pub const fn weight(self) -> f64 {
        match self {
            WeightClass::Rest => 1.0 / 3.0,
            WeightClass::Axis => 1.0 / 18.0,
            WeightClass::Diagonal => 1.0 / 36.0,
        }
    }
}

/// One row of the stencil table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Stencil {
    pub dx: i32,
    pub dy: i32,
    pub dz: i32,
    pub opposite: Direction,
    pub class: WeightClass,
}

/// Discrete velocity directions, named by compass (x = east, y = north,
/// z = top).
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Rest = 0,
    East = 1,
    West = 2,
    North = 3,
    South = 4,
    Top = 5,
    Bottom = 6,
    NorthEast = 7,
    SouthWest = 8,
    SouthEast = 9,
    NorthWest = 10,
    TopEast = 11,
    BottomWest = 12,
    BottomEast = 13,
    TopWest = 14,
    TopNorth = 15,
    BottomSouth = 16,
    BottomNorth = 17,
    TopSouth = 18,
}

use Direction::*;
use WeightClass::{Axis, Diagonal};

const fn row(dx: i32, dy: i32, dz: i32, opposite: Direction, class: WeightClass) -> Stencil {
    Stencil {
        dx,
        dy,
        dz,
        opposite,
        class,
    }
}

static STENCIL: [Stencil; Q] = [
    row(0, 0, 0, Rest, WeightClass::Rest),
    row(1, 0, 0, West, Axis),
    row(-1, 0, 0, East, Axis),
    row(0, 1, 0, South, Axis),
    row(0, -1, 0, North, Axis),
    row(0, 0, 1, Bottom, Axis),
    row(0, 0, -1, Top, Axis),
    row(1, 1, 0, SouthWest, Diagonal),
    row(-1, -1, 0, NorthEast, Diagonal),
    row(1, -1, 0, NorthWest, Diagonal),
    row(-1, 1, 0, SouthEast, Diagonal),
    row(1, 0, 1, BottomWest, Diagonal),
    row(-1, 0, -1, TopEast, Diagonal),
    row(1, 0, -1, TopWest, Diagonal),
    row(-1, 0, 1, BottomEast, Diagonal),
    row(0, 1, 1, BottomSouth, Diagonal),
    row(0, -1, -1, TopNorth, Diagonal),
    row(0, 1, -1, TopSouth, Diagonal),
    row(0, -1, 1, BottomNorth, Diagonal),
];

impl Direction {
    /// All directions in index order.
    pub const ALL: [Direction; Q] = [
        Rest,
        East,
        West,
        North,
        South,
        Top,
        Bottom,
        NorthEast,
        SouthWest,
        SouthEast,
        NorthWest,
        TopEast,
        BottomWest,
        BottomEast,
        TopWest,
        TopNorth,
        BottomSouth,
        BottomNorth,
        TopSouth,
    ];

    /// The 18 moving directions.
    pub const MOVING: [Direction; Q - 1] = [
        East,
        West,
        North,
        South,
        Top,
        Bottom,
        NorthEast,
        SouthWest,
        SouthEast,
        NorthWest,
        TopEast,
        BottomWest,
        BottomEast,
        TopWest,
        TopNorth,
        BottomSouth,
        BottomNorth,
        TopSouth,
    ];

    /// The nine opposite-direction pairs swapped by bounce-back.
    pub const PAIRS: [(Direction, Direction); 9] = [
        (East, West),
        (North, South),
        (Top, Bottom),
        (NorthEast, SouthWest),
        (SouthEast, NorthWest),
        (TopEast, BottomWest),
        (BottomEast, TopWest),
        (TopNorth, BottomSouth),
        (BottomNorth, TopSouth),
    ];

    /// Components travelling in +x, i.e. leaving through the east face.
    /// `EASTBOUND[k]` is the opposite of `WESTBOUND[k]`.
    pub const EASTBOUND: [Direction; FACE_COMPONENTS] =
        [East, NorthEast, SouthEast, TopEast, BottomEast];

    /// Components travelling in -x, i.e. leaving through the west face.
    pub const WESTBOUND: [Direction; FACE_COMPONENTS] =
        [West, SouthWest, NorthWest, BottomWest, TopWest];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn stencil(self) -> &'static Stencil {
        &STENCIL[self as usize]
    }

    #[inline]
    pub fn offset(self) -> (i32, i32, i32) {
        let s = self.stencil();
        (s.dx, s.dy, s.dz)
    }

    #[inline]
    pub fn opposite(self) -> Direction {
        self.stencil().opposite
    }

    #[inline]
    pub fn weight(self) -> f64 {
        self.stencil().class.weight()
    }

    /// True when the linear (x-major) index offset of this direction is
    /// positive. Streaming in place must visit cells in descending order for
    /// these directions and ascending order for the others.
    #[inline]
    pub fn is_forward(self) -> bool {
        let s = self.stencil();
        if s.dx != 0 {
            s.dx > 0
        } else if s.dy != 0 {
            s.dy > 0
        } else {
            s.dz > 0
        }
    }
}
