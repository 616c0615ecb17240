// THEORY:
// The `geometry` module holds the small value types every other layer keys on.
// A `Coordinate` is a plain 3-axis integer slot, a `Direction` is the facing label
// that groups tiles into one composite family, and `TileId` / `EntityId` are opaque
// handles handed to us by the event source.
//
// Key architectural principles:
// 1.  **Value Semantics**: Everything here is `Copy` and compares by value, so two
//     equal coordinates are the same map key regardless of where they came from.
// 2.  **Direction Owns Its Axes**: Each direction knows which world axis it faces and
//     which two axes span its image plane. The layout engine never hard-codes axes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three world axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// The facing label of a tile. Tiles facing the same way belong to the same composite family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::Up,
        Direction::Down,
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    /// The axis this direction looks along.
    pub fn facing_axis(self) -> Axis {
        match self {
            Direction::Up | Direction::Down => Axis::Y,
            Direction::North | Direction::South => Axis::Z,
            Direction::East | Direction::West => Axis::X,
        }
    }

    /// The `(width, height)` axes of the image plane for this direction.
    pub fn layout_axes(self) -> (Axis, Axis) {
        match self {
            Direction::Up | Direction::Down => (Axis::X, Axis::Z),
            Direction::North | Direction::South => (Axis::X, Axis::Y),
            Direction::East | Direction::West => (Axis::Z, Axis::Y),
        }
    }

    /// Quarter turns subtracted from a stored rotation before rendering.
    /// "up" tiles are viewed from below, which inverts them.
    pub fn rotation_offset(self) -> i32 {
        match self {
            Direction::Up => 2,
            _ => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable integer position in the world grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coordinate {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn along(&self, axis: Axis) -> i32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Largest per-axis distance. Two tiles touching on a face, edge or corner are at distance 1.
    pub fn chebyshev_distance(&self, other: &Coordinate) -> u32 {
        self.x
            .abs_diff(other.x)
            .max(self.y.abs_diff(other.y))
            .max(self.z.abs_diff(other.z))
    }

    pub fn squared_distance(&self, other: &Coordinate) -> u64 {
        let dx = self.x.abs_diff(other.x) as u64;
        let dy = self.y.abs_diff(other.y) as u64;
        let dz = self.z.abs_diff(other.z) as u64;
        dx * dx + dy * dy + dz * dz
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Opaque identifier of one distinct image payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileId(pub u64);

/// Opaque identifier of the external entity that carries a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);
