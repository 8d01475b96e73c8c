//! Grid coordinates on a toroidal board.

use serde::{Deserialize, Serialize};

use crate::enums::Direction;

/// A cell on the board.
///
/// Positions are plain values: equality and hashing go by coordinate. They
/// carry no knowledge of the board size, so wrapping is always explicit via
/// [`Position::wrap`] or [`Position::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Column, `0..width` once wrapped.
    pub x: i32,
    /// Row, `0..height` once wrapped.
    pub y: i32,
}

impl Position {
    /// Create a position from raw coordinates.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Fold the coordinates back onto a `width` x `height` torus.
    ///
    /// Negative coordinates wrap to the far edge. A non-positive dimension
    /// leaves that coordinate untouched; boards reject such dimensions at
    /// construction.
    pub const fn wrap(self, width: i32, height: i32) -> Self {
        Self {
            x: wrap_axis(self.x, width),
            y: wrap_axis(self.y, height),
        }
    }

    /// The neighbouring cell in `direction`, wrapped onto the board.
    pub const fn step(self, direction: Direction, width: i32, height: i32) -> Self {
        let (dx, dy) = direction.delta();
        Self::new(self.x.wrapping_add(dx), self.y.wrapping_add(dy)).wrap(width, height)
    }

    /// Whether the position lies inside a `width` x `height` board.
    pub const fn in_bounds(self, width: i32, height: i32) -> bool {
        self.x >= 0 && self.y >= 0 && self.x < width && self.y < height
    }
}

impl core::fmt::Display for Position {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

const fn wrap_axis(value: i32, extent: i32) -> i32 {
    if extent <= 0 {
        return value;
    }
    value.rem_euclid(extent)
}
