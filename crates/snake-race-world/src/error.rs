//! Error types for the `snake-race-world` crate.
//!
//! Only construction can fail. Once built, a [`Board`](crate::Board) never
//! returns an error: a step either commits or reports an obstacle.

use snake_race_types::Position;

/// Errors raised while assembling a board.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// Width or height is zero or negative.
    #[error("invalid board dimensions {width}x{height}: both must be positive")]
    InvalidDimensions {
        /// Requested width.
        width: i32,
        /// Requested height.
        height: i32,
    },

    /// A placement falls outside the board.
    #[error("position {position} is outside the {width}x{height} board")]
    OutOfBounds {
        /// The offending position.
        position: Position,
        /// Board width.
        width: i32,
        /// Board height.
        height: i32,
    },

    /// A placement targets a cell that already holds a feature.
    #[error("cell {position} already holds a feature")]
    CellOccupied {
        /// The contested cell.
        position: Position,
    },

    /// A teleport pair whose two ends are the same cell.
    #[error("teleport at {position} cannot be paired with itself")]
    DegenerateTeleport {
        /// The cell given for both ends.
        position: Position,
    },

    /// A probability outside `[0, 1]`.
    #[error("probability {value} is outside [0, 1]")]
    InvalidProbability {
        /// The rejected value.
        value: f64,
    },
}
