//! Enumeration types for the Snake Race simulation.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// A heading on the grid.
///
/// Screen coordinates: `y` grows downwards, so [`Direction::Up`] moves to
/// the previous row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Towards row 0.
    Up,
    /// Towards the last row.
    Down,
    /// Towards column 0.
    Left,
    /// Towards the last column.
    Right,
}

impl Direction {
    /// All four headings, in declaration order.
    pub const ALL: [Self; 4] = [Self::Up, Self::Down, Self::Left, Self::Right];

    /// Unit displacement `(dx, dy)` for one step in this direction.
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }

    /// The heading pointing the other way.
    pub const fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// Global lifecycle state, owned by the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameState {
    /// Not ticking. The initial state, and the state after `stop`.
    Stopped,
    /// Schedule alive but ticks suppressed.
    Paused,
    /// Ticks delivered every period.
    Running,
}

impl GameState {
    /// Compact encoding for storage in an atomic.
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Paused => 1,
            Self::Running => 2,
        }
    }

    /// Inverse of [`GameState::as_u8`]. Unknown values decode as
    /// [`GameState::Stopped`].
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Paused,
            2 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

// ---------------------------------------------------------------------------
// MoveResult
// ---------------------------------------------------------------------------

/// Outcome of one board step.
///
/// When several effects coincide the most significant one is reported:
/// `AteTurbo` > `AteMouse` > `Teleported` > `Moved`. `HitObstacle` means
/// nothing was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveResult {
    /// Advanced onto an empty cell.
    Moved,
    /// Advanced and consumed a mouse.
    AteMouse,
    /// The target cell holds an obstacle; the snake did not move.
    HitObstacle,
    /// Advanced and consumed a turbo pad.
    AteTurbo,
    /// Advanced through a teleport to its paired cell.
    Teleported,
}

impl MoveResult {
    /// Whether the snake's body changed.
    pub const fn advanced(self) -> bool {
        !matches!(self, Self::HitObstacle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_are_unit_vectors() {
        for dir in Direction::ALL {
            let (dx, dy) = dir.delta();
            assert_eq!(dx.abs() + dy.abs(), 1, "{dir:?}");
        }
    }

    #[test]
    fn opposite_cancels_delta() {
        for dir in Direction::ALL {
            let (dx, dy) = dir.delta();
            let (ox, oy) = dir.opposite().delta();
            assert_eq!((dx + ox, dy + oy), (0, 0));
            assert_eq!(dir.opposite().opposite(), dir);
        }
    }

    #[test]
    fn game_state_round_trips_through_u8() {
        for state in [GameState::Stopped, GameState::Paused, GameState::Running] {
            assert_eq!(GameState::from_u8(state.as_u8()), state);
        }
        assert_eq!(GameState::from_u8(200), GameState::Stopped);
    }

    #[test]
    fn only_obstacle_blocks_advance() {
        assert!(!MoveResult::HitObstacle.advanced());
        assert!(MoveResult::Moved.advanced());
        assert!(MoveResult::AteTurbo.advanced());
    }
}
