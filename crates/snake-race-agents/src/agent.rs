//! A single snake and its thread-safe accessors.
//!
//! # Concurrency
//!
//! The body lives behind a reader/writer lock. [`Agent::advance`] applies a
//! whole move (new head, growth, tail trim) under one write guard, and
//! [`Agent::snapshot`] copies the body under a read guard, so a reader sees
//! either the old body or the new one, never a mix.
//!
//! The heading has its own lock so that input handlers can steer without
//! contending with body readers.

use std::collections::VecDeque;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use snake_race_types::{AgentId, Direction, Position};
use tracing::trace;

/// Body length a fresh snake grows to before it has eaten anything.
pub const DEFAULT_TARGET_LENGTH: usize = 5;

/// Mutable body state. The head is kept apart from the trail so the body is
/// never empty.
#[derive(Debug)]
struct Body {
    head: Position,
    /// Cells behind the head, nearest first.
    trail: VecDeque<Position>,
    /// Length the body grows (or shrinks) towards on each advance.
    target_length: usize,
}

impl Body {
    fn len(&self) -> usize {
        self.trail.len().saturating_add(1)
    }
}

/// A snake on the board.
///
/// Shared as `Arc<Agent>` between its runner, the board, and any number of
/// readers.
#[derive(Debug)]
pub struct Agent {
    id: AgentId,
    body: RwLock<Body>,
    direction: Mutex<Direction>,
}

impl Agent {
    /// Create a one-cell snake at `head` facing `direction`.
    pub fn new(head: Position, direction: Direction) -> Self {
        Self::with_id(AgentId::new(), head, direction)
    }

    /// Create a snake with a caller-chosen identity.
    pub fn with_id(id: AgentId, head: Position, direction: Direction) -> Self {
        Self {
            id,
            body: RwLock::new(Body {
                head,
                trail: VecDeque::new(),
                target_length: DEFAULT_TARGET_LENGTH,
            }),
            direction: Mutex::new(direction),
        }
    }

    /// Override the initial growth target. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_target_length(mut self, target_length: usize) -> Self {
        self.body.get_mut().target_length = target_length.max(1);
        self
    }

    /// This snake's identity.
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// Current head cell.
    pub fn head(&self) -> Position {
        self.body.read().head
    }

    /// Current heading.
    pub fn direction(&self) -> Direction {
        *self.direction.lock()
    }

    /// Steer the snake. Safe to call from any thread; the last writer wins.
    ///
    /// Turning straight back onto the neck is ignored. Returns whether the
    /// heading was changed.
    pub fn turn(&self, direction: Direction) -> bool {
        let mut current = self.direction.lock();
        if direction == current.opposite() {
            return false;
        }
        *current = direction;
        true
    }

    /// Number of cells currently occupied.
    pub fn length(&self) -> usize {
        self.body.read().len()
    }

    /// Move the head to `next`. When `grow` is set the growth target rises
    /// by one, so the tail stays put on this advance.
    ///
    /// Called by the board's step operation; the body update is atomic with
    /// respect to [`Agent::snapshot`].
    pub fn advance(&self, next: Position, grow: bool) {
        let mut body = self.body.write();
        let previous = body.head;
        body.trail.push_front(previous);
        body.head = next;
        if grow {
            body.target_length = body.target_length.saturating_add(1);
        }
        while body.len() > body.target_length {
            let _ = body.trail.pop_back();
        }
        trace!(agent_id = %self.id, from = %previous, to = %next, grow, "agent advanced");
    }

    /// Copy the current state for rendering or ranking.
    pub fn snapshot(&self) -> AgentSnapshot {
        let direction = self.direction();
        let body = self.body.read();
        let mut cells = Vec::with_capacity(body.len());
        cells.push(body.head);
        cells.extend(body.trail.iter().copied());
        AgentSnapshot {
            id: self.id,
            length: cells.len(),
            body: cells,
            direction,
        }
    }
}

/// Immutable copy of an agent, safe to hold across threads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// The snake's identity.
    pub id: AgentId,
    /// Body cells, head first.
    pub body: Vec<Position>,
    /// Heading at the time of the snapshot.
    pub direction: Direction,
    /// Number of cells in `body`.
    pub length: usize,
}

impl AgentSnapshot {
    /// Head cell of the copied body.
    pub fn head(&self) -> Option<Position> {
        self.body.first().copied()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    fn agent_at(x: i32, y: i32) -> Agent {
        Agent::new(Position::new(x, y), Direction::Right)
    }

    #[test]
    fn new_agent_is_one_cell() {
        let agent = agent_at(3, 4);
        assert_eq!(agent.length(), 1);
        assert_eq!(agent.head(), Position::new(3, 4));
        assert_eq!(agent.snapshot().body, vec![Position::new(3, 4)]);
    }

    #[test]
    fn grows_to_default_target_then_keeps_length() {
        let agent = agent_at(0, 0);
        for x in 1..10 {
            agent.advance(Position::new(x, 0), false);
        }
        assert_eq!(agent.length(), DEFAULT_TARGET_LENGTH);
        let snap = agent.snapshot();
        assert_eq!(snap.head(), Some(Position::new(9, 0)));
        assert_eq!(snap.body[4], Position::new(5, 0));
    }

    #[test]
    fn eating_raises_the_target() {
        let agent = agent_at(0, 0).with_target_length(2);
        agent.advance(Position::new(1, 0), false);
        agent.advance(Position::new(2, 0), true);
        assert_eq!(agent.length(), 3);
        agent.advance(Position::new(3, 0), false);
        assert_eq!(agent.length(), 3);
    }

    #[test]
    fn target_length_is_at_least_one() {
        let agent = agent_at(0, 0).with_target_length(0);
        agent.advance(Position::new(1, 0), false);
        assert_eq!(agent.length(), 1);
        assert_eq!(agent.head(), Position::new(1, 0));
    }

    #[test]
    fn reversal_is_ignored() {
        let agent = agent_at(0, 0);
        assert!(!agent.turn(Direction::Left));
        assert_eq!(agent.direction(), Direction::Right);
        assert!(agent.turn(Direction::Up));
        assert_eq!(agent.direction(), Direction::Up);
        assert!(!agent.turn(Direction::Down));
    }

    #[test]
    fn snapshot_serializes() {
        let agent = agent_at(1, 1);
        let json = serde_json::to_value(agent.snapshot()).unwrap();
        assert_eq!(json["length"], 1);
        assert_eq!(json["direction"], "Right");
    }

    #[test]
    fn concurrent_snapshots_never_see_partial_moves() {
        let agent = Arc::new(agent_at(0, 0).with_target_length(8));
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let agent = Arc::clone(&agent);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                for i in 1..5_000 {
                    agent.advance(Position::new(i % 50, 0), false);
                }
                done.store(true, Ordering::Release);
            })
        };

        while !done.load(Ordering::Acquire) {
            let snap = agent.snapshot();
            assert_eq!(snap.length, snap.body.len());
            assert!(snap.length <= 8);
            // Consecutive cells differ by exactly one column on the 50-wide strip.
            for pair in snap.body.windows(2) {
                let dx = (pair[0].x - pair[1].x).rem_euclid(50);
                assert_eq!(dx, 1, "torn body: {:?}", snap.body);
            }
        }
        writer.join().unwrap();
        assert_eq!(agent.length(), 8);
    }
}
