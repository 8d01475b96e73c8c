//! The shared board and its atomic step operation.
//!
//! # Concurrency
//!
//! Feature membership lives in `dashmap` sets and maps, so lookups and
//! single inserts/removals never need an outer lock. Two compound sequences
//! do need one, and each gets its own mutex:
//!
//! - the **consume region** decides what the mover eats and advances its
//!   body as one unit, so two snakes racing onto the same mouse cannot both
//!   eat it;
//! - the **generation region** serializes respawning after a meal, so two
//!   concurrent respawns never pick the same free cell.
//!
//! A step takes the consume region, releases it, and only then takes the
//! generation region. The two are never held together, and neither is held
//! across an `.await` (the step is synchronous).

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use snake_race_agents::Agent;
use snake_race_types::{AgentId, MoveResult, Position};
use tracing::{debug, warn};

use crate::builder::Feature;
use crate::placement;

/// Chance of an extra turbo pad appearing after a mouse is eaten.
pub const DEFAULT_TURBO_SPAWN_CHANCE: f64 = 0.2;

/// The shared world.
///
/// Built with [`BoardBuilder`](crate::BoardBuilder); afterwards
/// [`Board::step`] is the only way its feature collections change.
#[derive(Debug)]
pub struct Board {
    pub(crate) width: i32,
    pub(crate) height: i32,
    pub(crate) mice: DashSet<Position>,
    pub(crate) obstacles: DashSet<Position>,
    pub(crate) turbo: DashSet<Position>,
    /// Symmetric: `a -> b` is present iff `b -> a` is.
    pub(crate) teleports: DashMap<Position, Position>,
    /// Last known head of every agent that has been registered or stepped.
    pub(crate) heads: DashMap<AgentId, Position>,
    pub(crate) turbo_spawn_chance: f64,
    consume_region: Mutex<()>,
    generation_region: Mutex<()>,
    mice_eaten: AtomicU64,
    turbos_taken: AtomicU64,
    teleports_used: AtomicU64,
    spawns_skipped: AtomicU64,
}

impl Board {
    /// Assemble a board from validated parts. Callers go through the builder.
    pub(crate) fn from_parts(
        width: i32,
        height: i32,
        turbo_spawn_chance: f64,
        heads: DashMap<AgentId, Position>,
    ) -> Self {
        Self {
            width,
            height,
            mice: DashSet::new(),
            obstacles: DashSet::new(),
            turbo: DashSet::new(),
            teleports: DashMap::new(),
            heads,
            turbo_spawn_chance,
            consume_region: Mutex::new(()),
            generation_region: Mutex::new(()),
            mice_eaten: AtomicU64::new(0),
            turbos_taken: AtomicU64::new(0),
            teleports_used: AtomicU64::new(0),
            spawns_skipped: AtomicU64::new(0),
        }
    }

    /// Board width in cells.
    pub const fn width(&self) -> i32 {
        self.width
    }

    /// Board height in cells.
    pub const fn height(&self) -> i32 {
        self.height
    }

    /// Advance `agent` one cell along its heading and resolve what it lands
    /// on.
    ///
    /// An obstacle on the target cell short-circuits: nothing changes and
    /// [`MoveResult::HitObstacle`] is returned. Otherwise a teleport on the
    /// target redirects once to its pair, then a turbo pad or (if there is
    /// no pad) a mouse on the resolved cell is consumed and the body
    /// advances. Eating a mouse respawns one mouse, one obstacle and, by
    /// chance, one turbo pad.
    ///
    /// A turbo pad takes precedence over a mouse sharing its cell: the pad
    /// is consumed and the mouse stays where it is.
    pub fn step(&self, agent: &Agent) -> MoveResult {
        let head = agent.head();
        let direction = agent.direction();
        let target = head.step(direction, self.width, self.height);

        if self.obstacles.contains(&target) {
            debug!(agent_id = %agent.id(), at = %target, "blocked by obstacle");
            return MoveResult::HitObstacle;
        }

        let paired = self.teleport_target(target);
        let landing = paired.unwrap_or(target);

        let (ate_turbo, ate_mouse) = {
            let _consume = self.consume_region.lock();
            let ate_turbo = self.turbo.remove(&landing).is_some();
            let ate_mouse = !ate_turbo && self.mice.remove(&landing).is_some();
            agent.advance(landing, ate_mouse);
            let _ = self.heads.insert(agent.id(), landing);
            (ate_turbo, ate_mouse)
        };

        if ate_mouse {
            let _ = self.mice_eaten.fetch_add(1, Ordering::Relaxed);
            self.respawn_after_meal();
        }
        if ate_turbo {
            let _ = self.turbos_taken.fetch_add(1, Ordering::Relaxed);
        }
        if paired.is_some() {
            let _ = self.teleports_used.fetch_add(1, Ordering::Relaxed);
        }

        let result = if ate_turbo {
            MoveResult::AteTurbo
        } else if ate_mouse {
            MoveResult::AteMouse
        } else if paired.is_some() {
            MoveResult::Teleported
        } else {
            MoveResult::Moved
        };
        debug!(agent_id = %agent.id(), to = %landing, ?result, "step resolved");
        result
    }

    /// Replace the eaten mouse, add an obstacle, and maybe a turbo pad.
    fn respawn_after_meal(&self) {
        let _generation = self.generation_region.lock();
        let mut rng = rand::rng();
        self.spawn(Feature::Mouse, &mut rng);
        self.spawn(Feature::Obstacle, &mut rng);
        if rng.random_bool(self.turbo_spawn_chance) {
            self.spawn(Feature::Turbo, &mut rng);
        }
    }

    /// Place one feature on a free cell. Must run inside the generation
    /// region.
    fn spawn<R: Rng + ?Sized>(&self, feature: Feature, rng: &mut R) {
        let Some(cell) =
            placement::random_empty(rng, self.width, self.height, |p| self.is_taken(p))
        else {
            let _ = self.spawns_skipped.fetch_add(1, Ordering::Relaxed);
            warn!(?feature, "no free cell, spawn skipped");
            return;
        };
        let set = match feature {
            Feature::Mouse => &self.mice,
            Feature::Obstacle => &self.obstacles,
            Feature::Turbo => &self.turbo,
        };
        let _ = set.insert(cell);
        debug!(?feature, at = %cell, "feature spawned");
    }

    /// Whether a cell holds any feature or sits under a known head.
    fn is_taken(&self, p: Position) -> bool {
        self.holds_feature(p) || self.heads.iter().any(|entry| *entry.value() == p)
    }

    /// Whether a cell holds any of the four feature kinds.
    pub fn holds_feature(&self, p: Position) -> bool {
        self.mice.contains(&p)
            || self.obstacles.contains(&p)
            || self.turbo.contains(&p)
            || self.teleports.contains_key(&p)
    }

    /// Whether a mouse sits on `p`.
    pub fn has_mouse(&self, p: Position) -> bool {
        self.mice.contains(&p)
    }

    /// Whether an obstacle sits on `p`.
    pub fn has_obstacle(&self, p: Position) -> bool {
        self.obstacles.contains(&p)
    }

    /// Whether a turbo pad sits on `p`.
    pub fn has_turbo(&self, p: Position) -> bool {
        self.turbo.contains(&p)
    }

    /// The paired cell if `p` is a teleport end.
    pub fn teleport_target(&self, p: Position) -> Option<Position> {
        self.teleports.get(&p).map(|entry| *entry.value())
    }

    /// Number of mice on the board.
    pub fn mouse_count(&self) -> usize {
        self.mice.len()
    }

    /// Number of obstacles on the board.
    pub fn obstacle_count(&self) -> usize {
        self.obstacles.len()
    }

    /// Number of turbo pads on the board.
    pub fn turbo_count(&self) -> usize {
        self.turbo.len()
    }

    /// Number of teleport pairs on the board.
    pub fn teleport_pair_count(&self) -> usize {
        self.teleports.len().saturating_div(2)
    }

    /// Last head position the board has recorded for `id`.
    pub fn known_head(&self, id: AgentId) -> Option<Position> {
        self.heads.get(&id).map(|entry| *entry.value())
    }

    /// Running totals since the board was built.
    pub fn stats(&self) -> BoardStats {
        BoardStats {
            mice_eaten: self.mice_eaten.load(Ordering::Relaxed),
            turbos_taken: self.turbos_taken.load(Ordering::Relaxed),
            teleports_used: self.teleports_used.load(Ordering::Relaxed),
            spawns_skipped: self.spawns_skipped.load(Ordering::Relaxed),
        }
    }

    /// Owned, sorted copy of every feature for renderers.
    ///
    /// Each collection is copied independently, so a snapshot taken during
    /// a respawn may show the new mouse without the new obstacle.
    pub fn snapshot(&self) -> BoardSnapshot {
        let mut mice: Vec<Position> = self.mice.iter().map(|p| *p).collect();
        let mut obstacles: Vec<Position> = self.obstacles.iter().map(|p| *p).collect();
        let mut turbo_pads: Vec<Position> = self.turbo.iter().map(|p| *p).collect();
        let mut teleports: Vec<(Position, Position)> = self
            .teleports
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        mice.sort_unstable();
        obstacles.sort_unstable();
        turbo_pads.sort_unstable();
        teleports.sort_unstable();
        BoardSnapshot {
            width: self.width,
            height: self.height,
            mice,
            obstacles,
            turbo_pads,
            teleports,
        }
    }
}

/// Counters accumulated by [`Board::step`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardStats {
    /// Mice consumed.
    pub mice_eaten: u64,
    /// Turbo pads consumed.
    pub turbos_taken: u64,
    /// Steps that went through a teleport.
    pub teleports_used: u64,
    /// Respawns dropped because the board had no free cell.
    pub spawns_skipped: u64,
}

/// Read-only copy of the board for the render collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    /// Board width in cells.
    pub width: i32,
    /// Board height in cells.
    pub height: i32,
    /// Mouse cells, sorted.
    pub mice: Vec<Position>,
    /// Obstacle cells, sorted.
    pub obstacles: Vec<Position>,
    /// Turbo pad cells, sorted.
    pub turbo_pads: Vec<Position>,
    /// Teleport entries `(from, to)`, both directions, sorted.
    pub teleports: Vec<(Position, Position)>,
}
