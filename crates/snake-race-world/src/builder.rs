//! Validated construction of a [`Board`].
//!
//! The builder is the only place features are placed by hand. It enforces
//! the board invariants up front (cells in bounds, at most one feature per
//! cell, symmetric teleports) so the finished board can rely on them.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use snake_race_types::{AgentId, Position};
use tracing::{debug, warn};

use crate::board::{Board, DEFAULT_TURBO_SPAWN_CHANCE};
use crate::error::WorldError;
use crate::placement;

/// A single-cell feature kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// Food; eating one grows the snake and triggers a respawn.
    Mouse,
    /// Blocks movement.
    Obstacle,
    /// Grants a temporary speed boost.
    Turbo,
}

/// How many features to scatter at random on a fresh board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureLayout {
    /// Initial mice.
    #[serde(default = "default_mice")]
    pub mice: usize,
    /// Initial obstacles.
    #[serde(default = "default_obstacles")]
    pub obstacles: usize,
    /// Initial turbo pads.
    #[serde(default = "default_turbo_pads")]
    pub turbo_pads: usize,
    /// Initial teleport pairs (two cells each).
    #[serde(default = "default_teleport_pairs")]
    pub teleport_pairs: usize,
}

impl Default for FeatureLayout {
    fn default() -> Self {
        Self {
            mice: default_mice(),
            obstacles: default_obstacles(),
            turbo_pads: default_turbo_pads(),
            teleport_pairs: default_teleport_pairs(),
        }
    }
}

const fn default_mice() -> usize {
    6
}

const fn default_obstacles() -> usize {
    4
}

const fn default_turbo_pads() -> usize {
    3
}

const fn default_teleport_pairs() -> usize {
    2
}

/// Collects features and agent heads, then freezes them into a [`Board`].
#[derive(Debug, Clone)]
pub struct BoardBuilder {
    width: i32,
    height: i32,
    mice: HashSet<Position>,
    obstacles: HashSet<Position>,
    turbo: HashSet<Position>,
    teleports: HashMap<Position, Position>,
    heads: HashMap<AgentId, Position>,
    turbo_spawn_chance: f64,
}

impl BoardBuilder {
    /// Start an empty `width` x `height` board.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidDimensions`] unless both are positive.
    pub fn new(width: i32, height: i32) -> Result<Self, WorldError> {
        if width <= 0 || height <= 0 {
            return Err(WorldError::InvalidDimensions { width, height });
        }
        Ok(Self {
            width,
            height,
            mice: HashSet::new(),
            obstacles: HashSet::new(),
            turbo: HashSet::new(),
            teleports: HashMap::new(),
            heads: HashMap::new(),
            turbo_spawn_chance: DEFAULT_TURBO_SPAWN_CHANCE,
        })
    }

    /// Put `feature` on `at`.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::OutOfBounds`] or [`WorldError::CellOccupied`].
    pub fn place(&mut self, feature: Feature, at: Position) -> Result<&mut Self, WorldError> {
        self.check_free(at)?;
        let _ = match feature {
            Feature::Mouse => self.mice.insert(at),
            Feature::Obstacle => self.obstacles.insert(at),
            Feature::Turbo => self.turbo.insert(at),
        };
        Ok(self)
    }

    /// Link two cells as a teleport pair, in both directions.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DegenerateTeleport`] if `a == b`, otherwise the
    /// same errors as [`BoardBuilder::place`] for either end.
    pub fn link_teleports(&mut self, a: Position, b: Position) -> Result<&mut Self, WorldError> {
        if a == b {
            return Err(WorldError::DegenerateTeleport { position: a });
        }
        self.check_free(a)?;
        self.check_free(b)?;
        let _ = self.teleports.insert(a, b);
        let _ = self.teleports.insert(b, a);
        Ok(self)
    }

    /// Register an agent's starting head so random placement avoids it.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::OutOfBounds`] if `head` is off the board.
    pub fn agent(&mut self, id: AgentId, head: Position) -> Result<&mut Self, WorldError> {
        self.check_bounds(head)?;
        let _ = self.heads.insert(id, head);
        Ok(self)
    }

    /// Chance of a bonus turbo pad after each meal.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidProbability`] outside `[0, 1]`.
    pub fn turbo_spawn_chance(&mut self, chance: f64) -> Result<&mut Self, WorldError> {
        if !(0.0..=1.0).contains(&chance) {
            return Err(WorldError::InvalidProbability { value: chance });
        }
        self.turbo_spawn_chance = chance;
        Ok(self)
    }

    /// Scatter `layout` on free cells, avoiding placed features and
    /// registered heads. Features that find no room are dropped with a
    /// warning.
    pub fn scatter(&mut self, layout: &FeatureLayout) -> &mut Self {
        let mut rng = rand::rng();
        for (feature, count) in [
            (Feature::Mouse, layout.mice),
            (Feature::Obstacle, layout.obstacles),
            (Feature::Turbo, layout.turbo_pads),
        ] {
            for _ in 0..count {
                let Some(cell) = self.free_cell(&mut rng) else {
                    warn!(?feature, "board full while scattering");
                    return self;
                };
                let _ = self.place(feature, cell);
            }
        }
        for _ in 0..layout.teleport_pairs {
            let Some(a) = self.free_cell(&mut rng) else {
                warn!("board full while scattering teleports");
                return self;
            };
            // Reserve `a` so the second end cannot land on it.
            let _ = self.teleports.insert(a, a);
            let b = self.free_cell(&mut rng);
            let _ = self.teleports.remove(&a);
            let Some(b) = b else {
                warn!("board full while scattering teleports");
                return self;
            };
            let _ = self.link_teleports(a, b);
        }
        debug!(
            mice = self.mice.len(),
            obstacles = self.obstacles.len(),
            turbo_pads = self.turbo.len(),
            teleport_pairs = self.teleports.len() / 2,
            "features scattered"
        );
        self
    }

    /// Freeze into a shareable board.
    pub fn build(self) -> Board {
        let heads: DashMap<AgentId, Position> = self.heads.into_iter().collect();
        let board = Board::from_parts(self.width, self.height, self.turbo_spawn_chance, heads);
        for p in self.mice {
            let _ = board.mice.insert(p);
        }
        for p in self.obstacles {
            let _ = board.obstacles.insert(p);
        }
        for p in self.turbo {
            let _ = board.turbo.insert(p);
        }
        for (from, to) in self.teleports {
            let _ = board.teleports.insert(from, to);
        }
        board
    }

    fn free_cell(&self, rng: &mut rand::rngs::ThreadRng) -> Option<Position> {
        placement::random_empty(rng, self.width, self.height, |p| {
            self.holds_feature(p) || self.heads.values().any(|h| *h == p)
        })
    }

    fn holds_feature(&self, p: Position) -> bool {
        self.mice.contains(&p)
            || self.obstacles.contains(&p)
            || self.turbo.contains(&p)
            || self.teleports.contains_key(&p)
    }

    const fn check_bounds(&self, p: Position) -> Result<(), WorldError> {
        if p.in_bounds(self.width, self.height) {
            Ok(())
        } else {
            Err(WorldError::OutOfBounds {
                position: p,
                width: self.width,
                height: self.height,
            })
        }
    }

    fn check_free(&self, p: Position) -> Result<(), WorldError> {
        self.check_bounds(p)?;
        if self.holds_feature(p) {
            return Err(WorldError::CellOccupied { position: p });
        }
        Ok(())
    }
}
