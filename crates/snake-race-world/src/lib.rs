//! Shared world state for the Snake Race simulation.
//!
//! The [`Board`] holds every world feature (mice, obstacles, turbo pads,
//! teleport pairs) and exposes a single mutating operation,
//! [`Board::step`], which many runner tasks call concurrently.
//!
//! # Modules
//!
//! - [`board`] -- The shared board and its step operation.
//! - [`builder`] -- [`BoardBuilder`] for validated construction and random
//!   scattering of the initial features.
//! - [`error`] -- Error types for board construction.
//! - [`placement`] -- Bounded free-cell search.

pub mod board;
pub mod builder;
pub mod error;
pub mod placement;

pub use board::{Board, BoardSnapshot, BoardStats, DEFAULT_TURBO_SPAWN_CHANCE};
pub use builder::{BoardBuilder, Feature, FeatureLayout};
pub use error::WorldError;
