//! Shared value types for the Snake Race simulation.
//!
//! Every other crate in the workspace speaks in these types: grid
//! coordinates, headings, the global lifecycle state, and the outcome of a
//! single board step.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrapper for agent identity
//! - [`enums`] -- [`Direction`], [`GameState`], [`MoveResult`]
//! - [`position`] -- Toroidal grid coordinates

pub mod enums;
pub mod ids;
pub mod position;

pub use enums::{Direction, GameState, MoveResult};
pub use ids::AgentId;
pub use position::Position;
