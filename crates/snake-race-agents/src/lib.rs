//! Snake state for the Snake Race simulation.
//!
//! An [`Agent`] is one snake: an identity, a body of grid cells, a heading,
//! and a growth target. The body is advanced only by the board's step
//! operation on behalf of the snake's own runner, while renderers and
//! input handlers touch the same agent from other threads.
//!
//! # Modules
//!
//! - [`agent`] -- The shared [`Agent`] and its [`AgentSnapshot`].

pub mod agent;

pub use agent::{Agent, AgentSnapshot, DEFAULT_TARGET_LENGTH};
