//! Game clock, snake runners, and simulation lifecycle for Snake Race.
//!
//! This crate owns the concurrency engine: one tokio task per snake
//! ([`runner`]), one periodic task for the global heartbeat ([`clock`]),
//! and the host-side [`Simulation`] that wires them to a shared board.
//!
//! # Modules
//!
//! - [`clock`] -- [`GameClock`] and the [`ClockListener`] observer trait.
//! - [`config`] -- Configuration loading from `snake-race-config.yaml` into
//!   strongly-typed structs.
//! - [`runner`] -- [`SnakeRunner`], the per-snake movement loop, and its
//!   [`RunnerHandle`] control surface.
//! - [`simulation`] -- [`Simulation`], the lifecycle owner that exposes
//!   start/pause/resume/stop and aggregate queries.
//!
//! [`GameClock`]: clock::GameClock
//! [`ClockListener`]: clock::ClockListener
//! [`SnakeRunner`]: runner::SnakeRunner
//! [`RunnerHandle`]: runner::RunnerHandle
//! [`Simulation`]: simulation::Simulation

pub mod clock;
pub mod config;
pub mod runner;
pub mod simulation;

pub use simulation::Simulation;
