//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode during startup and the run
//! loop so `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: snake_race_core::config::ConfigError,
    },

    /// Building or driving the simulation failed.
    #[error("simulation error: {source}")]
    Simulation {
        /// The underlying simulation error.
        #[from]
        source: snake_race_core::simulation::SimulationError,
    },

    /// The log filter could not be parsed or the subscriber was already set.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the logging failure.
        message: String,
    },

    /// Reading operator input or installing the signal handler failed.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}
