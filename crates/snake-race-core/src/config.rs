//! Configuration loading and typed config structures for Snake Race.
//!
//! The configuration lives in `snake-race-config.yaml` at the project root.
//! Every section and field is optional; missing values fall back to the
//! classic game's settings (35x28 board, two snakes, 60 ms clock, 80/40 ms
//! runner cadence).

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use snake_race_world::{DEFAULT_TURBO_SPAWN_CHANCE, FeatureLayout};

/// Environment variable that overrides `logging.level`.
pub const LOG_LEVEL_ENV: &str = "SNAKE_RACE_LOG";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong with the value.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
///
/// Mirrors the structure of `snake-race-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Run name and randomness seed.
    #[serde(default)]
    pub world: WorldConfig,

    /// Board size and initial features.
    #[serde(default)]
    pub board: BoardConfig,

    /// Snake population.
    #[serde(default)]
    pub agents: AgentsConfig,

    /// Global heartbeat.
    #[serde(default)]
    pub clock: ClockConfig,

    /// Per-snake movement loop.
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Host run boundaries.
    #[serde(default)]
    pub simulation: SimulationBoundsConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// The `SNAKE_RACE_LOG` environment variable overrides `logging.level`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.logging.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.board.width <= 0 || self.board.height <= 0 {
            return Err(invalid(format!(
                "board must be at least 1x1, got {}x{}",
                self.board.width, self.board.height
            )));
        }
        if self.clock.period_ms == 0 {
            return Err(invalid("clock.period_ms must be at least 1".to_owned()));
        }
        if self.runner.base_interval_ms == 0 || self.runner.turbo_interval_ms == 0 {
            return Err(invalid("runner intervals must be at least 1 ms".to_owned()));
        }
        for (name, value) in [
            ("board.turbo_spawn_chance", self.board.turbo_spawn_chance),
            ("runner.turn_chance", self.runner.turn_chance),
            ("runner.turbo_turn_chance", self.runner.turbo_turn_chance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        Ok(())
    }
}

fn invalid(reason: String) -> ConfigError {
    ConfigError::Invalid { reason }
}

/// Run-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Human-readable run name, used in logs.
    #[serde(default = "default_world_name")]
    pub name: String,

    /// Seed for the runners' steering randomness. Board placement always
    /// draws from the thread-local generator.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            seed: default_seed(),
        }
    }
}

/// Board configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BoardConfig {
    /// Columns.
    #[serde(default = "default_board_width")]
    pub width: i32,

    /// Rows.
    #[serde(default = "default_board_height")]
    pub height: i32,

    /// Features scattered at start.
    #[serde(default)]
    pub features: FeatureLayout,

    /// Chance of a bonus turbo pad after each meal.
    #[serde(default = "default_turbo_spawn_chance")]
    pub turbo_spawn_chance: f64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            width: default_board_width(),
            height: default_board_height(),
            features: FeatureLayout::default(),
            turbo_spawn_chance: default_turbo_spawn_chance(),
        }
    }
}

/// Snake population configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentsConfig {
    /// Number of snakes.
    #[serde(default = "default_agent_count")]
    pub count: usize,

    /// Length a fresh snake grows to before eating.
    #[serde(default = "default_initial_length")]
    pub initial_length: usize,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            count: default_agent_count(),
            initial_length: default_initial_length(),
        }
    }
}

/// Clock configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClockConfig {
    /// Heartbeat period in milliseconds.
    #[serde(default = "default_clock_period_ms")]
    pub period_ms: u64,
}

impl ClockConfig {
    /// The heartbeat period.
    pub const fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            period_ms: default_clock_period_ms(),
        }
    }
}

/// Movement loop configuration, shared by every runner.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunnerConfig {
    /// Local timeout between moves.
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,

    /// Local timeout between moves while turbo is active.
    #[serde(default = "default_turbo_interval_ms")]
    pub turbo_interval_ms: u64,

    /// Cycles a consumed turbo pad lasts.
    #[serde(default = "default_turbo_cycles")]
    pub turbo_cycles: u32,

    /// Chance of a random turn before each move.
    #[serde(default = "default_turn_chance")]
    pub turn_chance: f64,

    /// Chance of a random turn before each move while turbo is active.
    #[serde(default = "default_turbo_turn_chance")]
    pub turbo_turn_chance: f64,
}

impl RunnerConfig {
    /// Normal cadence.
    pub const fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    /// Cadence while turbo is active.
    pub const fn turbo_interval(&self) -> Duration {
        Duration::from_millis(self.turbo_interval_ms)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: default_base_interval_ms(),
            turbo_interval_ms: default_turbo_interval_ms(),
            turbo_cycles: default_turbo_cycles(),
            turn_chance: default_turn_chance(),
            turbo_turn_chance: default_turbo_turn_chance(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl LoggingConfig {
    /// Apply the `SNAKE_RACE_LOG` override if set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            if !level.trim().is_empty() {
                self.level = level;
            }
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Host run boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationBoundsConfig {
    /// Wall-clock seconds before the host stops on its own (0 = unlimited).
    #[serde(default)]
    pub max_real_time_seconds: u64,

    /// How often the host logs a leaderboard snapshot.
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
}

impl Default for SimulationBoundsConfig {
    fn default() -> Self {
        Self {
            max_real_time_seconds: 0,
            snapshot_interval_ms: default_snapshot_interval_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_world_name() -> String {
    "The Snake Race".to_owned()
}

const fn default_seed() -> u64 {
    42
}

const fn default_board_width() -> i32 {
    35
}

const fn default_board_height() -> i32 {
    28
}

const fn default_turbo_spawn_chance() -> f64 {
    DEFAULT_TURBO_SPAWN_CHANCE
}

const fn default_agent_count() -> usize {
    2
}

const fn default_initial_length() -> usize {
    snake_race_agents::DEFAULT_TARGET_LENGTH
}

const fn default_clock_period_ms() -> u64 {
    60
}

const fn default_base_interval_ms() -> u64 {
    80
}

const fn default_turbo_interval_ms() -> u64 {
    40
}

const fn default_turbo_cycles() -> u32 {
    100
}

const fn default_turn_chance() -> f64 {
    0.10
}

const fn default_turbo_turn_chance() -> f64 {
    0.05
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_snapshot_interval_ms() -> u64 {
    1000
}
