//! Headless host for the Snake Race simulation.
//!
//! Wires configuration, logging, and a [`Simulation`] together, then runs
//! until interrupted, until the configured real-time limit, or until the
//! operator types `q`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `SNAKE_RACE_CONFIG` or `snake-race-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Build the simulation (snakes, board, runners, clock)
//! 4. Start the clock
//! 5. Log a leaderboard every `snapshot_interval_ms` and apply operator
//!    commands from stdin
//! 6. Shut down and log each runner's summary

mod command;
mod error;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use snake_race_core::Simulation;
use snake_race_core::config::{LoggingConfig, SimulationConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::command::Command;
use crate::error::EngineError;

/// Environment variable naming an alternative config file.
const CONFIG_PATH_ENV: &str = "SNAKE_RACE_CONFIG";

/// Config file looked up in the working directory by default.
const DEFAULT_CONFIG_PATH: &str = "snake-race-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, logging, or simulation startup
/// fails, or if stdin or the signal handler report an I/O error.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let (config, source) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging)?;
    info!(
        world_name = %config.world.name,
        seed = config.world.seed,
        source = %source,
        width = config.board.width,
        height = config.board.height,
        agents = config.agents.count,
        "Configuration loaded"
    );

    // 3. Build the simulation. The render collaborator here only counts
    //    frames.
    let frames = Arc::new(AtomicU64::new(0));
    let frame_counter = Arc::clone(&frames);
    let bounds = config.simulation.clone();
    let simulation = Simulation::new(config, move || {
        let _ = frame_counter.fetch_add(1, Ordering::Relaxed);
    })?;

    // 4. Start.
    let _ = simulation.start()?;
    info!("Simulation running; commands: p toggle, up/down/left/right or ijkl steer snake 0, wasd steer snake 1, r report, q quit");

    // 5. Run until a termination condition.
    let mut report = tokio::time::interval(Duration::from_millis(bounds.snapshot_interval_ms.max(1)));
    report.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let _ = report.tick().await;

    let limit = (bounds.max_real_time_seconds > 0)
        .then(|| Instant::now().checked_add(Duration::from_secs(bounds.max_real_time_seconds)))
        .flatten();
    let time_limit = async move {
        match limit {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(time_limit);

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Interrupt received");
                break;
            }
            () = &mut time_limit => {
                info!(max_seconds = bounds.max_real_time_seconds, "Real-time limit reached");
                break;
            }
            _ = report.tick() => log_leaderboard(&simulation, &frames),
            line = input.next_line(), if input_open => {
                let Some(line) = line? else {
                    debug!("stdin closed, operator input disabled");
                    input_open = false;
                    continue;
                };
                if !apply(&simulation, &frames, &line)? {
                    info!("Operator quit");
                    break;
                }
            }
        }
    }

    // 6. Shut down and report.
    log_leaderboard(&simulation, &frames);
    let summaries = simulation.shutdown().await;
    for summary in &summaries {
        info!(
            agent = %summary.agent_id,
            moves = summary.moves,
            mice_eaten = summary.mice_eaten,
            turbos_taken = summary.turbos_taken,
            obstacle_hits = summary.obstacle_hits,
            teleports = summary.teleports,
            final_length = summary.final_length,
            "Runner summary"
        );
    }
    match serde_json::to_string(&summaries) {
        Ok(json) => debug!(summaries = %json, "Final summaries"),
        Err(e) => warn!(error = %e, "failed to serialize runner summaries"),
    }

    info!(
        frames = frames.load(Ordering::Relaxed),
        "snake-race-engine shutdown complete"
    );
    Ok(())
}

/// Apply one line of operator input. Returns `false` when the operator
/// asked to quit.
fn apply(simulation: &Simulation, frames: &AtomicU64, line: &str) -> Result<bool, EngineError> {
    let Some(command) = Command::parse(line) else {
        debug!(input = line.trim(), "ignored unknown command");
        return Ok(true);
    };
    match command {
        Command::Toggle => {
            let state = simulation.toggle()?;
            info!(?state, "Toggled");
        }
        Command::Steer { agent, direction } => match simulation.set_direction(agent, direction) {
            Ok(changed) => debug!(agent, ?direction, changed, "Steer"),
            Err(e) => warn!(error = %e, "steer rejected"),
        },
        Command::Report => log_leaderboard(simulation, frames),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

fn log_leaderboard(simulation: &Simulation, frames: &AtomicU64) {
    let snapshot = simulation.snapshot();
    let leader = simulation.longest();
    info!(
        state = ?snapshot.state,
        elapsed_ms = snapshot.elapsed_ms,
        frames = frames.load(Ordering::Relaxed),
        mice = snapshot.board.mice.len(),
        obstacles = snapshot.board.obstacles.len(),
        turbo_pads = snapshot.board.turbo_pads.len(),
        mice_eaten = snapshot.stats.mice_eaten,
        spawns_skipped = snapshot.stats.spawns_skipped,
        leader = leader.map(|s| s.index),
        leader_length = leader.map(|s| s.length),
        "Leaderboard"
    );
    for (rank, standing) in simulation.ranking().iter().enumerate() {
        debug!(
            rank = rank.saturating_add(1),
            agent = standing.index,
            id = %standing.id,
            length = standing.length,
            "Standing"
        );
    }
}

/// Load configuration from `SNAKE_RACE_CONFIG`, or `snake-race-config.yaml`
/// in the working directory, falling back to defaults when neither exists.
///
/// Returns the config and a description of where it came from.
fn load_config() -> Result<(SimulationConfig, String), EngineError> {
    let path = std::env::var_os(CONFIG_PATH_ENV)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        let config = SimulationConfig::from_file(&path)?;
        Ok((config, path.display().to_string()))
    } else {
        Ok((SimulationConfig::parse("")?, "defaults".to_owned()))
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
fn init_logging(logging: &LoggingConfig) -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| EngineError::Logging {
            message: format!("invalid log filter: {e}"),
        })?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| EngineError::Logging {
        message: format!("{e}"),
    })
}
