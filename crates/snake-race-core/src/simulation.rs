//! Host-side lifecycle owner.
//!
//! A [`Simulation`] builds the snakes, the shared board, one runner per
//! snake, and the clock that drives them, then exposes the controls a
//! host needs: start, pause, resume, toggle, stop, steering, and
//! pull-based snapshots for rendering and leaderboards.
//!
//! Runners are spawned on the first successful [`Simulation::start`], on
//! the runtime that call is made from. Stopping is final: the runners exit
//! and a stopped simulation cannot be started again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use snake_race_agents::{Agent, AgentSnapshot};
use snake_race_types::{AgentId, Direction, GameState, Position};
use snake_race_world::{Board, BoardBuilder, BoardSnapshot, BoardStats, WorldError};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::clock::{ClockError, GameClock};
use crate::config::{ConfigError, SimulationConfig};
use crate::runner::{RunnerState, RunnerSummary, RunnerTask, SnakeRunner};

/// Errors that can occur while building or driving a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// The board could not be built.
    #[error("world error: {source}")]
    World {
        /// The underlying board error.
        #[from]
        source: WorldError,
    },

    /// The clock rejected its settings or could not start.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// The configuration is invalid.
    #[error("config error: {source}")]
    Config {
        /// The underlying configuration error.
        #[from]
        source: ConfigError,
    },

    /// No snake at this index.
    #[error("no agent at index {index}")]
    UnknownAgent {
        /// The requested index.
        index: usize,
    },

    /// The simulation was stopped and cannot run again.
    #[error("simulation already finished")]
    AlreadyFinished,
}

/// One row of the leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Standing {
    /// Position of the snake in [`Simulation::agents`].
    pub index: usize,
    /// The snake.
    pub id: AgentId,
    /// Cells occupied when the snapshot was taken.
    pub length: usize,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorldSnapshot {
    /// Clock state.
    pub state: GameState,
    /// Wall-clock time of the first start, if started.
    pub started_at: Option<DateTime<Utc>>,
    /// Running time so far, excluding pauses.
    pub elapsed_ms: u64,
    /// Board features.
    pub board: BoardSnapshot,
    /// Snakes, in index order.
    pub agents: Vec<AgentSnapshot>,
    /// Board counters.
    pub stats: BoardStats,
}

/// Running time that excludes paused intervals.
#[derive(Debug, Default)]
struct Stopwatch {
    started: Option<Instant>,
    paused_at: Option<Instant>,
    stopped_at: Option<Instant>,
    paused_total: Duration,
}

impl Stopwatch {
    const fn start(&mut self, now: Instant) {
        if self.started.is_none() {
            self.started = Some(now);
        }
    }

    const fn pause(&mut self, now: Instant) {
        if self.started.is_some() && self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    fn resume(&mut self, now: Instant) {
        if let Some(since) = self.paused_at.take() {
            self.paused_total = self.paused_total.saturating_add(now.saturating_duration_since(since));
        }
    }

    fn stop(&mut self, now: Instant) {
        self.resume(now);
        if self.started.is_some() && self.stopped_at.is_none() {
            self.stopped_at = Some(now);
        }
    }

    fn elapsed(&self, now: Instant) -> Duration {
        let Some(started) = self.started else {
            return Duration::ZERO;
        };
        let end = self.paused_at.or(self.stopped_at).unwrap_or(now);
        end.saturating_duration_since(started)
            .saturating_sub(self.paused_total)
    }
}

/// A complete race: snakes, board, runners, and clock.
pub struct Simulation {
    name: String,
    board: Arc<Board>,
    agents: Vec<Arc<Agent>>,
    clock: GameClock,
    pending: Mutex<Vec<SnakeRunner>>,
    tasks: Mutex<Vec<RunnerTask>>,
    stopwatch: Mutex<Stopwatch>,
    started_at: Mutex<Option<DateTime<Utc>>>,
    finished: AtomicBool,
}

impl core::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Simulation")
            .field("name", &self.name)
            .field("agents", &self.agents.len())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Build a simulation from `config`. `on_render` is called on every
    /// clock tick while running.
    ///
    /// Snake `i` starts at `(2 + 3i, 2 + 2i)` wrapped onto the board,
    /// facing the `i`-th direction of [`Direction::ALL`] (cycling). The
    /// initial features avoid every snake head.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Config`] if `config` fails validation,
    /// [`SimulationError::World`] if the board cannot be built, or
    /// [`SimulationError::Clock`] if the clock period is zero.
    pub fn new<F>(config: SimulationConfig, on_render: F) -> Result<Self, SimulationError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        config.validate()?;
        let (width, height) = (config.board.width, config.board.height);

        let agents: Vec<Arc<Agent>> = (0..config.agents.count)
            .zip(Direction::ALL.iter().copied().cycle())
            .map(|(i, direction)| {
                let head = starting_cell(i, width, height);
                Arc::new(Agent::new(head, direction).with_target_length(config.agents.initial_length))
            })
            .collect();

        let mut builder = BoardBuilder::new(width, height)?;
        let _ = builder.turbo_spawn_chance(config.board.turbo_spawn_chance)?;
        for agent in &agents {
            let _ = builder.agent(agent.id(), agent.head())?;
        }
        let _ = builder.scatter(&config.board.features);
        let board = Arc::new(builder.build());

        let clock = GameClock::new(config.clock.period(), on_render)?;
        let mut pending = Vec::with_capacity(agents.len());
        for (i, agent) in agents.iter().enumerate() {
            let seed = config
                .world
                .seed
                .wrapping_add(u64::try_from(i).unwrap_or_default());
            let runner = SnakeRunner::new(
                Arc::clone(agent),
                Arc::clone(&board),
                config.runner.clone(),
                seed,
            );
            let _ = clock.add_listener(Arc::new(runner.handle()));
            pending.push(runner);
        }

        info!(
            name = %config.world.name,
            agents = agents.len(),
            width,
            height,
            period_ms = config.clock.period_ms,
            "simulation ready"
        );

        Ok(Self {
            name: config.world.name,
            board,
            agents,
            clock,
            pending: Mutex::new(pending),
            tasks: Mutex::new(Vec::new()),
            stopwatch: Mutex::new(Stopwatch::default()),
            started_at: Mutex::new(None),
            finished: AtomicBool::new(false),
        })
    }

    /// Start the clock, spawning the runners on first use. Returns `false`
    /// if already running or paused.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::AlreadyFinished`] after [`stop`], or
    /// [`SimulationError::Clock`] when called outside a tokio runtime.
    ///
    /// [`stop`]: Self::stop
    pub fn start(&self) -> Result<bool, SimulationError> {
        if self.finished.load(Ordering::Acquire) {
            return Err(SimulationError::AlreadyFinished);
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_err| ClockError::NoRuntime)?;

        {
            let mut pending = self.pending.lock();
            if !pending.is_empty() {
                let mut tasks = self.tasks.lock();
                tasks.extend(pending.drain(..).map(|runner| runner.spawn_on(&runtime)));
            }
        }

        if !self.clock.start()? {
            return Ok(false);
        }
        self.stopwatch.lock().start(Instant::now());
        let _ = self.started_at.lock().get_or_insert_with(Utc::now);
        info!(name = %self.name, agents = self.agents.len(), "simulation started");
        Ok(true)
    }

    /// Pause every runner. Returns `false` unless running.
    pub fn pause(&self) -> bool {
        if !self.clock.pause() {
            return false;
        }
        self.stopwatch.lock().pause(Instant::now());
        true
    }

    /// Resume every runner. Returns `false` unless paused.
    pub fn resume(&self) -> bool {
        if !self.clock.resume() {
            return false;
        }
        self.stopwatch.lock().resume(Instant::now());
        true
    }

    /// Start on first use, then alternate between pause and resume.
    /// Returns the resulting state.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub fn toggle(&self) -> Result<GameState, SimulationError> {
        match self.state() {
            GameState::Stopped => {
                let _ = self.start()?;
            }
            GameState::Running => {
                let _ = self.pause();
            }
            GameState::Paused => {
                let _ = self.resume();
            }
        }
        Ok(self.state())
    }

    /// Stop the clock and every runner. Returns `false` if already stopped.
    pub fn stop(&self) -> bool {
        if self.finished.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.clock.stop();
        for task in self.tasks.lock().iter() {
            let _ = task.handle.stop();
        }
        self.pending.lock().clear();
        self.stopwatch.lock().stop(Instant::now());
        info!(name = %self.name, elapsed_ms = duration_ms(self.elapsed()), "simulation stopped");
        true
    }

    /// Stop everything, wait for the runners to exit, and return their
    /// summaries in agent order.
    pub async fn shutdown(self) -> Vec<RunnerSummary> {
        let _ = self.stop();
        self.clock.close().await;

        let tasks = std::mem::take(&mut *self.tasks.lock());
        let mut summaries = Vec::with_capacity(tasks.len());
        for task in tasks {
            let agent = task.handle.agent_id();
            match task.join.await {
                Ok(summary) => summaries.push(summary),
                Err(err) => warn!(%agent, error = %err, "runner did not finish cleanly"),
            }
        }
        summaries
    }

    /// Steer snake `index`. Returns whether the heading changed; reversing
    /// onto the neck is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::UnknownAgent`] for an out-of-range index.
    pub fn set_direction(&self, index: usize, direction: Direction) -> Result<bool, SimulationError> {
        let agent = self
            .agents
            .get(index)
            .ok_or(SimulationError::UnknownAgent { index })?;
        Ok(agent.turn(direction))
    }

    /// The snakes, in index order.
    pub fn agents(&self) -> &[Arc<Agent>] {
        &self.agents
    }

    /// The shared board.
    pub const fn board(&self) -> &Arc<Board> {
        &self.board
    }

    /// The clock driving the runners.
    pub const fn clock(&self) -> &GameClock {
        &self.clock
    }

    /// Clock state.
    pub fn state(&self) -> GameState {
        self.clock.state()
    }

    /// State of each spawned runner, in agent order. Empty before the first
    /// start.
    pub fn runner_states(&self) -> Vec<RunnerState> {
        self.tasks.lock().iter().map(|t| t.handle.state()).collect()
    }

    /// Snakes ordered by length, longest first. Ties keep index order.
    pub fn ranking(&self) -> Vec<Standing> {
        let mut standings: Vec<Standing> = self
            .agents
            .iter()
            .enumerate()
            .map(|(index, agent)| {
                let snapshot = agent.snapshot();
                Standing {
                    index,
                    id: snapshot.id,
                    length: snapshot.length,
                }
            })
            .collect();
        standings.sort_by_key(|s| core::cmp::Reverse(s.length));
        standings
    }

    /// The longest snake, or `None` with no snakes.
    pub fn longest(&self) -> Option<Standing> {
        self.ranking().into_iter().next()
    }

    /// Owned copy of the whole world.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            state: self.state(),
            started_at: *self.started_at.lock(),
            elapsed_ms: duration_ms(self.elapsed()),
            board: self.board.snapshot(),
            agents: self.agents.iter().map(|a| a.snapshot()).collect(),
            stats: self.board.stats(),
        }
    }

    /// Running time since the first start, excluding pauses.
    pub fn elapsed(&self) -> Duration {
        self.stopwatch.lock().elapsed(Instant::now())
    }

    /// Wall-clock time of the first start.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        *self.started_at.lock()
    }
}

fn starting_cell(index: usize, width: i32, height: i32) -> Position {
    let i = i32::try_from(index).unwrap_or(i32::MAX);
    Position::new(
        i.saturating_mul(3).saturating_add(2),
        i.saturating_mul(2).saturating_add(2),
    )
    .wrap(width, height)
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
