//! Per-snake movement loop.
//!
//! Each snake is driven by one [`SnakeRunner`] task. The task waits for
//! whichever comes first, a clock tick or its own local deadline (last move
//! plus the current interval), then steers, steps the board, and reacts to
//! the result. A [`RunnerHandle`] controls the task from anywhere; it is
//! also the [`ClockListener`] the clock delivers to.
//!
//! Waits never poll. Pause parks the task on a `watch` channel, ticks
//! bump a second `watch` counter, and the deadline is a `sleep_until`; all
//! three race in one `select!`, so `resume` and `stop` take effect within
//! the current wait. Any state change marks pending ticks as seen, so a
//! tick delivered before a pause is not acted on after the resume.

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use serde::Serialize;
use snake_race_agents::Agent;
use snake_race_types::{AgentId, Direction, MoveResult};
use snake_race_world::Board;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::clock::ClockListener;
use crate::config::RunnerConfig;

/// Lifecycle of one runner. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    /// Moving on ticks and deadlines.
    Running,
    /// Parked until resumed or stopped.
    Paused,
    /// Finished; the task has exited or is about to.
    Stopped,
}

struct RunnerControl {
    state: watch::Sender<RunnerState>,
    ticks: watch::Sender<u64>,
}

/// Thread-safe control surface for a running [`SnakeRunner`].
///
/// Cloning is cheap. When every handle is dropped the runner exits.
#[derive(Clone)]
pub struct RunnerHandle {
    agent_id: AgentId,
    control: Arc<RunnerControl>,
}

impl core::fmt::Debug for RunnerHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RunnerHandle")
            .field("agent_id", &self.agent_id)
            .field("state", &self.state())
            .finish()
    }
}

impl RunnerHandle {
    /// The snake this runner drives.
    pub const fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// Current state. A runner whose task has ended, including by abort,
    /// reports `Stopped`.
    pub fn state(&self) -> RunnerState {
        if self.control.state.is_closed() {
            return RunnerState::Stopped;
        }
        *self.control.state.borrow()
    }

    /// Park the runner. Returns `false` unless it was running.
    pub fn pause(&self) -> bool {
        self.transition(RunnerState::Running, RunnerState::Paused)
    }

    /// Wake a paused runner. Returns `false` unless it was paused.
    pub fn resume(&self) -> bool {
        self.transition(RunnerState::Paused, RunnerState::Running)
    }

    /// End the runner for good. Returns `false` if already stopped.
    pub fn stop(&self) -> bool {
        if self.control.state.is_closed() {
            return false;
        }
        self.control.state.send_if_modified(|state| {
            if *state == RunnerState::Stopped {
                return false;
            }
            *state = RunnerState::Stopped;
            true
        })
    }

    /// Release the current wait early. Ignored unless running; ticks that
    /// arrive before the runner wakes collapse into one.
    pub fn tick(&self) {
        if self.state() == RunnerState::Running {
            self.control.ticks.send_modify(|count| *count = count.wrapping_add(1));
        }
    }

    fn transition(&self, from: RunnerState, to: RunnerState) -> bool {
        if self.control.state.is_closed() {
            return false;
        }
        self.control.state.send_if_modified(|state| {
            if *state != from {
                return false;
            }
            *state = to;
            true
        })
    }
}

impl ClockListener for RunnerHandle {
    fn on_tick(&self) {
        self.tick();
    }

    fn on_pause(&self) {
        let _ = self.pause();
    }

    fn on_resume(&self) {
        let _ = self.resume();
    }

    fn on_stop(&self) {
        let _ = self.stop();
    }
}

/// What a runner did over its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunnerSummary {
    /// The snake.
    pub agent_id: AgentId,
    /// Steps that advanced the head.
    pub moves: u64,
    /// Mice eaten.
    pub mice_eaten: u64,
    /// Turbo pads consumed.
    pub turbos_taken: u64,
    /// Steps refused by an obstacle.
    pub obstacle_hits: u64,
    /// Steps that went through a teleport without eating.
    pub teleports: u64,
    /// Snake length when the runner exited.
    pub final_length: usize,
}

/// A spawned runner: its control handle and the task's join handle.
#[derive(Debug)]
pub struct RunnerTask {
    /// Control surface.
    pub handle: RunnerHandle,
    /// Resolves to the summary once the runner exits.
    pub join: JoinHandle<RunnerSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Move,
    Recheck,
    Exit,
}

/// The movement loop for one snake.
pub struct SnakeRunner {
    cycle: Cycle,
    control: Arc<RunnerControl>,
    state: watch::Receiver<RunnerState>,
    ticks: watch::Receiver<u64>,
}

impl core::fmt::Debug for SnakeRunner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SnakeRunner")
            .field("agent_id", &self.cycle.agent.id())
            .field("turbo_remaining", &self.cycle.turbo_remaining)
            .field("summary", &self.cycle.summary)
            .finish_non_exhaustive()
    }
}

impl SnakeRunner {
    /// Create a runner in the `Running` state. Steering randomness is
    /// drawn from a generator seeded with `seed`.
    pub fn new(agent: Arc<Agent>, board: Arc<Board>, config: RunnerConfig, seed: u64) -> Self {
        let (state_tx, state) = watch::channel(RunnerState::Running);
        let (ticks_tx, ticks) = watch::channel(0_u64);
        let summary = RunnerSummary {
            agent_id: agent.id(),
            moves: 0,
            mice_eaten: 0,
            turbos_taken: 0,
            obstacle_hits: 0,
            teleports: 0,
            final_length: agent.length(),
        };
        Self {
            cycle: Cycle {
                turn_chance: probability(config.turn_chance),
                turbo_turn_chance: probability(config.turbo_turn_chance),
                agent,
                board,
                config,
                rng: StdRng::seed_from_u64(seed),
                turbo_remaining: 0,
                summary,
            },
            control: Arc::new(RunnerControl {
                state: state_tx,
                ticks: ticks_tx,
            }),
            state,
            ticks,
        }
    }

    /// A control handle. Take it before spawning: once the loop starts,
    /// only existing handles keep the runner alive.
    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            agent_id: self.cycle.agent.id(),
            control: Arc::clone(&self.control),
        }
    }

    /// Cycles of turbo left.
    pub const fn turbo_remaining(&self) -> u32 {
        self.cycle.turbo_remaining
    }

    /// Spawn the loop on `runtime`.
    pub fn spawn_on(self, runtime: &Handle) -> RunnerTask {
        let handle = self.handle();
        let join = runtime.spawn(self.run());
        RunnerTask { handle, join }
    }

    /// Drive the snake until stopped, or until every handle is dropped.
    pub async fn run(self) -> RunnerSummary {
        let Self {
            mut cycle,
            control,
            mut state,
            mut ticks,
        } = self;
        drop(control);

        debug!(agent = %cycle.agent.id(), "runner started");
        let mut last_move = Instant::now();
        loop {
            match wait(&mut state, &mut ticks, last_move, cycle.interval()).await {
                Wake::Exit => break,
                Wake::Recheck => continue,
                Wake::Move => {}
            }
            last_move = Instant::now();
            let _ = cycle.advance();
        }

        cycle.summary.final_length = cycle.agent.length();
        info!(
            agent = %cycle.summary.agent_id,
            moves = cycle.summary.moves,
            mice_eaten = cycle.summary.mice_eaten,
            turbos_taken = cycle.summary.turbos_taken,
            obstacle_hits = cycle.summary.obstacle_hits,
            final_length = cycle.summary.final_length,
            "runner finished"
        );
        cycle.summary
    }

    /// Perform one movement cycle right now, outside the loop.
    pub fn advance_once(&mut self) -> MoveResult {
        self.cycle.advance()
    }

    /// Counters so far.
    pub const fn summary(&self) -> &RunnerSummary {
        &self.cycle.summary
    }
}

/// Block until the runner should move, re-evaluate its state, or exit.
async fn wait(
    state: &mut watch::Receiver<RunnerState>,
    ticks: &mut watch::Receiver<u64>,
    last_move: Instant,
    interval: Duration,
) -> Wake {
    loop {
        let current = *state.borrow_and_update();
        match current {
            RunnerState::Stopped => return Wake::Exit,
            RunnerState::Paused => {
                let _ = ticks.borrow_and_update();
                if state.changed().await.is_err() {
                    return Wake::Exit;
                }
                let _ = ticks.borrow_and_update();
            }
            RunnerState::Running => break,
        }
    }

    let deadline = last_move.checked_add(interval).unwrap_or(last_move);
    tokio::select! {
        biased;
        changed = state.changed() => {
            if changed.is_err() {
                return Wake::Exit;
            }
            // Ticks from before the state change are stale.
            let _ = ticks.borrow_and_update();
            Wake::Recheck
        }
        changed = ticks.changed() => {
            if changed.is_err() {
                return Wake::Exit;
            }
            Wake::Move
        }
        () = tokio::time::sleep_until(deadline) => Wake::Move,
    }
}

struct Cycle {
    agent: Arc<Agent>,
    board: Arc<Board>,
    config: RunnerConfig,
    turn_chance: f64,
    turbo_turn_chance: f64,
    rng: StdRng,
    turbo_remaining: u32,
    summary: RunnerSummary,
}

impl Cycle {
    const fn interval(&self) -> Duration {
        if self.turbo_remaining > 0 {
            self.config.turbo_interval()
        } else {
            self.config.base_interval()
        }
    }

    fn advance(&mut self) -> MoveResult {
        let chance = if self.turbo_remaining > 0 {
            self.turbo_turn_chance
        } else {
            self.turn_chance
        };
        if rand::Rng::random_bool(&mut self.rng, chance) {
            self.turn_randomly();
        }

        let result = self.board.step(&self.agent);
        let summary = &mut self.summary;
        match result {
            MoveResult::HitObstacle => {
                summary.obstacle_hits = summary.obstacle_hits.saturating_add(1);
                self.turn_randomly();
            }
            MoveResult::AteTurbo => {
                summary.turbos_taken = summary.turbos_taken.saturating_add(1);
                self.turbo_remaining = self.config.turbo_cycles;
            }
            MoveResult::AteMouse => {
                summary.mice_eaten = summary.mice_eaten.saturating_add(1);
            }
            MoveResult::Teleported => {
                summary.teleports = summary.teleports.saturating_add(1);
            }
            MoveResult::Moved => {}
        }
        if result.advanced() {
            self.summary.moves = self.summary.moves.saturating_add(1);
        }
        self.turbo_remaining = self.turbo_remaining.saturating_sub(1);

        trace!(agent = %self.agent.id(), ?result, turbo = self.turbo_remaining, "cycle");
        result
    }

    fn turn_randomly(&mut self) {
        if let Some(direction) = Direction::ALL.choose(&mut self.rng) {
            let _ = self.agent.turn(*direction);
        }
    }
}

fn probability(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use snake_race_types::Position;
    use snake_race_world::{BoardBuilder, Feature};

    use super::*;

    fn quiet_config(base_ms: u64) -> RunnerConfig {
        RunnerConfig {
            base_interval_ms: base_ms,
            turbo_interval_ms: 40,
            turbo_cycles: 100,
            turn_chance: 0.0,
            turbo_turn_chance: 0.0,
        }
    }

    fn setup(features: &[(Feature, Position)]) -> (Arc<Agent>, Arc<Board>) {
        let agent = Arc::new(Agent::new(Position::new(1, 1), Direction::Right));
        let mut builder = BoardBuilder::new(10, 10).unwrap();
        let _ = builder.agent(agent.id(), agent.head()).unwrap();
        for (feature, at) in features {
            let _ = builder.place(*feature, *at).unwrap();
        }
        (agent, Arc::new(builder.build()))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn moves_on_local_deadline_without_ticks() {
        let (agent, board) = setup(&[]);
        let task = SnakeRunner::new(Arc::clone(&agent), board, quiet_config(80), 1)
            .spawn_on(&Handle::current());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(task.handle.stop());
        let summary = task.join.await.unwrap();

        assert_eq!(summary.moves, 3);
        assert_eq!(agent.head(), Position::new(4, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn tick_releases_wait_early() {
        let (agent, board) = setup(&[]);
        let task = SnakeRunner::new(Arc::clone(&agent), board, quiet_config(10_000), 1)
            .spawn_on(&Handle::current());
        settle().await;
        assert_eq!(agent.head(), Position::new(1, 1));

        task.handle.tick();
        settle().await;
        assert_eq!(agent.head(), Position::new(2, 1));

        let _ = task.handle.stop();
        let _ = task.join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn tick_ignored_while_paused() {
        let (agent, board) = setup(&[]);
        let task = SnakeRunner::new(Arc::clone(&agent), board, quiet_config(10_000), 1)
            .spawn_on(&Handle::current());
        settle().await;

        assert!(task.handle.pause());
        assert!(!task.handle.pause());
        task.handle.tick();
        settle().await;
        assert_eq!(agent.head(), Position::new(1, 1));

        // Resuming does not replay the dropped tick.
        assert!(task.handle.resume());
        settle().await;
        assert_eq!(agent.head(), Position::new(1, 1));

        task.handle.tick();
        settle().await;
        assert_eq!(agent.head(), Position::new(2, 1));

        let _ = task.handle.stop();
        let _ = task.join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn tick_before_pause_is_not_acted_on_after_resume() {
        let (agent, board) = setup(&[]);
        let task = SnakeRunner::new(Arc::clone(&agent), board, quiet_config(10_000), 1)
            .spawn_on(&Handle::current());
        settle().await;

        task.handle.tick();
        assert!(task.handle.pause());
        settle().await;
        assert!(task.handle.resume());
        settle().await;
        assert_eq!(agent.head(), Position::new(1, 1));

        // Same sequence before the runner gets to observe the pause.
        task.handle.tick();
        assert!(task.handle.pause());
        assert!(task.handle.resume());
        settle().await;
        assert_eq!(agent.head(), Position::new(1, 1));

        task.handle.tick();
        settle().await;
        assert_eq!(agent.head(), Position::new(2, 1));

        let _ = task.handle.stop();
        let _ = task.join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn resume_wakes_paused_runner() {
        let (agent, board) = setup(&[]);
        let task = SnakeRunner::new(Arc::clone(&agent), board, quiet_config(80), 1)
            .spawn_on(&Handle::current());
        settle().await;
        let _ = task.handle.pause();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(agent.head(), Position::new(1, 1));

        let _ = task.handle.resume();
        settle().await;
        // The deadline passed while parked, so the move is immediate.
        assert_eq!(agent.head(), Position::new(2, 1));

        let _ = task.handle.stop();
        let _ = task.join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_paused_exits_promptly() {
        let (agent, board) = setup(&[]);
        let task = SnakeRunner::new(agent, board, quiet_config(80), 1)
            .spawn_on(&Handle::current());
        settle().await;
        let _ = task.handle.pause();

        assert!(task.handle.stop());
        assert!(!task.handle.stop());
        assert!(!task.handle.resume());
        assert_eq!(task.handle.state(), RunnerState::Stopped);

        let joined = tokio::time::timeout(Duration::from_millis(5), task.join).await;
        assert!(joined.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_every_handle_ends_the_runner() {
        let (agent, board) = setup(&[]);
        let runner = SnakeRunner::new(agent, board, quiet_config(80), 1);
        let summary = tokio::time::timeout(Duration::from_millis(5), runner.run()).await;
        assert_eq!(summary.unwrap().moves, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_is_clean() {
        let (agent, board) = setup(&[]);
        let task = SnakeRunner::new(agent, board, quiet_config(80), 1)
            .spawn_on(&Handle::current());
        settle().await;

        assert_eq!(task.handle.state(), RunnerState::Running);

        task.join.abort();
        let err = task.join.await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(task.handle.state(), RunnerState::Stopped);
        assert!(!task.handle.pause());
        assert!(!task.handle.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn finished_runner_reports_stopped() {
        let (agent, board) = setup(&[]);
        let task = SnakeRunner::new(agent, board, quiet_config(80), 1)
            .spawn_on(&Handle::current());
        settle().await;

        assert!(task.handle.stop());
        let _ = task.join.await.unwrap();
        assert_eq!(task.handle.state(), RunnerState::Stopped);
        assert!(!task.handle.resume());
    }

    #[tokio::test(start_paused = true)]
    async fn clock_events_drive_the_runner() {
        let (agent, board) = setup(&[]);
        let task = SnakeRunner::new(Arc::clone(&agent), board, quiet_config(10_000), 1)
            .spawn_on(&Handle::current());
        let listener: &dyn ClockListener = &task.handle;
        settle().await;

        listener.on_tick();
        settle().await;
        assert_eq!(agent.head(), Position::new(2, 1));

        listener.on_pause();
        assert_eq!(task.handle.state(), RunnerState::Paused);
        listener.on_resume();
        assert_eq!(task.handle.state(), RunnerState::Running);
        listener.on_stop();
        assert_eq!(task.join.await.unwrap().moves, 1);
    }

    #[test]
    fn turbo_arms_and_shortens_interval() {
        let (agent, board) = setup(&[(Feature::Turbo, Position::new(2, 1))]);
        let mut runner = SnakeRunner::new(agent, board, quiet_config(80), 1);

        assert_eq!(runner.advance_once(), MoveResult::AteTurbo);
        assert_eq!(runner.turbo_remaining(), 99);
        assert_eq!(runner.summary().turbos_taken, 1);

        assert_eq!(runner.advance_once(), MoveResult::Moved);
        assert_eq!(runner.turbo_remaining(), 98);
    }

    #[test]
    fn turbo_expires_after_configured_cycles() {
        let (agent, board) = setup(&[(Feature::Turbo, Position::new(2, 1))]);
        let mut config = quiet_config(80);
        config.turbo_cycles = 3;
        let mut runner = SnakeRunner::new(agent, board, config, 1);

        for _ in 0..3 {
            let _ = runner.advance_once();
        }
        assert_eq!(runner.turbo_remaining(), 0);
    }

    #[test]
    fn obstacle_hit_leaves_snake_in_place() {
        let (agent, board) = setup(&[(Feature::Obstacle, Position::new(2, 1))]);
        let mut runner = SnakeRunner::new(Arc::clone(&agent), board, quiet_config(80), 1);

        assert_eq!(runner.advance_once(), MoveResult::HitObstacle);
        assert_eq!(agent.head(), Position::new(1, 1));
        assert_eq!(runner.summary().obstacle_hits, 1);
        assert_eq!(runner.summary().moves, 0);
        assert_ne!(agent.direction(), Direction::Left);
    }

    #[test]
    fn eating_is_counted() {
        let (agent, board) = setup(&[(Feature::Mouse, Position::new(2, 1))]);
        let mut runner = SnakeRunner::new(agent, board, quiet_config(80), 1);

        assert_eq!(runner.advance_once(), MoveResult::AteMouse);
        assert_eq!(runner.summary().mice_eaten, 1);
        assert_eq!(runner.summary().moves, 1);
    }

    #[test]
    fn probabilities_are_sanitized() {
        assert!(probability(f64::NAN).abs() < f64::EPSILON);
        assert!((probability(2.0) - 1.0).abs() < f64::EPSILON);
        assert!(probability(-1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_serializes() {
        let (agent, board) = setup(&[]);
        let runner = SnakeRunner::new(agent, board, quiet_config(80), 1);
        let json = serde_json::to_value(runner.summary()).unwrap();
        assert_eq!(json["moves"], 0);
        assert_eq!(json["final_length"], 1);
    }
}
