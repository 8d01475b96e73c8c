//! The global heartbeat and lifecycle broadcaster.
//!
//! A [`GameClock`] owns the single [`GameState`] of the simulation. While
//! running it fires a render callback and every registered
//! [`ClockListener`] once per period. Pause, resume, and stop are
//! broadcast to listeners only when they actually change the state, so
//! repeated calls are harmless.
//!
//! # Concurrency
//!
//! - The state is an atomic; the clock is its only writer.
//! - The listener registry is copy-on-write: delivery iterates an `Arc`
//!   snapshot, so registration never blocks on, or races with, a tick in
//!   flight. Removal deactivates the entry first, which makes an in-flight
//!   delivery skip it.
//! - The periodic schedule is a tokio task. It keeps running while paused
//!   (ticks are suppressed) and is aborted by `stop`, `close`, and `Drop`.
//!   `close` also waits for it, so a delivery in flight on another worker
//!   has finished by the time `close` returns.
//! - `start` and `stop` change the state while holding the scheduler lock,
//!   so a running clock always owns a live schedule.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use snake_race_types::GameState;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// The tick period is zero.
    #[error("clock period must be greater than zero")]
    InvalidPeriod,

    /// `start` was called outside a tokio runtime.
    #[error("clock can only be started from within a tokio runtime")]
    NoRuntime,
}

/// Receives clock events.
///
/// Handlers run on the clock's scheduling task and must not block; they
/// should signal their own task and return.
pub trait ClockListener: Send + Sync {
    /// One heartbeat while the clock is running.
    fn on_tick(&self);

    /// The clock went from running to paused.
    fn on_pause(&self) {}

    /// The clock went from paused to running.
    fn on_resume(&self) {}

    /// The clock stopped.
    fn on_stop(&self) {}
}

/// Token returned by [`GameClock::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    listener: Arc<dyn ClockListener>,
    active: AtomicBool,
}

type RenderCallback = Box<dyn Fn() + Send + Sync>;

struct ClockShared {
    state: AtomicU8,
    listeners: RwLock<Arc<Vec<Arc<Registration>>>>,
    on_tick: RenderCallback,
    ticks: AtomicU64,
    next_listener: AtomicU64,
}

impl ClockShared {
    fn state(&self) -> GameState {
        GameState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: GameState, to: GameState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn registrations(&self) -> Arc<Vec<Arc<Registration>>> {
        Arc::clone(&self.listeners.read())
    }

    fn broadcast(&self, event: impl Fn(&dyn ClockListener)) {
        for registration in self.registrations().iter() {
            if registration.active.load(Ordering::Acquire) {
                event(registration.listener.as_ref());
            }
        }
    }

    fn fire(&self) {
        let _ = self.ticks.fetch_add(1, Ordering::Relaxed);
        (self.on_tick)();
        self.broadcast(|l| l.on_tick());
    }
}

/// Fixed-period heartbeat that drives every registered runner.
pub struct GameClock {
    period: Duration,
    shared: Arc<ClockShared>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl core::fmt::Debug for GameClock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GameClock")
            .field("period", &self.period)
            .field("state", &self.state())
            .field("ticks", &self.ticks())
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

impl GameClock {
    /// Create a stopped clock that will call `on_tick` every `period` while
    /// running.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidPeriod`] if `period` is zero.
    pub fn new<F>(period: Duration, on_tick: F) -> Result<Self, ClockError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if period.is_zero() {
            return Err(ClockError::InvalidPeriod);
        }
        Ok(Self {
            period,
            shared: Arc::new(ClockShared {
                state: AtomicU8::new(GameState::Stopped.as_u8()),
                listeners: RwLock::new(Arc::new(Vec::new())),
                on_tick: Box::new(on_tick),
                ticks: AtomicU64::new(0),
                next_listener: AtomicU64::new(0),
            }),
            scheduler: Mutex::new(None),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> GameState {
        self.shared.state()
    }

    /// Heartbeat period.
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Ticks delivered so far.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Relaxed)
    }

    /// Move from stopped to running and begin firing. The first tick fires
    /// immediately. Returns `false` if the clock was not stopped.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::NoRuntime`] outside a tokio runtime; the clock
    /// stays stopped.
    pub fn start(&self) -> Result<bool, ClockError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_err| ClockError::NoRuntime)?;
        let mut scheduler = self.scheduler.lock();
        if !self.shared.transition(GameState::Stopped, GameState::Running) {
            return Ok(false);
        }

        let shared = Arc::clone(&self.shared);
        let period = self.period;
        let task = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let _ = interval.tick().await;
                match shared.state() {
                    GameState::Running => shared.fire(),
                    GameState::Paused => {}
                    GameState::Stopped => break,
                }
            }
        });

        if let Some(previous) = scheduler.replace(task) {
            previous.abort();
        }
        drop(scheduler);
        info!(period_ms = self.period.as_millis(), "clock started");
        Ok(true)
    }

    /// Suppress ticks and tell listeners. Returns `false` (and notifies
    /// nobody) unless the clock was running.
    pub fn pause(&self) -> bool {
        if !self.shared.transition(GameState::Running, GameState::Paused) {
            return false;
        }
        info!(ticks = self.ticks(), "clock paused");
        self.shared.broadcast(|l| l.on_pause());
        true
    }

    /// Resume ticking and tell listeners. Returns `false` (and notifies
    /// nobody) unless the clock was paused.
    pub fn resume(&self) -> bool {
        if !self.shared.transition(GameState::Paused, GameState::Running) {
            return false;
        }
        info!(ticks = self.ticks(), "clock resumed");
        self.shared.broadcast(|l| l.on_resume());
        true
    }

    /// Stop ticking, end the schedule, and tell listeners. Returns `false`
    /// if already stopped. The clock can be started again afterwards.
    ///
    /// A delivery already in progress on another worker may still finish;
    /// [`close`](Self::close) waits for it.
    pub fn stop(&self) -> bool {
        {
            let scheduler = self.scheduler.lock();
            let previous = self
                .shared
                .state
                .swap(GameState::Stopped.as_u8(), Ordering::AcqRel);
            if GameState::from_u8(previous) == GameState::Stopped {
                return false;
            }
            if let Some(task) = scheduler.as_ref() {
                task.abort();
            }
        }
        info!(ticks = self.ticks(), "clock stopped");
        self.shared.broadcast(|l| l.on_stop());
        true
    }

    /// Register a listener. It receives every tick fired after this call.
    pub fn add_listener(&self, listener: Arc<dyn ClockListener>) -> ListenerId {
        let id = ListenerId(self.shared.next_listener.fetch_add(1, Ordering::Relaxed));
        let registration = Arc::new(Registration {
            id,
            listener,
            active: AtomicBool::new(true),
        });
        let mut guard = self.shared.listeners.write();
        let mut next: Vec<Arc<Registration>> = guard.as_ref().clone();
        next.push(registration);
        *guard = Arc::new(next);
        debug!(listener = id.0, "listener added");
        id
    }

    /// Unregister a listener. Returns `false` if the id is unknown.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut guard = self.shared.listeners.write();
        let Some(found) = guard.iter().find(|r| r.id == id) else {
            return false;
        };
        found.active.store(false, Ordering::Release);
        let next: Vec<Arc<Registration>> =
            guard.iter().filter(|r| r.id != id).cloned().collect();
        *guard = Arc::new(next);
        debug!(listener = id.0, "listener removed");
        true
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.read().len()
    }

    /// Stop the clock and wait until its scheduling task has ended,
    /// including any delivery in progress. No tick fires after this
    /// returns.
    pub async fn close(&self) {
        let _ = self.stop();
        let task = self.scheduler.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
        debug!("clock closed");
    }
}

impl Drop for GameClock {
    fn drop(&mut self) {
        if let Some(task) = self.scheduler.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        ticks: AtomicUsize,
        pauses: AtomicUsize,
        resumes: AtomicUsize,
        stops: AtomicUsize,
    }

    impl ClockListener for Recorder {
        fn on_tick(&self) {
            let _ = self.ticks.fetch_add(1, Ordering::SeqCst);
        }
        fn on_pause(&self) {
            let _ = self.pauses.fetch_add(1, Ordering::SeqCst);
        }
        fn on_resume(&self) {
            let _ = self.resumes.fetch_add(1, Ordering::SeqCst);
        }
        fn on_stop(&self) {
            let _ = self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Recorder {
        fn ticks(&self) -> usize {
            self.ticks.load(Ordering::SeqCst)
        }
    }

    fn clock() -> GameClock {
        GameClock::new(Duration::from_millis(10), || {}).unwrap()
    }

    /// Blocks its worker for a while on every tick.
    #[derive(Default)]
    struct SlowListener {
        entered: AtomicUsize,
        finished: AtomicUsize,
    }

    impl ClockListener for SlowListener {
        fn on_tick(&self) {
            let _ = self.entered.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(150));
            let _ = self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn rejects_zero_period() {
        assert!(matches!(
            GameClock::new(Duration::ZERO, || {}),
            Err(ClockError::InvalidPeriod)
        ));
    }

    #[test]
    fn start_outside_runtime_is_an_error() {
        let clock = clock();
        assert!(matches!(clock.start(), Err(ClockError::NoRuntime)));
        assert_eq!(clock.state(), GameState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_reach_callback_and_listeners() {
        let rendered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&rendered);
        let clock = GameClock::new(Duration::from_millis(10), move || {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        let recorder = Arc::new(Recorder::default());
        let _ = clock.add_listener(recorder.clone());

        assert!(clock.start().unwrap());
        assert!(!clock.start().unwrap());
        tokio::time::sleep(Duration::from_millis(55)).await;

        // Immediate first tick plus one per 10 ms.
        assert!((5..=6).contains(&recorder.ticks()));
        assert_eq!(rendered.load(Ordering::SeqCst), recorder.ticks());
        assert_eq!(clock.ticks(), u64::try_from(recorder.ticks()).unwrap());
        clock.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn pause_is_idempotent_and_suppresses_ticks() {
        let clock = clock();
        let recorder = Arc::new(Recorder::default());
        let _ = clock.add_listener(recorder.clone());
        let _ = clock.start().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(clock.pause());
        assert!(!clock.pause());
        assert_eq!(clock.state(), GameState::Paused);
        assert_eq!(recorder.pauses.load(Ordering::SeqCst), 1);

        let before = recorder.ticks();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(recorder.ticks(), before);

        assert!(clock.resume());
        assert!(!clock.resume());
        assert_eq!(recorder.resumes.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(recorder.ticks() > before);
        clock.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_notifies_once_even_from_paused() {
        let clock = clock();
        let recorder = Arc::new(Recorder::default());
        let _ = clock.add_listener(recorder.clone());
        let _ = clock.start().unwrap();
        let _ = clock.pause();

        assert!(clock.stop());
        assert!(!clock.stop());
        assert_eq!(clock.state(), GameState::Stopped);
        assert_eq!(recorder.stops.load(Ordering::SeqCst), 1);
        // Resume from stopped is not a transition.
        assert!(!clock.resume());
        assert_eq!(recorder.resumes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn removed_listener_gets_no_more_ticks() {
        let clock = clock();
        let kept = Arc::new(Recorder::default());
        let dropped = Arc::new(Recorder::default());
        let _ = clock.add_listener(kept.clone());
        let id = clock.add_listener(dropped.clone());
        let _ = clock.start().unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;

        assert!(clock.remove_listener(id));
        assert!(!clock.remove_listener(id));
        assert_eq!(clock.listener_count(), 1);
        let frozen = dropped.ticks();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dropped.ticks(), frozen);
        assert!(kept.ticks() > frozen);
        clock.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn listener_added_mid_run_sees_only_later_ticks() {
        let clock = clock();
        let _ = clock.start().unwrap();
        tokio::time::sleep(Duration::from_millis(35)).await;
        let fired_before = clock.ticks();
        assert!(fired_before > 0);

        let late = Arc::new(Recorder::default());
        let _ = clock.add_listener(late.clone());
        tokio::time::sleep(Duration::from_millis(30)).await;
        let fired_after = clock.ticks().saturating_sub(fired_before);
        assert_eq!(u64::try_from(late.ticks()).unwrap(), fired_after);
        clock.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_fires_after_close() {
        let clock = clock();
        let recorder = Arc::new(Recorder::default());
        let _ = clock.add_listener(recorder.clone());
        let _ = clock.start().unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        clock.close().await;

        let frozen = recorder.ticks();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(recorder.ticks(), frozen);
        assert_eq!(clock.state(), GameState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn can_restart_after_stop() {
        let clock = clock();
        let _ = clock.start().unwrap();
        let _ = clock.stop();
        let stopped_at = clock.ticks();
        assert!(clock.start().unwrap());
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(clock.ticks() > stopped_at);
        clock.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_waits_for_delivery_in_flight() {
        let clock = clock();
        let slow = Arc::new(SlowListener::default());
        let _ = clock.add_listener(slow.clone());
        let _ = clock.start().unwrap();
        while slow.entered.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        clock.close().await;
        let at_close = slow.finished.load(Ordering::SeqCst);
        assert_eq!(at_close, slow.entered.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(slow.finished.load(Ordering::SeqCst), at_close);
        assert_eq!(slow.entered.load(Ordering::SeqCst), at_close);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_start_and_stop_never_orphan_a_running_clock() {
        let clock = Arc::new(GameClock::new(Duration::from_millis(1), || {}).unwrap());
        for _ in 0..100 {
            let _ = clock.start().unwrap();
            let stopper = {
                let clock = Arc::clone(&clock);
                tokio::spawn(async move { clock.stop() })
            };
            let starter = {
                let clock = Arc::clone(&clock);
                tokio::spawn(async move { clock.start().unwrap() })
            };
            let _ = stopper.await.unwrap();
            let _ = starter.await.unwrap();

            if clock.state() == GameState::Running {
                let before = clock.ticks();
                tokio::time::sleep(Duration::from_millis(20)).await;
                assert!(clock.ticks() > before, "running clock without a schedule");
            }
            let _ = clock.stop();
        }
        clock.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn registration_races_with_delivery() {
        let clock = Arc::new(GameClock::new(Duration::from_millis(1), || {}).unwrap());
        let _ = clock.start().unwrap();

        let churn: Vec<_> = (0..4)
            .map(|_| {
                let clock = Arc::clone(&clock);
                tokio::spawn(async move {
                    for _ in 0..200 {
                        let id = clock.add_listener(Arc::new(Recorder::default()));
                        tokio::task::yield_now().await;
                        let _ = clock.remove_listener(id);
                    }
                })
            })
            .collect();
        for task in churn {
            task.await.unwrap();
        }

        assert_eq!(clock.listener_count(), 0);
        assert_eq!(clock.state(), GameState::Running);
        clock.close().await;
    }
}
