//! Timing primitives for slither.
//!
//! [`Ticker`] drives a session's fixed-step game loop from inside the
//! session actor's `tokio::select!`; it pends forever while stopped, so a
//! waiting session burns no timer wheel slots. [`Repeater`] runs a
//! detached periodic job (heartbeat pings, idle-session sweeps) until
//! cancelled or dropped.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         tick = ticker.tick() => {
//!             let events = engine.tick();
//!             broadcast(tick, events);
//!         }
//!     }
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant as TokioInstant, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// Maximum random delay added to a ticker's first fire, so sessions
/// started in the same instant don't all tick together.
const START_JITTER_US: u64 = 2_000;

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Fixed-interval cadence for one game loop.
///
/// Created stopped. [`Ticker::tick`] pends forever until [`Ticker::start`]
/// and again after [`Ticker::stop`], which lets a `select!` loop keep the
/// ticker branch permanently in place and flip it on when the match
/// begins. Overruns never queue up: a late wake reschedules from now and
/// the missed steps are dropped.
pub struct Ticker {
    interval: Duration,
    next: Option<TokioInstant>,
    count: u64,
}

impl Ticker {
    /// A stopped ticker with the given step interval. A zero interval is
    /// clamped to 1ms.
    pub fn new(interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            warn!("zero tick interval clamped to 1ms");
            Duration::from_millis(1)
        } else {
            interval
        };
        Self {
            interval,
            next: None,
            count: 0,
        }
    }

    /// Starts the cadence. The first fire lands one interval from now,
    /// plus up to 2ms of jitter. No-op when already running.
    pub fn start(&mut self) {
        if self.next.is_some() {
            return;
        }
        let jitter = Duration::from_micros(rand::rng().random_range(0..START_JITTER_US));
        self.next = Some(TokioInstant::now() + self.interval + jitter);
        debug!(interval_ms = self.interval.as_millis() as u64, "ticker started");
    }

    /// Stops the cadence; [`Ticker::tick`] pends until the next
    /// [`Ticker::start`]. No-op when already stopped.
    pub fn stop(&mut self) {
        if self.next.take().is_some() {
            debug!(ticks = self.count, "ticker stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.next.is_some()
    }

    /// Ticks fired since creation. Not reset by stop/start.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Resolves at the next step and returns its number, starting at 1.
    ///
    /// While stopped this future never completes; `select!` keeps
    /// servicing its other branches. Cancel-safe: dropping the future
    /// mid-wait loses nothing.
    pub async fn tick(&mut self) -> u64 {
        let Some(next) = self.next else {
            std::future::pending::<()>().await;
            unreachable!()
        };

        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.count += 1;

        // Late wake: drop the missed steps and pick the cadence back up
        // from now instead of racing to catch up.
        let late_by = now.saturating_duration_since(next);
        let missed = (late_by.as_nanos() / self.interval.as_nanos()) as u64;
        if missed > 0 {
            warn!(
                tick = self.count,
                missed,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "tick overrun, skipping ahead"
            );
        }
        self.next = Some(now + self.interval);

        trace!(tick = self.count, "tick fired");
        self.count
    }
}

// ---------------------------------------------------------------------------
// Repeater
// ---------------------------------------------------------------------------

/// A periodic job on its own task.
///
/// The job runs once per period, first fire one full period after spawn.
/// Missed runs are skipped, not queued. The task is aborted by
/// [`Repeater::cancel`] or when the handle drops, so holding the
/// `Repeater` is what keeps the job alive.
pub struct Repeater {
    handle: JoinHandle<()>,
}

impl Repeater {
    pub fn spawn<F, Fut>(period: Duration, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let handle = tokio::spawn(async move {
            let mut timer = time::interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first interval tick completes immediately; swallow it so
            // the job's first run is one period out.
            timer.tick().await;
            loop {
                timer.tick().await;
                job().await;
            }
        });
        Self { handle }
    }

    /// Stops the job. Idempotent; safe alongside the drop abort.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for Repeater {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
