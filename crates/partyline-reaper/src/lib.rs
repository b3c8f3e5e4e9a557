//! Timers for Partyline's housekeeping.
//!
//! Two kinds of time-driven work keep the room registry tidy:
//!
//! - A periodic **sweep** that removes rooms nobody has touched for a
//!   long time ([`SweepScheduler`]).
//! - One-shot **grace timers** that fire once after a delay, e.g. to
//!   drop a disconnected player who never came back ([`schedule_once`]).
//!
//! # Integration
//!
//! The scheduler is designed to sit inside the lobby actor's
//! `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         _ = sweeper.wait_for_sweep() => {
//!             let reaped = rooms.sweep_expired(Instant::now());
//!             sweeper.record_sweep(reaped);
//!         }
//!     }
//! }
//! ```
//!
//! Grace timers report back by sending a message into the same actor.
//! They hold only a weak sender, so a pending timer never keeps a
//! stopped actor's channel alive.

use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the sweep scheduler.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Time between sweeps. `Duration::ZERO` disables sweeping.
    pub interval: Duration,
    /// Random jitter (0..max) added to the *first* sweep so several
    /// servers started together don't sweep in lockstep.
    pub initial_jitter: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30 * 60),
            initial_jitter: Duration::from_secs(5),
        }
    }
}

impl SweepConfig {
    /// Shortest interval accepted. Anything lower is raised to this.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

    /// Fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`SweepScheduler::new`]. A non-zero
    /// interval below [`Self::MIN_INTERVAL`] is raised to it, and the
    /// jitter is capped to one interval.
    pub fn validated(mut self) -> Self {
        if !self.interval.is_zero() && self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                min_ms = Self::MIN_INTERVAL.as_millis() as u64,
                "sweep interval below minimum, raising"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        if self.initial_jitter > self.interval {
            self.initial_jitter = self.interval;
        }
        self
    }

    /// The sweep period, or `None` when sweeping is disabled.
    pub fn period(&self) -> Option<Duration> {
        (!self.interval.is_zero()).then_some(self.interval)
    }
}

// ---------------------------------------------------------------------------
// Sweep info and metrics
// ---------------------------------------------------------------------------

/// Returned by [`SweepScheduler::wait_for_sweep`] each time a sweep is due.
#[derive(Debug, Clone)]
pub struct SweepInfo {
    /// Sweep number, starting at 1.
    pub sweep: u64,
    /// `true` if the scheduler woke up more than 10% of an interval late,
    /// usually because the actor was busy.
    pub late: bool,
}

/// Running totals for the sweep loop.
#[derive(Debug, Clone, Default)]
pub struct SweepMetrics {
    pub total_sweeps: u64,
    /// Rooms removed across all sweeps, as reported by
    /// [`SweepScheduler::record_sweep`].
    pub total_reaped: u64,
    pub late_sweeps: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Periodic sweep scheduler. One per lobby actor.
///
/// Missed sweeps are never replayed: after a late wake-up the next
/// sweep is scheduled one full interval from now.
pub struct SweepScheduler {
    interval: Option<Duration>,
    next_sweep: Option<TokioInstant>,
    sweep_count: u64,
    metrics: SweepMetrics,
}

impl SweepScheduler {
    pub fn new(config: SweepConfig) -> Self {
        let config = config.validated();
        let interval = config.period();

        let next_sweep = interval.map(|d| {
            let jitter = if config.initial_jitter.is_zero() {
                Duration::ZERO
            } else {
                let ms = config.initial_jitter.as_millis() as u64;
                Duration::from_millis(rand::rng().random_range(0..=ms))
            };
            TokioInstant::now() + d + jitter
        });

        match interval {
            Some(d) => debug!(interval_secs = d.as_secs(), "sweep scheduler created"),
            None => debug!("sweep scheduler created with sweeping disabled"),
        }

        Self {
            interval,
            next_sweep,
            sweep_count: 0,
            metrics: SweepMetrics::default(),
        }
    }

    /// Wait until the next sweep is due.
    ///
    /// When sweeping is disabled this future
    /// pends forever, which lets `tokio::select!` keep serving its other
    /// branches.
    pub async fn wait_for_sweep(&mut self) -> SweepInfo {
        let (next, interval) = match (self.next_sweep, self.interval) {
            (Some(next), Some(interval)) => (next, interval),
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.sweep_count += 1;

        let late_by = now.saturating_duration_since(next);
        let late = late_by > interval / 10;
        if late {
            self.metrics.late_sweeps += 1;
            warn!(
                sweep = self.sweep_count,
                late_ms = late_by.as_millis() as u64,
                "sweep fired late"
            );
        }
        self.next_sweep = Some(now + interval);
        self.metrics.total_sweeps += 1;

        trace!(sweep = self.sweep_count, late, "sweep due");

        SweepInfo {
            sweep: self.sweep_count,
            late,
        }
    }

    /// Record how many rooms the sweep that just ran removed.
    pub fn record_sweep(&mut self, reaped: usize) {
        self.metrics.total_reaped += reaped as u64;
        if reaped > 0 {
            debug!(sweep = self.sweep_count, reaped, "sweep removed idle rooms");
        }
    }

    /// Whether sweeping is turned off (interval of zero).
    pub fn is_disabled(&self) -> bool {
        self.interval.is_none()
    }

    pub fn sweep_count(&self) -> u64 {
        self.sweep_count
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn metrics(&self) -> &SweepMetrics {
        &self.metrics
    }
}

// ---------------------------------------------------------------------------
// One-shot timers
// ---------------------------------------------------------------------------

/// Sends `msg` to `target` once `delay` has elapsed.
///
/// If every strong sender for `target` is gone by then, the message is
/// silently dropped. Aborting the returned handle cancels the timer.
pub fn schedule_once<T>(delay: Duration, target: mpsc::WeakSender<T>, msg: T) -> JoinHandle<()>
where
    T: Send + 'static,
{
    tokio::spawn(async move {
        time::sleep(delay).await;
        match target.upgrade() {
            Some(sender) => {
                if sender.send(msg).await.is_err() {
                    trace!("timer target closed before delivery");
                }
            }
            None => trace!("timer target dropped before delivery"),
        }
    })
}
