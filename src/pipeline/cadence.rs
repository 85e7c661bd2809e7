//! # Cadence Helpers
//!
//! Timing arithmetic for the periodic loops.
//!
//! ## Jitter compensation
//!
//! A sampling loop sleeps `interval - elapsed` after each cycle so that the
//! long-run cadence tracks the configured interval regardless of how long the
//! bus transaction took. When a cycle overruns, the overrun is folded back:
//! the next sleep is `|interval - (elapsed - interval)|`.
//!
//! ## Two-timer merge
//!
//! [`PeriodicSchedule`] tracks two independent deadlines (keep-alive and link
//! status) so one task can serve both without a timer task of its own.

use std::time::Duration;

use tokio::time::Instant;

/// Delay before the next cycle given the configured interval and the time
/// the current cycle took.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use asset_telemetry::pipeline::cadence::next_delay;
///
/// let interval = Duration::from_secs(5);
/// assert_eq!(next_delay(interval, Duration::from_secs(1)), Duration::from_secs(4));
/// assert_eq!(next_delay(interval, Duration::from_secs(7)), Duration::from_secs(3));
/// ```
pub fn next_delay(interval: Duration, elapsed: Duration) -> Duration {
    if elapsed < interval {
        return interval - elapsed;
    }
    let overrun = elapsed - interval;
    if overrun <= interval {
        interval - overrun
    } else {
        overrun - interval
    }
}

/// Which periodic obligations are due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Due {
    pub keep_alive: bool,
    pub link_status: bool,
}

/// Two independent fixed-period deadlines served by one task.
#[derive(Debug, Clone)]
pub struct PeriodicSchedule {
    keep_alive_every: Duration,
    link_status_every: Duration,
    next_keep_alive: Instant,
    next_link_status: Instant,
}

impl PeriodicSchedule {
    /// Both obligations are due immediately at `start`.
    pub fn new(keep_alive_every: Duration, link_status_every: Duration, start: Instant) -> Self {
        Self {
            keep_alive_every,
            link_status_every,
            next_keep_alive: start,
            next_link_status: start,
        }
    }

    /// The nearer of the two deadlines.
    pub fn next_deadline(&self) -> Instant {
        self.next_keep_alive.min(self.next_link_status)
    }

    /// Report what is due at `now` and reschedule it one period after `now`.
    pub fn take_due(&mut self, now: Instant) -> Due {
        let mut due = Due::default();
        if now >= self.next_keep_alive {
            due.keep_alive = true;
            self.next_keep_alive = now + self.keep_alive_every;
        }
        if now >= self.next_link_status {
            due.link_status = true;
            self.next_link_status = now + self.link_status_every;
        }
        due
    }
}
