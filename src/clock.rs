//! Time source for reading and packet timestamps.

use chrono::{DateTime, Utc};

use crate::error::ClockError;

/// Wall-clock timestamp attached to readings and status packets.
pub type Timestamp = DateTime<Utc>;

/// Wall-clock provider.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    /// Current time.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError`] if the time source is not synchronized yet.
    fn now(&self) -> Result<Timestamp, ClockError>;
}

/// Host system clock; always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<Timestamp, ClockError> {
        Ok(Utc::now())
    }
}

/// Render a timestamp as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn format_timestamp(at: &Timestamp) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
