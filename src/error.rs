//! # Error Types
//!
//! Error types for the telemetry pipeline using `thiserror`.
//!
//! Each external collaborator class gets its own small error enum so that the
//! pipeline can tell a transient fault from a connectivity fault by type alone.
//! [`TelemetryError`] covers configuration and startup failures.

use std::time::Duration;

use thiserror::Error;

use crate::status::SensorKind;

/// Main error type for the telemetry pipeline
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Packet construction errors
    #[error("Packet error: {0}")]
    Packet(String),

    /// Task creation or recreation errors
    #[error("Task error: {0}")]
    Task(String),
}

/// Result type alias for the telemetry pipeline
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// A bus transaction did not complete within the sentinel bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("bus transaction for {kind} sensor exceeded {limit:?}")]
pub struct BusTimeout {
    pub kind: SensorKind,
    pub limit: Duration,
}

/// Sensor driver initialization errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("device did not answer")]
    NoResponse,

    #[error("bus error: {0}")]
    Bus(String),

    #[error(transparent)]
    Timeout(#[from] BusTimeout),
}

/// One-shot sensor read errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("no data available")]
    NoData,

    #[error("no valid position fix")]
    NoFix,

    #[error("bus error: {0}")]
    Bus(String),

    #[error(transparent)]
    Timeout(#[from] BusTimeout),
}

impl ReadError {
    /// Whether the sentinel fired for this read.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ReadError::Timeout(_))
    }
}

/// Reading to packet conversion errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializeError {
    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("packet of {len} bytes exceeds maximum {max}")]
    TooLarge { len: usize, max: usize },
}

impl From<serde_json::Error> for SerializeError {
    fn from(e: serde_json::Error) -> Self {
        SerializeError::Encode(e.to_string())
    }
}

/// Time source errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    #[error("time source unavailable: {0}")]
    Unavailable(String),
}

/// Wireless link errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("association failed: {0}")]
    Association(String),

    #[error("no signal")]
    NoSignal,

    #[error("gave up after {0} attempts")]
    Exhausted(u32),
}

/// Cloud session errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloudError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("no cloud session")]
    NotConnected,

    #[error("link unavailable: {0}")]
    Link(#[from] LinkError),

    #[error("gave up after {0} attempts")]
    Exhausted(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_timeout_converts_into_sensor_errors() {
        let timeout = BusTimeout {
            kind: SensorKind::Inertial,
            limit: Duration::from_millis(2000),
        };

        let probe: ProbeError = timeout.into();
        let read: ReadError = timeout.into();

        assert_eq!(probe, ProbeError::Timeout(timeout));
        assert!(read.is_timeout());
        assert!(!ReadError::NoData.is_timeout());
    }

    #[test]
    fn test_error_messages() {
        let err = SerializeError::TooLarge { len: 600, max: 512 };
        assert_eq!(err.to_string(), "packet of 600 bytes exceeds maximum 512");

        let err = CloudError::from(LinkError::NoSignal);
        assert_eq!(err.to_string(), "link unavailable: no signal");
    }
}
