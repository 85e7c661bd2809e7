//! # Codec Module
//!
//! Converts readings and periodic status reports into wire packets.
//!
//! The pipeline only depends on [`PacketEncoder`]; [`JsonEncoder`] is the
//! JSON layout the cloud side expects.

mod json;

pub use json::JsonEncoder;

use crate::clock::Timestamp;
use crate::config::SamplingConfig;
use crate::error::SerializeError;
use crate::net::{LinkIdentity, Signal};
use crate::pipeline::{Packet, Reading};
use crate::status::SensorKind;

/// Configured report intervals in seconds, as advertised by keep-alive packets:
/// environmental, inertial, positional, link status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveIntervals(pub [u64; 4]);

impl From<&SamplingConfig> for KeepAliveIntervals {
    fn from(sampling: &SamplingConfig) -> Self {
        KeepAliveIntervals([
            sampling.interval(SensorKind::Environmental).as_secs(),
            sampling.interval(SensorKind::Inertial).as_secs(),
            sampling.interval(SensorKind::Positional).as_secs(),
            sampling.link_status_interval().as_secs(),
        ])
    }
}

/// Serialization collaborator.
pub trait PacketEncoder: Send + Sync {
    /// Encode one sensor reading.
    fn serialize(&self, reading: &Reading) -> Result<Packet, SerializeError>;

    /// Encode a keep-alive report.
    fn keep_alive(&self, at: Timestamp, intervals: &KeepAliveIntervals) -> Result<Packet, SerializeError>;

    /// Encode a link status report.
    fn link_status(
        &self,
        at: Timestamp,
        identity: &LinkIdentity,
        signal: Signal,
    ) -> Result<Packet, SerializeError>;

    /// Encode the "new session" marker sent after a cloud session is established.
    fn session(&self, at: Timestamp) -> Result<Packet, SerializeError>;
}
