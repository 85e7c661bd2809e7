//! # Sensor Module
//!
//! Sensor driver collaborator trait and the per-sensor capture tasks.
//!
//! This module handles:
//! - Probing and re-probing each sensor over the shared bus
//! - Jitter-compensated sampling loops
//! - GNSS fix/data retry loops
//! - Forwarding every cycle, including unavailable ones, to the reading queue

pub mod capture;
mod gnss;

pub use capture::{spawn_capture, CaptureContext, CaptureSettings};

use async_trait::async_trait;

use crate::error::{ProbeError, ReadError};
use crate::pipeline::Reading;
use crate::status::SensorKind;

/// Encoding a GNSS receiver uses to report its fix type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixProtocol {
    /// Binary protocol; 2 = 2D fix, 3 = 3D fix
    Ubx,
    /// NMEA GGA fix quality; 1 = GPS fix
    Nmea,
}

/// A receiver-reported fix type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixType {
    pub protocol: FixProtocol,
    pub code: u8,
}

impl FixType {
    /// No fix, in the binary protocol encoding.
    pub const NONE: FixType = FixType {
        protocol: FixProtocol::Ubx,
        code: 0,
    };

    /// Whether this fix type authorizes a navigation data read.
    pub fn is_valid(&self) -> bool {
        match self.protocol {
            FixProtocol::Ubx => matches!(self.code, 2 | 3),
            FixProtocol::Nmea => self.code == 1,
        }
    }
}

/// Register-level sensor driver.
///
/// Every call is one bus transaction; the caller holds the bus guard and the
/// timeout sentinel around it.
#[async_trait]
pub trait SensorDriver: Send {
    fn kind(&self) -> SensorKind;

    /// Initialize the device.
    async fn probe(&mut self) -> Result<(), ProbeError>;

    /// Fill `reading` with one sample.
    async fn read(&mut self, reading: &mut Reading) -> Result<(), ReadError>;

    /// Current fix type; only meaningful for positional sensors.
    async fn fix_type(&mut self) -> Result<FixType, ReadError> {
        Ok(FixType::NONE)
    }

    /// Release the device at shutdown.
    async fn deinit(&mut self) {}
}
