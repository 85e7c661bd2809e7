//! Sensor readings as a tagged sum type.

use crate::clock::Timestamp;
use crate::status::SensorKind;

/// Temperature and relative humidity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnvironmentalSample {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub available: bool,
    pub timestamp: Timestamp,
}

/// Accelerometer (m/s²) and gyroscope (°/s) on three axes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InertialSample {
    pub accel: [f32; 3],
    pub gyro: [f32; 3],
    pub available: bool,
    pub timestamp: Timestamp,
}

/// GNSS position fix.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PositionalSample {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    pub satellites: u8,
    pub available: bool,
    pub timestamp: Timestamp,
}

/// One sampling cycle of one sensor.
///
/// `available == false` means the sensor is connected but produced nothing
/// usable this cycle; such readings are still forwarded.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Environmental(EnvironmentalSample),
    Inertial(InertialSample),
    Positional(PositionalSample),
}

impl Reading {
    /// A zeroed, unavailable reading of the given kind, ready for a driver to fill.
    pub fn empty(kind: SensorKind) -> Self {
        match kind {
            SensorKind::Environmental => Reading::Environmental(EnvironmentalSample::default()),
            SensorKind::Inertial => Reading::Inertial(InertialSample::default()),
            SensorKind::Positional => Reading::Positional(PositionalSample::default()),
        }
    }

    pub fn kind(&self) -> SensorKind {
        match self {
            Reading::Environmental(_) => SensorKind::Environmental,
            Reading::Inertial(_) => SensorKind::Inertial,
            Reading::Positional(_) => SensorKind::Positional,
        }
    }

    pub fn available(&self) -> bool {
        match self {
            Reading::Environmental(s) => s.available,
            Reading::Inertial(s) => s.available,
            Reading::Positional(s) => s.available,
        }
    }

    pub fn set_available(&mut self, available: bool) {
        match self {
            Reading::Environmental(s) => s.available = available,
            Reading::Inertial(s) => s.available = available,
            Reading::Positional(s) => s.available = available,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            Reading::Environmental(s) => s.timestamp,
            Reading::Inertial(s) => s.timestamp,
            Reading::Positional(s) => s.timestamp,
        }
    }

    pub fn set_timestamp(&mut self, at: Timestamp) {
        match self {
            Reading::Environmental(s) => s.timestamp = at,
            Reading::Inertial(s) => s.timestamp = at,
            Reading::Positional(s) => s.timestamp = at,
        }
    }
}
