//! # Status Module
//!
//! Status enums shared by every pipeline task and the [`StatusRegistry`]
//! that holds them.
//!
//! Sensor status follows a strict lifecycle:
//!
//! ```text
//! NotProbed ──► Probed ──► Connected ──► Disconnected ──► Reconnected ──► Connected
//!     │            │                          │                │
//!     └────────────┴──────► ProbeFailed ◄─────┴────────────────┘
//!                                │
//!                                ▼
//!                            Shutdown
//! ```
//!
//! Link and cloud status share one shape: anything may move anywhere except
//! out of `Shutdown`.

mod registry;

pub use registry::{Arbitrate, ReportFault, StatusRegistry, StatusSnapshot};

use std::fmt;

/// The three sensors sharing the bus, in supervisor priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    /// Temperature and humidity
    Environmental,
    /// Accelerometer and gyroscope
    Inertial,
    /// GNSS receiver
    Positional,
}

impl SensorKind {
    /// Every sensor kind, in the order the supervisor inspects them.
    pub const ALL: [SensorKind; 3] = [
        SensorKind::Environmental,
        SensorKind::Inertial,
        SensorKind::Positional,
    ];

    pub fn index(self) -> usize {
        match self {
            SensorKind::Environmental => 0,
            SensorKind::Inertial => 1,
            SensorKind::Positional => 2,
        }
    }

    /// Part name shown on the status line.
    pub fn part_name(self) -> &'static str {
        match self {
            SensorKind::Environmental => "SI7021",
            SensorKind::Inertial => "BMI270",
            SensorKind::Positional => "MAX-M10S",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorKind::Environmental => "environmental",
            SensorKind::Inertial => "inertial",
            SensorKind::Positional => "positional",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorStatus {
    NotProbed,
    Probed,
    ProbeFailed,
    Connected,
    Disconnected,
    Reconnected,
    Shutdown,
}

impl SensorStatus {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: SensorStatus) -> bool {
        use SensorStatus::*;
        matches!(
            (self, next),
            (NotProbed, Probed)
                | (NotProbed, ProbeFailed)
                | (Probed, Connected)
                | (Probed, ProbeFailed)
                | (Connected, Disconnected)
                | (Disconnected, Reconnected)
                | (Disconnected, ProbeFailed)
                | (Disconnected, Shutdown)
                | (Reconnected, Probed)
                | (Reconnected, Connected)
                | (Reconnected, ProbeFailed)
                | (Reconnected, Disconnected)
                | (ProbeFailed, Shutdown)
        )
    }

    /// Statuses the supervisor has to act on.
    pub fn needs_recovery(self) -> bool {
        matches!(self, SensorStatus::ProbeFailed | SensorStatus::Disconnected)
    }
}

/// Wireless link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkStatus {
    NotConnected,
    Connected,
    Disconnected,
    Shutdown,
}

/// Cloud session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudStatus {
    NotConnected,
    Connected,
    Disconnected,
    Shutdown,
}

impl LinkStatus {
    pub fn is_faulted(self) -> bool {
        matches!(self, LinkStatus::Disconnected | LinkStatus::Shutdown)
    }
}

impl CloudStatus {
    pub fn is_faulted(self) -> bool {
        matches!(self, CloudStatus::Disconnected | CloudStatus::Shutdown)
    }
}

/// Whether a recovery episode is already underway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryProgress {
    Idle,
    InProgress,
}

/// One accepted status write, broadcast to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Sensor {
        kind: SensorKind,
        from: SensorStatus,
        to: SensorStatus,
    },
    Link {
        from: LinkStatus,
        to: LinkStatus,
    },
    Cloud {
        from: CloudStatus,
        to: CloudStatus,
    },
}
