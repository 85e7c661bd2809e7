//! # Network Module
//!
//! Wireless link and cloud session handling.
//!
//! This module handles:
//! - The [`LinkDriver`] and [`CloudClient`] collaborator traits
//! - Shared [`Link`] and [`Cloud`] handles with bounded retry routines
//! - The connectivity task (link bring-up, keep-alive and status reports)
//! - The delivery task (draining the outbound queue into the cloud)

pub mod cloud;
pub mod connectivity;
pub mod delivery;
pub mod link;

pub use cloud::{Cloud, CloudClient, Session};
pub use connectivity::{link_gate, ConnectivityTask, LinkGate, LinkGateOpener};
pub use delivery::DeliveryTask;
pub use link::{Link, LinkDriver, LinkIdentity, Signal};

use std::time::Duration;

/// Fixed-count, fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Pause between two attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}
