//! # Shared Bus Module
//!
//! Serializes access to the single physical sensor bus and arms a timeout
//! sentinel around every transaction.
//!
//! If a transaction does not finish within the bound, the in-flight future is
//! dropped (which releases the bus guard), the owning sensor is flagged
//! through [`ReportFault::report_bus_timeout`], and the supervisor is woken.
//! A wedged transaction therefore cannot starve the other sensors.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::BusTimeout;
use crate::status::{ReportFault, SensorKind};

/// The shared sensor bus.
pub struct SharedBus {
    guard: Mutex<()>,
    limit: Duration,
    status: Arc<dyn ReportFault>,
}

impl std::fmt::Debug for SharedBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBus")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl SharedBus {
    /// # Arguments
    ///
    /// * `limit` - Sentinel bound per transaction, drift factor already applied
    /// * `status` - Where sentinel expiries are reported
    pub fn new(limit: Duration, status: Arc<dyn ReportFault>) -> Self {
        Self {
            guard: Mutex::new(()),
            limit,
            status,
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Run one bus transaction on behalf of `kind`.
    ///
    /// Waits for exclusive access, then runs `op` with the sentinel armed.
    /// The guard is released on every exit path, including cancellation of
    /// the returned future.
    ///
    /// # Errors
    ///
    /// Returns [`BusTimeout`] if `op` did not complete within the bound. The
    /// sensor status has already been updated when this is returned.
    pub async fn transact<F>(&self, kind: SensorKind, op: F) -> Result<F::Output, BusTimeout>
    where
        F: Future,
    {
        let guard = self.guard.lock().await;
        let outcome = tokio::time::timeout(self.limit, op).await;
        drop(guard);

        match outcome {
            Ok(output) => Ok(output),
            Err(_) => {
                self.on_expiry(kind);
                Err(BusTimeout {
                    kind,
                    limit: self.limit,
                })
            }
        }
    }

    fn on_expiry(&self, kind: SensorKind) {
        match self.status.report_bus_timeout(kind) {
            Some(status) => {
                warn!("{} sensor bus transaction timed out, now {:?}", kind, status);
                self.status.wake_supervisor();
            }
            None => debug!("{} sensor bus transaction timed out, status unchanged", kind),
        }
    }
}
