//! Wireless link collaborator and its shared handle.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::RetryPolicy;
use crate::display::{DisplayEvent, DisplaySink};
use crate::error::LinkError;

/// Received signal strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    pub rssi_dbm: i16,
}

/// Link-layer identity reported in status packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkIdentity {
    pub mac: String,
    pub ssid: String,
}

/// Link-layer driver (association, signal probe, teardown).
#[async_trait]
pub trait LinkDriver: Send {
    /// Associate with the access point.
    async fn up(&mut self) -> Result<(), LinkError>;

    /// Cheap liveness probe; fails when the link is gone.
    async fn liveness(&mut self) -> Result<Signal, LinkError>;

    /// Tear the association down.
    async fn down(&mut self);

    fn identity(&self) -> LinkIdentity;
}

/// Shared link handle used by the connectivity, delivery and supervisor tasks.
pub struct Link {
    driver: Mutex<Box<dyn LinkDriver>>,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

impl Link {
    pub fn new(driver: Box<dyn LinkDriver>) -> Self {
        Self {
            driver: Mutex::new(driver),
        }
    }

    pub async fn liveness(&self) -> Result<Signal, LinkError> {
        self.driver.lock().await.liveness().await
    }

    pub async fn identity(&self) -> LinkIdentity {
        self.driver.lock().await.identity()
    }

    pub async fn down(&self) {
        self.driver.lock().await.down().await;
    }

    /// Bring the link up, retrying per `policy`.
    ///
    /// The driver lock is only held for one attempt at a time, so liveness
    /// probes from other tasks are not starved during the retry delays.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Exhausted`] once every attempt has failed.
    pub async fn establish(&self, policy: RetryPolicy, display: &dyn DisplaySink) -> Result<(), LinkError> {
        for attempt in 1..=policy.attempts {
            let result = self.driver.lock().await.up().await;
            match result {
                Ok(()) => {
                    info!("Link up after {} attempt(s)", attempt);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Link attempt {}/{} failed: {}", attempt, policy.attempts, e);
                    if attempt < policy.attempts {
                        display.notify(DisplayEvent::LinkRetrying);
                        tokio::time::sleep(policy.delay).await;
                    }
                }
            }
        }
        Err(LinkError::Exhausted(policy.attempts))
    }

    /// Recover a dropped link.
    ///
    /// If the link answers a liveness probe it has come back on its own and
    /// nothing else is done. Otherwise the stale association is torn down and
    /// [`Link::establish`] runs with the same policy as the initial bring-up.
    pub async fn reconnect(&self, policy: RetryPolicy, display: &dyn DisplaySink) -> Result<(), LinkError> {
        if let Ok(signal) = self.liveness().await {
            info!("Link answered liveness probe ({} dBm), no reconnect needed", signal.rssi_dbm);
            return Ok(());
        }
        self.down().await;
        display.notify(DisplayEvent::LinkRetrying);
        self.establish(policy, display).await
    }
}
