//! Cloud session collaborator and its shared handle.
//!
//! The [`Cloud`] handle owns the client and the current [`Session`]. Delivery
//! publishes through it; the supervisor reconnects through it. Publishing
//! without a session fails with [`CloudError::NotConnected`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Link, RetryPolicy};
use crate::display::{DisplayEvent, DisplaySink};
use crate::error::CloudError;
use crate::pipeline::Packet;

/// Upper bound on one publish; the session lock is held for its duration.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// An established cloud session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: u64,
}

impl Session {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Cloud broker client.
#[async_trait]
pub trait CloudClient: Send {
    async fn connect(&mut self) -> Result<Session, CloudError>;

    async fn publish(&mut self, session: &Session, packet: &Packet) -> Result<(), CloudError>;

    async fn disconnect(&mut self, session: Session);
}

struct CloudState {
    client: Box<dyn CloudClient>,
    session: Option<Session>,
}

/// Shared cloud handle.
pub struct Cloud {
    state: Mutex<CloudState>,
}

impl std::fmt::Debug for Cloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cloud").finish_non_exhaustive()
    }
}

impl Cloud {
    pub fn new(client: Box<dyn CloudClient>) -> Self {
        Self {
            state: Mutex::new(CloudState {
                client,
                session: None,
            }),
        }
    }

    pub async fn has_session(&self) -> bool {
        self.state.lock().await.session.is_some()
    }

    /// Single connect attempt. A session that is already open, whoever
    /// opened it, is kept as is.
    pub async fn connect(&self) -> Result<(), CloudError> {
        let mut state = self.state.lock().await;
        if let Some(session) = &state.session {
            debug!("Cloud session {} already open", session.id());
            return Ok(());
        }
        let session = state.client.connect().await?;
        info!("Cloud session {} established", session.id());
        state.session = Some(session);
        Ok(())
    }

    /// Publish one packet on the current session.
    ///
    /// # Errors
    ///
    /// - [`CloudError::NotConnected`] without a session
    /// - [`CloudError::Timeout`] if the client does not answer within
    ///   [`PUBLISH_TIMEOUT`]
    pub async fn publish(&self, packet: &Packet) -> Result<(), CloudError> {
        let mut state = self.state.lock().await;
        let CloudState { client, session } = &mut *state;
        let session = session.as_ref().ok_or(CloudError::NotConnected)?;
        tokio::time::timeout(PUBLISH_TIMEOUT, client.publish(session, packet))
            .await
            .map_err(|_| CloudError::Timeout(PUBLISH_TIMEOUT))?
    }

    /// Close the current session, if any.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.session.take() {
            debug!("Closing cloud session {}", session.id());
            state.client.disconnect(session).await;
        }
    }

    /// First session establishment: one attempt, then the bounded retry
    /// loop. Never closes a session, so one opened meanwhile by a
    /// supervisor reconnect survives.
    pub async fn establish(
        &self,
        link: &Link,
        policy: RetryPolicy,
        display: &dyn DisplaySink,
    ) -> Result<(), CloudError> {
        match self.connect().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Cloud connect failed: {}", e);
                self.retry_connect(link, policy, display).await
            }
        }
    }

    /// Bounded reconnect: the stale session is closed, then the retry loop
    /// runs.
    ///
    /// # Errors
    ///
    /// - [`CloudError::Link`] if a liveness probe failed
    /// - [`CloudError::Exhausted`] once every attempt has failed
    pub async fn reconnect(
        &self,
        link: &Link,
        policy: RetryPolicy,
        display: &dyn DisplaySink,
    ) -> Result<(), CloudError> {
        self.disconnect().await;
        self.retry_connect(link, policy, display).await
    }

    /// Each attempt probes the link first and gives up immediately if the
    /// link is dead.
    async fn retry_connect(
        &self,
        link: &Link,
        policy: RetryPolicy,
        display: &dyn DisplaySink,
    ) -> Result<(), CloudError> {
        for attempt in 1..=policy.attempts {
            display.notify(DisplayEvent::CloudRetrying);

            let signal = link.liveness().await?;
            debug!("Cloud attempt {}/{} at {} dBm", attempt, policy.attempts, signal.rssi_dbm);

            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Cloud attempt {}/{} failed: {}", attempt, policy.attempts, e);
                    if attempt < policy.attempts {
                        tokio::time::sleep(policy.delay).await;
                    }
                }
            }
        }
        Err(CloudError::Exhausted(policy.attempts))
    }
}
