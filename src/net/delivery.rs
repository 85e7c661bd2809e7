//! Delivery task: drains the outbound queue into the cloud.
//!
//! Delivery never retries on its own. A failed publish or a dead link is
//! written to the status registry and left to the supervisor; meanwhile the
//! task parks until the cloud is reported connected again.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Cloud, Link, RetryPolicy};
use crate::clock::Clock;
use crate::codec::PacketEncoder;
use crate::display::{DisplayEvent, DisplaySink};
use crate::error::CloudError;
use crate::pipeline::{DropOldestQueue, Packet};
use crate::status::{CloudStatus, LinkStatus, ReportFault};

/// The delivery task.
pub struct DeliveryTask {
    pub(crate) link: Arc<Link>,
    pub(crate) cloud: Arc<Cloud>,
    pub(crate) status: Arc<dyn ReportFault>,
    pub(crate) outbound: Arc<DropOldestQueue<Packet>>,
    pub(crate) encoder: Arc<dyn PacketEncoder>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) display: Arc<dyn DisplaySink>,
    pub(crate) policy: RetryPolicy,
}

impl DeliveryTask {
    pub async fn run(self, token: CancellationToken) {
        tokio::select! {
            _ = token.cancelled() => debug!("Delivery task cancelled"),
            _ = self.serve() => {}
        }
    }

    async fn serve(&self) {
        let mut link_rx = self.status.subscribe_link();
        let mut cloud_rx = self.status.subscribe_cloud();

        if link_rx.wait_for(|s| *s == LinkStatus::Connected).await.is_err() {
            return;
        }

        if self.status.cloud() == CloudStatus::NotConnected {
            match self.cloud.establish(&self.link, self.policy, self.display.as_ref()).await {
                Ok(()) => {
                    if self.status.report_cloud_up() {
                        self.display.notify(DisplayEvent::CloudConnected);
                    }
                    self.queue_session_marker();
                }
                Err(CloudError::Link(e)) => {
                    warn!("Link lost while opening the cloud session: {}", e);
                    if self.status.report_link_lost() {
                        self.status.request_recovery();
                    }
                }
                Err(e) => {
                    if self.status.report_cloud_shutdown() {
                        error!("Cloud session could not be established: {}", e);
                        self.status.request_recovery();
                        return;
                    }
                    // Recovery owns the cloud by now; wait for its outcome
                    warn!("Cloud setup failed while under recovery: {}", e);
                }
            }
        }

        loop {
            if cloud_rx.wait_for(|s| *s == CloudStatus::Connected).await.is_err() {
                return;
            }
            self.outbound.wait_non_empty().await;
            if self.status.cloud() != CloudStatus::Connected {
                continue;
            }

            if let Err(e) = self.link.liveness().await {
                warn!("Link liveness probe failed before publish: {}", e);
                if self.status.report_link_lost() {
                    self.status.request_recovery();
                }
                // Park until the supervisor has dealt with the link
                if link_rx.wait_for(|s| *s != LinkStatus::Disconnected).await.is_err() {
                    return;
                }
                continue;
            }

            let Some(packet) = self.outbound.pop() else {
                continue;
            };
            match self.cloud.publish(&packet).await {
                Ok(()) => debug!("Published {} bytes", packet.len()),
                Err(e) => {
                    warn!("Publish failed, packet dropped: {}", e);
                    if self.status.report_cloud_lost() {
                        self.status.request_recovery();
                    }
                }
            }
        }
    }

    fn queue_session_marker(&self) {
        let packet = self
            .clock
            .now()
            .map_err(|e| e.to_string())
            .and_then(|at| self.encoder.session(at).map_err(|e| e.to_string()));
        match packet {
            Ok(packet) => {
                info!("Queueing new-session marker");
                self.outbound.push(packet);
            }
            Err(e) => warn!("Session marker skipped: {}", e),
        }
    }
}
