//! Connectivity task: link bring-up plus periodic keep-alive and link-status
//! packets.
//!
//! Capture tasks wait on the [`LinkGate`] until the link has come up once;
//! there is no point sampling before data has anywhere to go.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Link, RetryPolicy};
use crate::clock::Clock;
use crate::codec::{KeepAliveIntervals, PacketEncoder};
use crate::display::{DisplayEvent, DisplaySink};
use crate::pipeline::cadence::PeriodicSchedule;
use crate::pipeline::{DropOldestQueue, Packet};
use crate::status::{LinkStatus, ReportFault};

/// Create a closed gate and its opener.
pub fn link_gate() -> (LinkGateOpener, LinkGate) {
    let (tx, rx) = watch::channel(false);
    (LinkGateOpener(tx), LinkGate(rx))
}

/// Opens the link gate; held by the connectivity task.
#[derive(Debug)]
pub struct LinkGateOpener(watch::Sender<bool>);

impl LinkGateOpener {
    /// Release every waiter. Idempotent.
    pub fn open(&self) {
        self.0.send_replace(true);
    }
}

/// Waits until the link has been up at least once.
#[derive(Debug, Clone)]
pub struct LinkGate(watch::Receiver<bool>);

impl LinkGate {
    pub fn is_open(&self) -> bool {
        *self.0.borrow()
    }

    /// Park until the gate opens. Returns `false` if the opener went away
    /// without ever opening it.
    pub async fn wait_open(&mut self) -> bool {
        self.0.wait_for(|open| *open).await.is_ok()
    }
}

/// The connectivity task.
pub struct ConnectivityTask {
    pub(crate) link: Arc<Link>,
    pub(crate) status: Arc<dyn ReportFault>,
    pub(crate) gate: LinkGateOpener,
    pub(crate) outbound: Arc<DropOldestQueue<Packet>>,
    pub(crate) encoder: Arc<dyn PacketEncoder>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) display: Arc<dyn DisplaySink>,
    pub(crate) policy: RetryPolicy,
    pub(crate) keep_alive_every: Duration,
    pub(crate) link_status_every: Duration,
    pub(crate) intervals: KeepAliveIntervals,
}

impl ConnectivityTask {
    pub async fn run(self, token: CancellationToken) {
        tokio::select! {
            _ = token.cancelled() => debug!("Connectivity task cancelled"),
            _ = self.serve() => {}
        }
    }

    async fn serve(&self) {
        if let Err(e) = self.link.establish(self.policy, self.display.as_ref()).await {
            error!("Link could not be established: {}", e);
            if self.status.report_link_shutdown() {
                self.status.request_recovery();
            }
            return;
        }

        self.status.report_link_up();
        self.display.notify(DisplayEvent::LinkConnected);
        self.gate.open();
        info!("Link connected, capture tasks released");

        let mut schedule = PeriodicSchedule::new(self.keep_alive_every, self.link_status_every, Instant::now());
        loop {
            tokio::time::sleep_until(schedule.next_deadline()).await;
            let due = schedule.take_due(Instant::now());
            if due.keep_alive {
                self.send_keep_alive();
            }
            if due.link_status {
                self.send_link_status().await;
            }
        }
    }

    fn send_keep_alive(&self) {
        let at = match self.clock.now() {
            Ok(at) => at,
            Err(e) => {
                warn!("Skipping keep-alive: {}", e);
                return;
            }
        };
        match self.encoder.keep_alive(at, &self.intervals) {
            Ok(packet) => self.enqueue(packet, "keep-alive"),
            Err(e) => warn!("Keep-alive encoding failed: {}", e),
        }
    }

    async fn send_link_status(&self) {
        if self.status.link() != LinkStatus::Connected {
            debug!("Link not connected, skipping status report");
            return;
        }

        let signal = match self.link.liveness().await {
            Ok(signal) => signal,
            Err(e) => {
                warn!("Link liveness probe failed: {}", e);
                if self.status.report_link_lost() {
                    self.status.request_recovery();
                }
                return;
            }
        };

        let at = match self.clock.now() {
            Ok(at) => at,
            Err(e) => {
                warn!("Skipping link status: {}", e);
                return;
            }
        };
        let identity = self.link.identity().await;
        match self.encoder.link_status(at, &identity, signal) {
            Ok(packet) => self.enqueue(packet, "link status"),
            Err(e) => warn!("Link status encoding failed: {}", e),
        }
    }

    fn enqueue(&self, packet: Packet, what: &str) {
        debug!("Queueing {} packet ({} bytes)", what, packet.len());
        if self.outbound.push(packet).is_some() {
            debug!("Outbound queue full, dropped oldest packet");
        }
    }
}
