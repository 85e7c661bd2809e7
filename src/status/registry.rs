//! Shared status record with two write capabilities.
//!
//! Pipeline tasks hold the registry as `Arc<dyn ReportFault>`: they may read
//! anything but only report their own failures (and their own first success).
//! The recovery supervisor holds the concrete [`StatusRegistry`] and uses
//! [`Arbitrate`] to write arbitrary values.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch, Notify};
use tracing::{debug, info, warn};

use super::{
    CloudStatus, LinkStatus, RecoveryProgress, SensorKind, SensorStatus, StatusChange,
};

/// Capacity of the status-change broadcast ring.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Read access plus the "report my own fault" writes available to every task.
pub trait ReportFault: Send + Sync {
    fn sensor(&self, kind: SensorKind) -> SensorStatus;
    fn link(&self) -> LinkStatus;
    fn cloud(&self) -> CloudStatus;

    /// Watch the link status; used to gate delivery.
    fn subscribe_link(&self) -> watch::Receiver<LinkStatus>;

    /// Watch the cloud status; used to gate delivery.
    fn subscribe_cloud(&self) -> watch::Receiver<CloudStatus>;

    /// Probe completed: `NotProbed -> Probed -> Connected` or `Reconnected -> Connected`.
    /// Resets the retry counter.
    fn report_probe_succeeded(&self, kind: SensorKind) -> bool;

    /// Probe returned an error.
    fn report_probe_failed(&self, kind: SensorKind) -> bool;

    /// Sentinel expiry. A sensor that never finished its first probe becomes
    /// `ProbeFailed`; one that had been connected becomes `Disconnected`.
    /// Returns the new status if a transition happened.
    fn report_bus_timeout(&self, kind: SensorKind) -> Option<SensorStatus>;

    /// First successful link establishment.
    fn report_link_up(&self) -> bool;
    fn report_link_lost(&self) -> bool;
    /// Initial link establishment exhausted its retries.
    fn report_link_shutdown(&self) -> bool;

    /// First successful cloud session.
    fn report_cloud_up(&self) -> bool;
    fn report_cloud_lost(&self) -> bool;
    /// Initial cloud connect exhausted its retries.
    fn report_cloud_shutdown(&self) -> bool;

    /// Move `RecoveryProgress` from `Idle` to `InProgress` and wake the
    /// supervisor. Only the caller that performed the move gets `true`;
    /// everyone else is a no-op.
    fn request_recovery(&self) -> bool;

    /// Unconditional wake; repeated wakes collapse into one.
    fn wake_supervisor(&self);
}

/// Arbitrary writes, reserved for the recovery supervisor.
pub trait Arbitrate: ReportFault {
    /// Set a sensor status. Illegal lifecycle moves are rejected.
    fn set_sensor(&self, kind: SensorKind, to: SensorStatus) -> bool;
    fn set_link(&self, to: LinkStatus) -> bool;
    fn set_cloud(&self, to: CloudStatus) -> bool;

    fn retries(&self, kind: SensorKind) -> u32;

    /// Count one reconnect attempt and return the new total.
    fn bump_retries(&self, kind: SensorKind) -> u32;

    /// End the current recovery episode.
    fn finish_recovery(&self);
}

/// Point-in-time copy of every status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub sensors: [SensorStatus; 3],
    pub link: LinkStatus,
    pub cloud: CloudStatus,
}

impl StatusSnapshot {
    pub fn sensor(&self, kind: SensorKind) -> SensorStatus {
        self.sensors[kind.index()]
    }
}

#[derive(Debug, Clone, Copy)]
struct SensorEntry {
    status: SensorStatus,
    retries: u32,
}

/// The shared status record.
pub struct StatusRegistry {
    sensors: Mutex<[SensorEntry; 3]>,
    link: watch::Sender<LinkStatus>,
    cloud: watch::Sender<CloudStatus>,
    recovery: Mutex<RecoveryProgress>,
    wake: Notify,
    changes: broadcast::Sender<StatusChange>,
}

impl std::fmt::Debug for StatusRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusRegistry")
            .field("snapshot", &self.snapshot())
            .field("recovery", &self.recovery_progress())
            .finish_non_exhaustive()
    }
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusRegistry {
    pub fn new() -> Self {
        let entry = SensorEntry {
            status: SensorStatus::NotProbed,
            retries: 0,
        };
        let (link, _) = watch::channel(LinkStatus::NotConnected);
        let (cloud, _) = watch::channel(CloudStatus::NotConnected);
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Self {
            sensors: Mutex::new([entry; 3]),
            link,
            cloud,
            recovery: Mutex::new(RecoveryProgress::Idle),
            wake: Notify::new(),
            changes,
        }
    }

    /// Subscribe to every accepted status write.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.changes.subscribe()
    }

    /// Block until some task wakes the supervisor. A wake issued while
    /// nobody was waiting is kept and consumed by the next call.
    pub async fn wait_for_work(&self) {
        self.wake.notified().await;
    }

    pub fn recovery_progress(&self) -> RecoveryProgress {
        *lock(&self.recovery)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let sensors = lock(&self.sensors);
        StatusSnapshot {
            sensors: [sensors[0].status, sensors[1].status, sensors[2].status],
            link: *self.link.borrow(),
            cloud: *self.cloud.borrow(),
        }
    }

    /// Move a sensor to `to` if its current status is in `from` (any status
    /// when `None`) and the lifecycle allows it.
    fn move_sensor(&self, kind: SensorKind, from: Option<&[SensorStatus]>, to: SensorStatus) -> bool {
        let mut sensors = lock(&self.sensors);
        let entry = &mut sensors[kind.index()];
        let prev = entry.status;

        if from.is_some_and(|allowed| !allowed.contains(&prev)) {
            return false;
        }
        if !prev.can_transition_to(to) {
            if from.is_none() {
                warn!("Rejected {} sensor transition {:?} -> {:?}", kind, prev, to);
            }
            return false;
        }

        entry.status = to;
        if to == SensorStatus::Connected {
            entry.retries = 0;
        }
        drop(sensors);

        info!("{} sensor: {:?} -> {:?}", kind, prev, to);
        let _ = self.changes.send(StatusChange::Sensor { kind, from: prev, to });
        true
    }

    fn move_link(&self, from: Option<LinkStatus>, to: LinkStatus) -> bool {
        let mut prev = to;
        let moved = self.link.send_if_modified(|current| {
            let legal = *current != to
                && *current != LinkStatus::Shutdown
                && from.map_or(true, |f| f == *current);
            if legal {
                prev = *current;
                *current = to;
            }
            legal
        });
        if moved {
            info!("link: {:?} -> {:?}", prev, to);
            let _ = self.changes.send(StatusChange::Link { from: prev, to });
        }
        moved
    }

    fn move_cloud(&self, from: Option<CloudStatus>, to: CloudStatus) -> bool {
        let mut prev = to;
        let moved = self.cloud.send_if_modified(|current| {
            let legal = *current != to
                && *current != CloudStatus::Shutdown
                && from.map_or(true, |f| f == *current);
            if legal {
                prev = *current;
                *current = to;
            }
            legal
        });
        if moved {
            info!("cloud: {:?} -> {:?}", prev, to);
            let _ = self.changes.send(StatusChange::Cloud { from: prev, to });
        }
        moved
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ReportFault for StatusRegistry {
    fn sensor(&self, kind: SensorKind) -> SensorStatus {
        lock(&self.sensors)[kind.index()].status
    }

    fn link(&self) -> LinkStatus {
        *self.link.borrow()
    }

    fn cloud(&self) -> CloudStatus {
        *self.cloud.borrow()
    }

    fn subscribe_link(&self) -> watch::Receiver<LinkStatus> {
        self.link.subscribe()
    }

    fn subscribe_cloud(&self) -> watch::Receiver<CloudStatus> {
        self.cloud.subscribe()
    }

    fn report_probe_succeeded(&self, kind: SensorKind) -> bool {
        use SensorStatus::*;
        if self.move_sensor(kind, Some(&[NotProbed]), Probed) {
            return self.move_sensor(kind, Some(&[Probed]), Connected);
        }
        self.move_sensor(kind, Some(&[Reconnected]), Connected)
    }

    fn report_probe_failed(&self, kind: SensorKind) -> bool {
        use SensorStatus::*;
        self.move_sensor(kind, Some(&[NotProbed, Probed, Reconnected]), ProbeFailed)
    }

    fn report_bus_timeout(&self, kind: SensorKind) -> Option<SensorStatus> {
        use SensorStatus::*;
        if self.move_sensor(kind, Some(&[NotProbed, Probed]), ProbeFailed) {
            return Some(ProbeFailed);
        }
        if self.move_sensor(kind, Some(&[Connected, Reconnected]), Disconnected) {
            return Some(Disconnected);
        }
        None
    }

    fn report_link_up(&self) -> bool {
        self.move_link(Some(LinkStatus::NotConnected), LinkStatus::Connected)
    }

    fn report_link_lost(&self) -> bool {
        self.move_link(Some(LinkStatus::Connected), LinkStatus::Disconnected)
    }

    fn report_link_shutdown(&self) -> bool {
        self.move_link(Some(LinkStatus::NotConnected), LinkStatus::Shutdown)
    }

    fn report_cloud_up(&self) -> bool {
        self.move_cloud(Some(CloudStatus::NotConnected), CloudStatus::Connected)
    }

    fn report_cloud_lost(&self) -> bool {
        self.move_cloud(Some(CloudStatus::Connected), CloudStatus::Disconnected)
    }

    fn report_cloud_shutdown(&self) -> bool {
        self.move_cloud(Some(CloudStatus::NotConnected), CloudStatus::Shutdown)
    }

    fn request_recovery(&self) -> bool {
        let mut progress = lock(&self.recovery);
        if *progress == RecoveryProgress::InProgress {
            debug!("Recovery already in progress, not waking supervisor");
            return false;
        }
        *progress = RecoveryProgress::InProgress;
        drop(progress);

        self.wake.notify_one();
        true
    }

    fn wake_supervisor(&self) {
        self.wake.notify_one();
    }
}

impl Arbitrate for StatusRegistry {
    fn set_sensor(&self, kind: SensorKind, to: SensorStatus) -> bool {
        self.move_sensor(kind, None, to)
    }

    fn set_link(&self, to: LinkStatus) -> bool {
        self.move_link(None, to)
    }

    fn set_cloud(&self, to: CloudStatus) -> bool {
        self.move_cloud(None, to)
    }

    fn retries(&self, kind: SensorKind) -> u32 {
        lock(&self.sensors)[kind.index()].retries
    }

    fn bump_retries(&self, kind: SensorKind) -> u32 {
        let mut sensors = lock(&self.sensors);
        let entry = &mut sensors[kind.index()];
        entry.retries = entry.retries.saturating_add(1);
        entry.retries
    }

    fn finish_recovery(&self) {
        *lock(&self.recovery) = RecoveryProgress::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_initial_state() {
        let registry = StatusRegistry::new();
        let snapshot = registry.snapshot();

        assert_eq!(snapshot.sensors, [SensorStatus::NotProbed; 3]);
        assert_eq!(snapshot.link, LinkStatus::NotConnected);
        assert_eq!(snapshot.cloud, CloudStatus::NotConnected);
        assert_eq!(registry.recovery_progress(), RecoveryProgress::Idle);
    }

    #[test]
    fn test_probe_success_walks_through_probed() {
        let registry = StatusRegistry::new();
        let mut changes = registry.subscribe();

        assert!(registry.report_probe_succeeded(SensorKind::Inertial));
        assert_eq!(registry.sensor(SensorKind::Inertial), SensorStatus::Connected);

        assert_eq!(
            changes.try_recv().unwrap(),
            StatusChange::Sensor {
                kind: SensorKind::Inertial,
                from: SensorStatus::NotProbed,
                to: SensorStatus::Probed,
            }
        );
        assert_eq!(
            changes.try_recv().unwrap(),
            StatusChange::Sensor {
                kind: SensorKind::Inertial,
                from: SensorStatus::Probed,
                to: SensorStatus::Connected,
            }
        );
    }

    #[test]
    fn test_probe_success_resets_retries() {
        let registry = StatusRegistry::new();
        let kind = SensorKind::Environmental;

        registry.report_probe_succeeded(kind);
        registry.report_bus_timeout(kind);
        assert_eq!(registry.bump_retries(kind), 1);
        assert!(registry.set_sensor(kind, SensorStatus::Reconnected));

        assert!(registry.report_probe_succeeded(kind));
        assert_eq!(registry.retries(kind), 0);
    }

    #[test]
    fn test_bus_timeout_before_first_probe_is_probe_failure() {
        let registry = StatusRegistry::new();
        assert_eq!(
            registry.report_bus_timeout(SensorKind::Positional),
            Some(SensorStatus::ProbeFailed)
        );
    }

    #[test]
    fn test_bus_timeout_after_connect_is_disconnect() {
        let registry = StatusRegistry::new();
        registry.report_probe_succeeded(SensorKind::Positional);

        assert_eq!(
            registry.report_bus_timeout(SensorKind::Positional),
            Some(SensorStatus::Disconnected)
        );
        // Already disconnected: nothing further to report
        assert_eq!(registry.report_bus_timeout(SensorKind::Positional), None);
    }

    #[test]
    fn test_tasks_cannot_write_recovery_values() {
        let registry = StatusRegistry::new();
        let kind = SensorKind::Inertial;
        registry.report_probe_succeeded(kind);

        // A connected sensor cannot be failed by a late probe report
        assert!(!registry.report_probe_failed(kind));
        assert_eq!(registry.sensor(kind), SensorStatus::Connected);
    }

    #[test]
    fn test_arbitrate_rejects_illegal_moves() {
        let registry = StatusRegistry::new();
        let kind = SensorKind::Environmental;
        registry.report_probe_succeeded(kind);

        assert!(!registry.set_sensor(kind, SensorStatus::ProbeFailed));
        assert!(registry.set_sensor(kind, SensorStatus::Disconnected));
        assert!(registry.set_sensor(kind, SensorStatus::ProbeFailed));
        assert!(registry.set_sensor(kind, SensorStatus::Shutdown));
        assert!(!registry.set_sensor(kind, SensorStatus::Reconnected));
        assert_eq!(registry.sensor(kind), SensorStatus::Shutdown);
    }

    #[test]
    fn test_link_shutdown_is_terminal() {
        let registry = StatusRegistry::new();
        assert!(registry.report_link_shutdown());
        assert!(!registry.set_link(LinkStatus::Connected));
        assert_eq!(registry.link(), LinkStatus::Shutdown);
    }

    #[test]
    fn test_link_lost_only_from_connected() {
        let registry = StatusRegistry::new();
        assert!(!registry.report_link_lost());
        assert!(registry.report_link_up());
        assert!(registry.report_link_lost());
        assert!(!registry.report_link_up());
        assert_eq!(registry.link(), LinkStatus::Disconnected);
    }

    #[test]
    fn test_cloud_watch_sees_updates() {
        let registry = StatusRegistry::new();
        let mut rx = registry.subscribe_cloud();

        registry.report_cloud_up();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), CloudStatus::Connected);
    }

    #[test]
    fn test_request_recovery_gate() {
        let registry = StatusRegistry::new();

        assert!(registry.request_recovery());
        assert!(!registry.request_recovery());
        assert_eq!(registry.recovery_progress(), RecoveryProgress::InProgress);

        registry.finish_recovery();
        assert_eq!(registry.recovery_progress(), RecoveryProgress::Idle);
        assert!(registry.request_recovery());
    }

    #[test]
    fn test_concurrent_recovery_requests_wake_once() {
        let registry = Arc::new(StatusRegistry::new());

        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let registry = Arc::clone(&registry);
                    scope.spawn(move || registry.request_recovery())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap() as usize)
                .sum()
        });

        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_wake_before_wait_is_not_lost() {
        let registry = StatusRegistry::new();
        registry.wake_supervisor();
        registry.wake_supervisor();

        tokio::time::timeout(Duration::from_secs(1), registry.wait_for_work())
            .await
            .expect("stored wake should be consumed");

        // Two wakes collapse into one
        let second = tokio::time::timeout(Duration::from_millis(10), registry.wait_for_work()).await;
        assert!(second.is_err());
    }

    #[test]
    fn test_wait_for_work_pending_until_woken() {
        let registry = StatusRegistry::new();
        let mut wait = tokio_test::task::spawn(registry.wait_for_work());

        tokio_test::assert_pending!(wait.poll());
        registry.request_recovery();
        assert!(wait.is_woken());
        tokio_test::assert_ready!(wait.poll());
    }
}
