//! # Supervisor Module
//!
//! The recovery supervisor: the only component that deletes or recreates
//! tasks, and the only writer of recovery values into the status registry.
//!
//! The supervisor sleeps until some task reports a fault, then makes one
//! pass over the status record in a fixed priority order:
//!
//! 1. Nothing probed yet and no link/cloud fault: startup, go back to sleep
//! 2. Every sensor shut down: terminal shutdown
//! 3. Each sensor in turn: retire failed probes, recreate disconnected tasks
//!    within the retry bound
//! 4. Link shut down: terminal
//! 5. Link disconnected: reconnect the link, then the cloud
//! 6. Cloud shut down: terminal
//! 7. Cloud disconnected: reconnect the cloud if the link is alive
//! 8. Nothing left: clear the recovery flag and sleep
//!
//! A sensor always leaves a pass as `Shutdown`, `ProbeFailed` or
//! `Reconnected`; never half-handled.

pub(crate) mod tasks;

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::display::{DisplayEvent, DisplaySink};
use crate::error::CloudError;
use crate::net::{Cloud, Link, RetryPolicy};
use crate::status::{
    Arbitrate, CloudStatus, LinkStatus, SensorKind, SensorStatus, StatusRegistry, StatusSnapshot,
};
use tasks::TaskSet;

/// Why the pipeline stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// Every sensor reached `Shutdown`
    AllSensorsDown,
    /// The link could not be (re)established
    LinkLost,
    /// The cloud session could not be (re)established
    CloudLost,
    /// Shutdown requested from outside, e.g. Ctrl+C
    External,
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ShutdownCause::AllSensorsDown => "all sensors down",
            ShutdownCause::LinkLost => "link lost",
            ShutdownCause::CloudLost => "cloud lost",
            ShutdownCause::External => "external request",
        };
        f.write_str(text)
    }
}

/// Final state handed back by [`RecoverySupervisor::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub cause: ShutdownCause,
    pub snapshot: StatusSnapshot,
}

/// Outcome of one pass.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    /// Re-evaluate immediately
    Continue,
    /// Sleep until woken
    Suspend,
    Terminate(ShutdownCause),
}

/// Bounded-retry policies the supervisor applies.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecoveryPolicy {
    pub(crate) sensor_max_retries: u32,
    pub(crate) link: RetryPolicy,
    pub(crate) cloud: RetryPolicy,
}

/// The recovery supervisor.
pub struct RecoverySupervisor {
    status: Arc<StatusRegistry>,
    tasks: TaskSet,
    link: Arc<Link>,
    cloud: Arc<Cloud>,
    display: Arc<dyn DisplaySink>,
    policy: RecoveryPolicy,
    shutdown: CancellationToken,
}

impl RecoverySupervisor {
    pub(crate) fn new(
        status: Arc<StatusRegistry>,
        tasks: TaskSet,
        link: Arc<Link>,
        cloud: Arc<Cloud>,
        display: Arc<dyn DisplaySink>,
        policy: RecoveryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            status,
            tasks,
            link,
            cloud,
            display,
            policy,
            shutdown,
        }
    }

    /// Supervise until a terminal condition, then tear the pipeline down.
    pub async fn run(mut self) -> ShutdownReport {
        info!("Recovery supervisor started");

        let cause = loop {
            if self.shutdown.is_cancelled() {
                break ShutdownCause::External;
            }
            match self.step().await {
                Step::Continue => {}
                Step::Terminate(cause) => break cause,
                Step::Suspend => {
                    if self.has_pending_work() {
                        debug!("Faults still pending, skipping suspend");
                        continue;
                    }
                    debug!("Supervisor suspended");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break ShutdownCause::External,
                        _ = self.status.wait_for_work() => debug!("Supervisor woken"),
                    }
                }
            }
        };

        self.shut_down(cause).await
    }

    /// One pass over the status record.
    async fn step(&mut self) -> Step {
        let snapshot = self.status.snapshot();

        // 1. Startup quiescence
        let untouched = snapshot.sensors.iter().all(|s| *s == SensorStatus::NotProbed);
        if untouched && !snapshot.link.is_faulted() && !snapshot.cloud.is_faulted() {
            return Step::Suspend;
        }

        // 2. Nothing left to sample
        if snapshot.sensors.iter().all(|s| *s == SensorStatus::Shutdown) {
            error!("All sensors are shut down");
            return Step::Terminate(ShutdownCause::AllSensorsDown);
        }

        // 3. Sensors, in priority order
        for kind in SensorKind::ALL {
            match snapshot.sensor(kind) {
                SensorStatus::ProbeFailed => return self.retire_sensor(kind).await,
                SensorStatus::Disconnected => return self.recover_sensor(kind).await,
                _ => {}
            }
        }

        // 4-5. Link
        match snapshot.link {
            LinkStatus::Shutdown => {
                error!("Link is shut down");
                self.tasks.stop_delivery().await;
                return Step::Terminate(ShutdownCause::LinkLost);
            }
            LinkStatus::Disconnected => return self.recover_link().await,
            _ => {}
        }

        // 6-7. Cloud
        match snapshot.cloud {
            CloudStatus::Shutdown => {
                error!("Cloud is shut down");
                self.tasks.stop_delivery().await;
                return Step::Terminate(ShutdownCause::CloudLost);
            }
            CloudStatus::Disconnected => return self.recover_cloud().await,
            _ => {}
        }

        // 8. All clear
        self.status.finish_recovery();
        Step::Suspend
    }

    /// Whether anything still needs a pass.
    fn has_pending_work(&self) -> bool {
        let snapshot = self.status.snapshot();
        snapshot.sensors.iter().any(|s| s.needs_recovery())
            || snapshot.link.is_faulted()
            || snapshot.cloud.is_faulted()
    }

    async fn retire_sensor(&mut self, kind: SensorKind) -> Step {
        match self.tasks.stop_capture(kind).await {
            Ok(driver) => self.tasks.park(driver),
            Err(e) => warn!("{}", e),
        }
        self.status.set_sensor(kind, SensorStatus::Shutdown);
        self.display.notify(DisplayEvent::SensorNotConnected(kind));
        warn!("{} sensor retired", kind);
        Step::Continue
    }

    async fn recover_sensor(&mut self, kind: SensorKind) -> Step {
        let driver = match self.tasks.stop_capture(kind).await {
            Ok(driver) => driver,
            Err(e) => {
                error!("{} capture task cannot be recreated: {}", kind, e);
                self.status.set_sensor(kind, SensorStatus::Shutdown);
                self.display.notify(DisplayEvent::SensorNotConnected(kind));
                return Step::Suspend;
            }
        };

        let attempt = self.status.bump_retries(kind);
        if attempt >= self.policy.sensor_max_retries {
            warn!("{} sensor gave up after {} reconnect attempts", kind, attempt);
            self.tasks.park(driver);
            self.status.set_sensor(kind, SensorStatus::ProbeFailed);
            return Step::Continue;
        }

        info!(
            "{} sensor reconnect attempt {}/{}",
            kind, attempt, self.policy.sensor_max_retries
        );
        self.display.notify(DisplayEvent::SensorReconnecting(kind));
        self.status.set_sensor(kind, SensorStatus::Reconnected);
        self.tasks.spawn_capture(driver);
        Step::Suspend
    }

    async fn recover_link(&mut self) -> Step {
        // The session cannot survive the link
        self.status.set_cloud(CloudStatus::Disconnected);

        let reconnected = tokio::select! {
            _ = self.shutdown.cancelled() => return Step::Terminate(ShutdownCause::External),
            result = self.link.reconnect(self.policy.link, self.display.as_ref()) => result,
        };
        if let Err(e) = reconnected {
            error!("Link recovery failed: {}", e);
            self.status.set_link(LinkStatus::Shutdown);
            return Step::Terminate(ShutdownCause::LinkLost);
        }
        self.status.set_link(LinkStatus::Connected);
        self.display.notify(DisplayEvent::LinkConnected);
        info!("Link recovered");

        let reconnected = tokio::select! {
            _ = self.shutdown.cancelled() => return Step::Terminate(ShutdownCause::External),
            result = self.cloud.reconnect(&self.link, self.policy.cloud, self.display.as_ref()) => result,
        };
        match reconnected {
            Ok(()) => {
                self.status.set_cloud(CloudStatus::Connected);
                self.display.notify(DisplayEvent::CloudConnected);
                self.status.finish_recovery();
                info!("Cloud recovered after link recovery");
                Step::Suspend
            }
            Err(e) => {
                error!("Cloud recovery failed: {}", e);
                self.status.set_cloud(CloudStatus::Shutdown);
                Step::Terminate(ShutdownCause::CloudLost)
            }
        }
    }

    async fn recover_cloud(&mut self) -> Step {
        if let Err(e) = self.link.liveness().await {
            warn!("Link is down, recovering it first: {}", e);
            self.status.set_link(LinkStatus::Disconnected);
            return Step::Continue;
        }

        let reconnected = tokio::select! {
            _ = self.shutdown.cancelled() => return Step::Terminate(ShutdownCause::External),
            result = self.cloud.reconnect(&self.link, self.policy.cloud, self.display.as_ref()) => result,
        };
        match reconnected {
            Ok(()) => {
                self.status.set_cloud(CloudStatus::Connected);
                self.display.notify(DisplayEvent::CloudConnected);
                self.status.finish_recovery();
                info!("Cloud recovered");
                Step::Suspend
            }
            Err(CloudError::Link(e)) => {
                error!("Link died during cloud recovery: {}", e);
                self.status.set_link(LinkStatus::Shutdown);
                Step::Terminate(ShutdownCause::LinkLost)
            }
            Err(e) => {
                error!("Cloud recovery failed: {}", e);
                self.status.set_cloud(CloudStatus::Shutdown);
                Step::Terminate(ShutdownCause::CloudLost)
            }
        }
    }

    async fn shut_down(mut self, cause: ShutdownCause) -> ShutdownReport {
        warn!("Pipeline shutting down: {}", cause);
        self.display.notify(DisplayEvent::Shutdown(cause));

        self.cloud.disconnect().await;
        self.link.down().await;

        let drivers = self.tasks.stop_pipeline().await;
        for mut driver in drivers {
            debug!("De-initializing {} sensor", driver.kind());
            driver.deinit().await;
        }
        self.tasks.stop_display().await;

        let snapshot = self.status.snapshot();
        info!("Pipeline stopped: {:?}", snapshot);
        ShutdownReport { cause, snapshot }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::display::mocks::RecordingSink;
    use crate::error::{CloudError, LinkError, ProbeError, ReadError};
    use crate::net::cloud::mocks::MockCloud;
    use crate::net::link::mocks::MockLink;
    use crate::pipeline::testing::{collaborators, start_with_display};
    use crate::sensor::mocks::{MockSensor, Step as SensorStep};
    use crate::status::{ReportFault, StatusChange};
    use std::time::Duration;

    fn sensors() -> [MockSensor; 3] {
        SensorKind::ALL.map(MockSensor::new)
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.retry.link_retry_delay_ms = 1000;
        config.retry.cloud_retry_delay_ms = 1000;
        config
    }

    async fn run_to_end(pipeline: crate::pipeline::Pipeline, limit: Duration) -> ShutdownReport {
        tokio::time::timeout(limit, pipeline.run())
            .await
            .expect("pipeline should shut down")
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_sensors_failing_shuts_down_once() {
        let sensors = sensors();
        for sensor in &sensors {
            sensor.set_probe_default(SensorStep::Return(Err(ProbeError::NoResponse)));
        }
        let display = RecordingSink::new();
        let pipeline = start_with_display(
            &config(),
            collaborators(&sensors, &MockLink::new(), &MockCloud::new()),
            display.clone(),
        )
        .unwrap();

        let report = run_to_end(pipeline, Duration::from_secs(60)).await;

        assert_eq!(report.cause, ShutdownCause::AllSensorsDown);
        assert!(report.snapshot.sensors.iter().all(|s| *s == SensorStatus::Shutdown));
        let shutdowns = display
            .events()
            .into_iter()
            .filter(|e| matches!(e, DisplayEvent::Shutdown(_)))
            .count();
        assert_eq!(shutdowns, 1);
        for sensor in &sensors {
            assert_eq!(sensor.count("probe"), 1);
            assert_eq!(sensor.count("deinit"), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_retry_bound() {
        let sensors = sensors();
        let inertial = &sensors[SensorKind::Inertial.index()];
        // First probe succeeds, every later transaction hangs
        inertial.script_probe(SensorStep::Return(Ok(())));
        inertial.set_probe_default(SensorStep::Hang);
        inertial.set_read_default(SensorStep::Hang);

        let display = RecordingSink::new();
        let pipeline = start_with_display(
            &config(),
            collaborators(&sensors, &MockLink::new(), &MockCloud::new()),
            display.clone(),
        )
        .unwrap();
        let status = pipeline.status();
        let stop = pipeline.shutdown_handle();
        let handle = tokio::spawn(pipeline.run());

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(status.sensor(SensorKind::Inertial), SensorStatus::Shutdown);
        // Initial probe plus two re-probes; the third reconnect hits the bound
        assert_eq!(inertial.count("probe"), 3);
        let reconnecting = display
            .events()
            .into_iter()
            .filter(|e| *e == DisplayEvent::SensorReconnecting(SensorKind::Inertial))
            .count();
        assert_eq!(reconnecting, 2);
        assert!(display
            .events()
            .contains(&DisplayEvent::SensorNotConnected(SensorKind::Inertial)));
        // The other sensors keep running
        assert_eq!(status.sensor(SensorKind::Environmental), SensorStatus::Connected);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(inertial.count("probe"), 3);

        stop.cancel();
        let report = handle.await.unwrap();
        assert_eq!(report.cause, ShutdownCause::External);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_recovers_and_resets_retries() {
        let sensors = sensors();
        let environmental = &sensors[SensorKind::Environmental.index()];
        environmental.set_read_default(SensorStep::Hang);

        let pipeline = start_with_display(
            &config(),
            collaborators(&sensors, &MockLink::new(), &MockCloud::new()),
            RecordingSink::new(),
        )
        .unwrap();
        let status = pipeline.status();
        let stop = pipeline.shutdown_handle();
        let handle = tokio::spawn(pipeline.run());

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(status.sensor(SensorKind::Environmental), SensorStatus::Reconnected);
        assert_eq!(status.retries(SensorKind::Environmental), 1);

        environmental.set_read_default(SensorStep::Return(Ok(())));
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(status.sensor(SensorKind::Environmental), SensorStatus::Connected);
        assert_eq!(status.retries(SensorKind::Environmental), 0);
        assert_eq!(environmental.count("probe"), 2);

        stop.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_failure_at_startup_is_terminal() {
        let link = MockLink::new();
        link.set_up_default(Err(LinkError::Association("no ap".into())));
        let sensors = sensors();
        let pipeline = start_with_display(
            &config(),
            collaborators(&sensors, &link, &MockCloud::new()),
            RecordingSink::new(),
        )
        .unwrap();

        let report = run_to_end(pipeline, Duration::from_secs(60)).await;

        assert_eq!(report.cause, ShutdownCause::LinkLost);
        assert_eq!(report.snapshot.link, LinkStatus::Shutdown);
        // Gated sensors never sampled
        assert_eq!(sensors[0].count("read"), 0);
        assert_eq!(link.count("down"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cloud_failure_at_startup_is_terminal() {
        let cloud = MockCloud::new();
        cloud.set_connect_default(Err(CloudError::Connect("refused".into())));
        let sensors = sensors();
        let pipeline = start_with_display(
            &config(),
            collaborators(&sensors, &MockLink::new(), &cloud),
            RecordingSink::new(),
        )
        .unwrap();

        let report = run_to_end(pipeline, Duration::from_secs(120)).await;

        assert_eq!(report.cause, ShutdownCause::CloudLost);
        assert_eq!(report.snapshot.cloud, CloudStatus::Shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_recovered_before_cloud() {
        let link = MockLink::new();
        let cloud = MockCloud::new();
        let sensors = sensors();
        let pipeline = start_with_display(
            &config(),
            collaborators(&sensors, &link, &cloud),
            RecordingSink::new(),
        )
        .unwrap();
        let status = pipeline.status();
        let stop = pipeline.shutdown_handle();
        let handle = tokio::spawn(pipeline.run());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(status.cloud(), CloudStatus::Connected);

        // Delivery's pre-publish probe fails, then the supervisor's own probe
        link.fail_liveness(2);
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(status.link(), LinkStatus::Connected);
        assert_eq!(status.cloud(), CloudStatus::Connected);

        let link_calls = link.calls();
        let up_again = link_calls.iter().rposition(|c| *c == "up").unwrap();
        assert!(link_calls[..up_again].contains(&"down"));
        // The cloud reconnect happened after the link came back: two connects total
        assert_eq!(cloud.count("connect"), 2);
        assert!(cloud.count("disconnect") >= 1);

        stop.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failure_reconnects_cloud() {
        let cloud = MockCloud::new();
        let sensors = sensors();
        let pipeline = start_with_display(
            &config(),
            collaborators(&sensors, &MockLink::new(), &cloud),
            RecordingSink::new(),
        )
        .unwrap();
        let status = pipeline.status();
        let stop = pipeline.shutdown_handle();
        let handle = tokio::spawn(pipeline.run());

        tokio::time::sleep(Duration::from_secs(2)).await;
        cloud.set_publish_error(Some(CloudError::Publish("broker gone".into())));
        tokio::time::sleep(Duration::from_secs(2)).await;
        cloud.set_publish_error(None);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(status.cloud(), CloudStatus::Connected);
        assert!(cloud.count("connect") >= 2);
        assert!(!cloud.published().is_empty());

        stop.cancel();
        let report = handle.await.unwrap();
        assert_eq!(report.cause, ShutdownCause::External);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_shutdown_tears_down_everything() {
        let link = MockLink::new();
        let cloud = MockCloud::new();
        let sensors = sensors();
        let display = RecordingSink::new();
        let pipeline = start_with_display(
            &config(),
            collaborators(&sensors, &link, &cloud),
            display.clone(),
        )
        .unwrap();
        let stop = pipeline.shutdown_handle();
        let handle = tokio::spawn(pipeline.run());

        tokio::time::sleep(Duration::from_secs(3)).await;
        stop.cancel();
        let report = handle.await.unwrap();

        assert_eq!(report.cause, ShutdownCause::External);
        assert_eq!(display.events().last(), Some(&DisplayEvent::Shutdown(ShutdownCause::External)));
        assert_eq!(link.count("down"), 1);
        assert_eq!(cloud.count("disconnect"), 1);
        for sensor in &sensors {
            assert_eq!(sensor.count("deinit"), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_reads_never_escalate() {
        let sensors = sensors();
        sensors[SensorKind::Inertial.index()]
            .set_read_default(SensorStep::Return(Err(ReadError::Bus("nack".into()))));
        let pipeline = start_with_display(
            &config(),
            collaborators(&sensors, &MockLink::new(), &MockCloud::new()),
            RecordingSink::new(),
        )
        .unwrap();
        let status = pipeline.status();
        let stop = pipeline.shutdown_handle();
        let handle = tokio::spawn(pipeline.run());

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(status.sensor(SensorKind::Inertial), SensorStatus::Connected);
        assert_eq!(status.retries(SensorKind::Inertial), 0);

        stop.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_staggered_sensor_failures_shut_down_once() {
        let sensors = sensors();
        let environmental = &sensors[SensorKind::Environmental.index()];
        let inertial = &sensors[SensorKind::Inertial.index()];
        let positional = &sensors[SensorKind::Positional.index()];
        // Hangs after its first probe and never answers a re-probe
        environmental.script_probe(SensorStep::Return(Ok(())));
        environmental.set_probe_default(SensorStep::Hang);
        environmental.set_read_default(SensorStep::Hang);
        // Fails its very first probe
        inertial.set_probe_default(SensorStep::Return(Err(ProbeError::NoResponse)));

        let display = RecordingSink::new();
        let pipeline = start_with_display(
            &config(),
            collaborators(&sensors, &MockLink::new(), &MockCloud::new()),
            display.clone(),
        )
        .unwrap();
        let status = pipeline.status();
        let mut changes = status.subscribe();
        let handle = tokio::spawn(pipeline.run());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(status.sensor(SensorKind::Inertial), SensorStatus::Shutdown);
        assert_eq!(status.sensor(SensorKind::Environmental), SensorStatus::Shutdown);
        assert_eq!(status.sensor(SensorKind::Positional), SensorStatus::Connected);
        assert!(!handle.is_finished());

        // The last sensor hangs on its next fix query, then fails its re-probe
        positional.set_fix_default(SensorStep::Hang);
        positional.set_probe_default(SensorStep::Return(Err(ProbeError::NoResponse)));

        let report = tokio::time::timeout(Duration::from_secs(90), handle)
            .await
            .expect("pipeline should shut down")
            .unwrap();

        assert_eq!(report.cause, ShutdownCause::AllSensorsDown);
        assert_eq!(environmental.count("probe"), 3);
        assert_eq!(inertial.count("probe"), 1);
        assert_eq!(positional.count("probe"), 2);

        let mut retired = Vec::new();
        while let Ok(change) = changes.try_recv() {
            if let StatusChange::Sensor { kind, to: SensorStatus::Shutdown, .. } = change {
                retired.push(kind);
            }
        }
        assert_eq!(
            retired,
            vec![SensorKind::Inertial, SensorKind::Environmental, SensorKind::Positional]
        );

        let events = display.events();
        let shutdowns: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, DisplayEvent::Shutdown(_)))
            .collect();
        assert_eq!(shutdowns, vec![&DisplayEvent::Shutdown(ShutdownCause::AllSensorsDown)]);
        for kind in SensorKind::ALL {
            let not_connected = events
                .iter()
                .filter(|e| **e == DisplayEvent::SensorNotConnected(kind))
                .count();
            assert_eq!(not_connected, 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cloud_recovered_during_session_setup_keeps_delivering() {
        let mut config = Config::default();
        config.retry.cloud_max_retries = 3;
        config.retry.cloud_retry_delay_ms = 32_500;
        let link = MockLink::new();
        let cloud = MockCloud::new();
        // Delivery's setup fails three times; the supervisor's attempt
        // succeeds; a further client connect would fail
        cloud.fail_connect(3);
        cloud.connect_script.lock().unwrap().push_back(Ok(()));
        cloud.fail_connect(1);

        let sensors = sensors();
        let pipeline = start_with_display(
            &config,
            collaborators(&sensors, &link, &cloud),
            RecordingSink::new(),
        )
        .unwrap();
        let status = pipeline.status();
        let stop = pipeline.shutdown_handle();
        let handle = tokio::spawn(pipeline.run());

        // The link-status report at 60s finds the link gone while delivery
        // is still between setup attempts
        tokio::time::sleep(Duration::from_secs(59)).await;
        link.fail_liveness(1);
        tokio::time::sleep(Duration::from_secs(240)).await;

        assert_eq!(status.link(), LinkStatus::Connected);
        assert_eq!(status.cloud(), CloudStatus::Connected);
        assert_eq!(cloud.count("connect"), 4);
        assert_eq!(cloud.count("disconnect"), 0);
        assert!(!cloud.published().is_empty());
        assert!(!handle.is_finished());

        stop.cancel();
        let report = handle.await.unwrap();
        assert_eq!(report.cause, ShutdownCause::External);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_shutdown_interrupts_link_recovery() {
        let link = MockLink::new();
        let sensors = sensors();
        let pipeline = start_with_display(
            &Config::default(),
            collaborators(&sensors, &link, &MockCloud::new()),
            RecordingSink::new(),
        )
        .unwrap();
        let status = pipeline.status();
        let stop = pipeline.shutdown_handle();
        let handle = tokio::spawn(pipeline.run());

        tokio::time::sleep(Duration::from_secs(2)).await;
        link.set_liveness_default(Err(LinkError::NoSignal));
        link.set_up_default(Err(LinkError::Association("ap gone".into())));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(status.link(), LinkStatus::Disconnected);
        assert!(link.count("down") >= 1);

        stop.cancel();
        let report = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("shutdown should not wait out the link retries")
            .unwrap();

        assert_eq!(report.cause, ShutdownCause::External);
        assert_eq!(report.snapshot.link, LinkStatus::Disconnected);
    }
}
