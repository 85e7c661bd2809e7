//! Capture task, one instance per sensor kind.
//!
//! A run goes through three phases:
//!
//! 1. **Probe**, only when the sensor is `NotProbed` or `Reconnected`. A
//!    reconnected sensor first waits the re-probe delay.
//! 2. **Gate**: park until the link has come up once.
//! 3. **Sample loop**: read over the shared bus, timestamp, push into the
//!    reading queue, sleep the jitter-compensated remainder of the interval.
//!
//! Whenever the sensor leaves `Connected` (probe failure, sentinel expiry)
//! the task stops touching the bus and idles until the supervisor cancels it.
//! The driver is handed back through the join handle so a recreated task can
//! reuse it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{gnss, SensorDriver};
use crate::bus::SharedBus;
use crate::clock::Clock;
use crate::config::Config;
use crate::display::{DisplayEvent, DisplaySink};
use crate::error::ReadError;
use crate::net::{LinkGate, RetryPolicy};
use crate::pipeline::cadence::next_delay;
use crate::pipeline::{DropOldestQueue, Reading};
use crate::status::{ReportFault, SensorKind, SensorStatus};

/// Timing knobs of the capture loops.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub intervals: [Duration; 3],
    pub reprobe_delay: Duration,
    pub gnss_fix: RetryPolicy,
    pub gnss_data: RetryPolicy,
}

impl CaptureSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            intervals: SensorKind::ALL.map(|kind| config.sampling.interval(kind)),
            reprobe_delay: config.retry.sensor_retry_delay(),
            gnss_fix: config.retry.gnss_fix_policy(),
            gnss_data: config.retry.gnss_data_policy(),
        }
    }

    pub fn interval(&self, kind: SensorKind) -> Duration {
        self.intervals[kind.index()]
    }
}

/// Everything a capture task shares with the rest of the pipeline.
#[derive(Clone)]
pub struct CaptureContext {
    pub status: Arc<dyn ReportFault>,
    pub bus: Arc<SharedBus>,
    pub clock: Arc<dyn Clock>,
    pub readings: Arc<DropOldestQueue<Reading>>,
    pub display: Arc<dyn DisplaySink>,
    pub gate: LinkGate,
    pub settings: CaptureSettings,
}

/// Spawn a capture task for `driver`.
///
/// The task runs until `token` is cancelled and then yields the driver back.
pub fn spawn_capture(
    driver: Box<dyn SensorDriver>,
    ctx: CaptureContext,
    token: CancellationToken,
) -> JoinHandle<Box<dyn SensorDriver>> {
    tokio::spawn(run(driver, ctx, token))
}

async fn run(
    mut driver: Box<dyn SensorDriver>,
    mut ctx: CaptureContext,
    token: CancellationToken,
) -> Box<dyn SensorDriver> {
    let kind = driver.kind();
    let idle = tokio::select! {
        _ = token.cancelled() => false,
        _ = capture(driver.as_mut(), &mut ctx) => true,
    };
    if idle {
        debug!("{} capture idle until recreated", kind);
        token.cancelled().await;
    }
    debug!("{} capture task stopped", kind);
    driver
}

async fn capture(driver: &mut dyn SensorDriver, ctx: &mut CaptureContext) {
    let kind = driver.kind();

    match ctx.status.sensor(kind) {
        SensorStatus::NotProbed => {
            if !probe(driver, ctx).await {
                return;
            }
        }
        SensorStatus::Reconnected => {
            debug!("{} sensor re-probe in {:?}", kind, ctx.settings.reprobe_delay);
            sleep(ctx.settings.reprobe_delay).await;
            if !probe(driver, ctx).await {
                return;
            }
        }
        SensorStatus::Connected => {}
        other => {
            debug!("{} capture has nothing to do while {:?}", kind, other);
            return;
        }
    }

    if !ctx.gate.is_open() {
        debug!("{} capture waiting for link", kind);
    }
    if !ctx.gate.wait_open().await {
        return;
    }

    sample_loop(driver, ctx).await;
}

/// Probe the device; `true` if the sensor ends up connected.
async fn probe(driver: &mut dyn SensorDriver, ctx: &CaptureContext) -> bool {
    let kind = driver.kind();

    match ctx.bus.transact(kind, driver.probe()).await {
        Ok(Ok(())) => {
            if ctx.status.report_probe_succeeded(kind) {
                info!("{} sensor connected", kind);
                ctx.display.notify(DisplayEvent::SensorConnected(kind));
            }
            ctx.status.sensor(kind) == SensorStatus::Connected
        }
        Ok(Err(e)) => {
            warn!("{} sensor probe failed: {}", kind, e);
            if ctx.status.report_probe_failed(kind) {
                ctx.status.wake_supervisor();
            }
            false
        }
        Err(timeout) => {
            warn!("{} sensor probe: {}", kind, timeout);
            false
        }
    }
}

async fn sample_loop(driver: &mut dyn SensorDriver, ctx: &CaptureContext) {
    let kind = driver.kind();
    let interval = ctx.settings.interval(kind);

    loop {
        let started = Instant::now();
        if ctx.status.sensor(kind) != SensorStatus::Connected {
            debug!("{} sensor no longer connected, sampling stopped", kind);
            return;
        }

        let mut reading = Reading::empty(kind);
        let outcome = match kind {
            SensorKind::Positional => {
                gnss::sample_position(
                    driver,
                    &ctx.bus,
                    ctx.settings.gnss_fix,
                    ctx.settings.gnss_data,
                    &mut reading,
                )
                .await
            }
            _ => ctx
                .bus
                .transact(kind, driver.read(&mut reading))
                .await
                .map_err(ReadError::from)
                .and_then(|read| read),
        };

        match outcome {
            Ok(()) => reading.set_available(true),
            Err(e) => {
                debug!("{} read failed, forwarding unavailable reading: {}", kind, e);
                reading.set_available(false);
            }
        }

        match ctx.clock.now() {
            Ok(at) => {
                reading.set_timestamp(at);
                if ctx.readings.push(reading).is_some() {
                    debug!("Reading queue full, dropped oldest reading");
                }
            }
            Err(e) => warn!("{} reading discarded: {}", kind, e),
        }

        sleep(next_delay(interval, started.elapsed())).await;
    }
}
