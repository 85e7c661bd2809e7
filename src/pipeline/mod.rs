//! # Pipeline Module
//!
//! Capture → serialize → deliver, plus the assembly that wires every task,
//! queue and collaborator together.
//!
//! ```text
//!  capture ×3 ──► [reading queue] ──► serializer ──► [outbound queue] ──► delivery ──► cloud
//!                                                          ▲
//!                                        connectivity ─────┘ (keep-alive, link status)
//! ```
//!
//! Both queues are bounded and drop their oldest entry when full, so a slow
//! consumer never blocks a producer.

pub mod cadence;
pub mod packet;
pub mod queue;
pub mod reading;
mod serializer;

pub use packet::Packet;
pub use queue::DropOldestQueue;
pub use reading::Reading;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bus::SharedBus;
use crate::clock::Clock;
use crate::codec::{KeepAliveIntervals, PacketEncoder};
use crate::config::Config;
use crate::display::{DisplayEvent, DisplaySink, DisplayTask, StatusLine};
use crate::error::{Result, TelemetryError};
use crate::net::{link_gate, Cloud, CloudClient, ConnectivityTask, DeliveryTask, Link, LinkDriver};
use crate::sensor::{CaptureContext, CaptureSettings, SensorDriver};
use crate::status::{SensorKind, StatusRegistry};
use crate::supervisor::tasks::{TaskSet, Worker};
use crate::supervisor::{RecoveryPolicy, RecoverySupervisor, ShutdownReport};
use serializer::SerializerTask;

/// External collaborators the pipeline drives.
pub struct Collaborators {
    /// Exactly one driver per sensor kind, in any order
    pub sensors: Vec<Box<dyn SensorDriver>>,
    pub link: Box<dyn LinkDriver>,
    pub cloud: Box<dyn CloudClient>,
    pub encoder: Arc<dyn PacketEncoder>,
    pub clock: Arc<dyn Clock>,
}

/// A running pipeline.
pub struct Pipeline {
    status: Arc<StatusRegistry>,
    shutdown: CancellationToken,
    supervisor: RecoverySupervisor,
}

impl Pipeline {
    /// Create every queue and task.
    ///
    /// Everything is checked before the first task is spawned, so an error
    /// leaves nothing behind. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`TelemetryError::Config`] if `config` is out of range
    /// - [`TelemetryError::Task`] if a sensor kind has no driver or two
    pub fn start(config: &Config, collaborators: Collaborators) -> Result<Self> {
        Self::assemble(config, collaborators, None)
    }

    pub(crate) fn assemble(
        config: &Config,
        collaborators: Collaborators,
        display: Option<Arc<dyn DisplaySink>>,
    ) -> Result<Self> {
        config.validate()?;
        let Collaborators {
            sensors,
            link,
            cloud,
            encoder,
            clock,
        } = collaborators;
        let drivers = one_per_kind(sensors)?;

        let root = CancellationToken::new();
        let status = Arc::new(StatusRegistry::new());

        // Display comes up first so the startup line is not lost
        let (display, display_worker) = match display {
            Some(sink) => (sink, None),
            None => {
                let queue = Arc::new(DropOldestQueue::new(config.queues.display_capacity));
                let task = DisplayTask::new(queue.clone());
                let worker = Worker::spawn("display", &root, |token| task.run(token));
                let sink: Arc<dyn DisplaySink> = Arc::new(StatusLine::new(queue));
                (sink, Some(worker))
            }
        };
        display.notify(DisplayEvent::AppStarted);
        info!("Starting telemetry pipeline for device {}", config.device.id);

        let readings = Arc::new(DropOldestQueue::new(config.queues.reading_capacity));
        let outbound = Arc::new(DropOldestQueue::new(config.queues.outbound_capacity));
        let link = Arc::new(Link::new(link));
        let cloud = Arc::new(Cloud::new(cloud));
        let (opener, gate) = link_gate();

        let ctx = CaptureContext {
            status: status.clone(),
            bus: Arc::new(SharedBus::new(config.bus.transaction_timeout(), status.clone())),
            clock: clock.clone(),
            readings: readings.clone(),
            display: display.clone(),
            gate,
            settings: CaptureSettings::from_config(config),
        };

        let mut tasks = TaskSet::new(root.clone(), ctx);
        if let Some(worker) = display_worker {
            tasks.set_display(worker);
        }
        for driver in drivers {
            tasks.spawn_capture(driver);
        }

        let serializer = SerializerTask {
            readings,
            outbound: outbound.clone(),
            encoder: encoder.clone(),
        };
        tasks.add_worker(Worker::spawn("serializer", &root, |token| serializer.run(token)));

        let connectivity = ConnectivityTask {
            link: link.clone(),
            status: status.clone(),
            gate: opener,
            outbound: outbound.clone(),
            encoder: encoder.clone(),
            clock: clock.clone(),
            display: display.clone(),
            policy: config.retry.link_policy(),
            keep_alive_every: config.sampling.keep_alive_interval(),
            link_status_every: config.sampling.link_status_interval(),
            intervals: KeepAliveIntervals::from(&config.sampling),
        };
        tasks.add_worker(Worker::spawn("connectivity", &root, |token| connectivity.run(token)));

        let delivery = DeliveryTask {
            link: link.clone(),
            cloud: cloud.clone(),
            status: status.clone(),
            outbound,
            encoder,
            clock,
            display: display.clone(),
            policy: config.retry.cloud_policy(),
        };
        tasks.set_delivery(Worker::spawn("delivery", &root, |token| delivery.run(token)));

        let shutdown = CancellationToken::new();
        let policy = RecoveryPolicy {
            sensor_max_retries: config.retry.sensor_max_retries,
            link: config.retry.link_policy(),
            cloud: config.retry.cloud_policy(),
        };
        let supervisor = RecoverySupervisor::new(
            status.clone(),
            tasks,
            link,
            cloud,
            display,
            policy,
            shutdown.clone(),
        );

        Ok(Self {
            status,
            shutdown,
            supervisor,
        })
    }

    /// Shared status record, for observers.
    pub fn status(&self) -> Arc<StatusRegistry> {
        self.status.clone()
    }

    /// Cancelling this token shuts the pipeline down through the same path
    /// as a terminal fault.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the supervisor until the pipeline shuts down.
    pub async fn run(self) -> ShutdownReport {
        self.supervisor.run().await
    }
}

fn one_per_kind(sensors: Vec<Box<dyn SensorDriver>>) -> Result<[Box<dyn SensorDriver>; 3]> {
    let mut slots: [Option<Box<dyn SensorDriver>>; 3] = [None, None, None];
    for driver in sensors {
        let kind = driver.kind();
        if slots[kind.index()].replace(driver).is_some() {
            return Err(TelemetryError::Task(format!("more than one {} sensor driver", kind)));
        }
    }

    if let Some(kind) = SensorKind::ALL.into_iter().find(|kind| slots[kind.index()].is_none()) {
        return Err(TelemetryError::Task(format!("no {} sensor driver", kind)));
    }
    match slots {
        [Some(environmental), Some(inertial), Some(positional)] => Ok([environmental, inertial, positional]),
        _ => Err(TelemetryError::Task("incomplete sensor set".to_string())),
    }
}
