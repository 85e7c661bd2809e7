//! Handles to every pipeline task, owned by the supervisor.
//!
//! Capture tasks are the only ones the supervisor recreates. Each runs under
//! its own child token so it can be stopped without touching its siblings;
//! stopping one hands its driver back.

use std::mem;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, TelemetryError};
use crate::sensor::{self, CaptureContext, SensorDriver};
use crate::status::SensorKind;

enum CaptureSlot {
    Running {
        handle: JoinHandle<Box<dyn SensorDriver>>,
        token: CancellationToken,
    },
    /// Task deleted; the driver stays around for the final de-init
    Parked(Box<dyn SensorDriver>),
    Empty,
}

/// A long-lived task that is only ever stopped, never recreated.
pub(crate) struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
    token: CancellationToken,
}

impl Worker {
    pub(crate) fn spawn<F, Fut>(name: &'static str, parent: &CancellationToken, task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let token = parent.child_token();
        let handle = tokio::spawn(task(token.clone()));
        debug!("{} task started", name);
        Self { name, handle, token }
    }

    async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!("{} task ended abnormally: {}", self.name, e);
        }
        debug!("{} task stopped", self.name);
    }
}

/// Every task the pipeline runs.
pub(crate) struct TaskSet {
    root: CancellationToken,
    ctx: CaptureContext,
    captures: [CaptureSlot; 3],
    workers: Vec<Worker>,
    delivery: Option<Worker>,
    display: Option<Worker>,
}

impl TaskSet {
    pub(crate) fn new(root: CancellationToken, ctx: CaptureContext) -> Self {
        Self {
            root,
            ctx,
            captures: [CaptureSlot::Empty, CaptureSlot::Empty, CaptureSlot::Empty],
            workers: Vec::new(),
            delivery: None,
            display: None,
        }
    }

    pub(crate) fn set_display(&mut self, worker: Worker) {
        self.display = Some(worker);
    }

    pub(crate) fn set_delivery(&mut self, worker: Worker) {
        self.delivery = Some(worker);
    }

    pub(crate) fn add_worker(&mut self, worker: Worker) {
        self.workers.push(worker);
    }

    /// Create the capture task for the driver's sensor.
    pub(crate) fn spawn_capture(&mut self, driver: Box<dyn SensorDriver>) {
        let kind = driver.kind();
        let token = self.root.child_token();
        let handle = sensor::spawn_capture(driver, self.ctx.clone(), token.clone());
        self.captures[kind.index()] = CaptureSlot::Running { handle, token };
        debug!("{} capture task created", kind);
    }

    /// Delete the capture task and take its driver back.
    pub(crate) async fn stop_capture(&mut self, kind: SensorKind) -> Result<Box<dyn SensorDriver>> {
        match mem::replace(&mut self.captures[kind.index()], CaptureSlot::Empty) {
            CaptureSlot::Running { handle, token } => {
                token.cancel();
                handle
                    .await
                    .map_err(|e| TelemetryError::Task(format!("{} capture task: {}", kind, e)))
            }
            CaptureSlot::Parked(driver) => Ok(driver),
            CaptureSlot::Empty => Err(TelemetryError::Task(format!("no {} capture task", kind))),
        }
    }

    /// Keep a driver whose task will not be recreated.
    pub(crate) fn park(&mut self, driver: Box<dyn SensorDriver>) {
        let kind = driver.kind();
        self.captures[kind.index()] = CaptureSlot::Parked(driver);
    }

    pub(crate) async fn stop_delivery(&mut self) {
        if let Some(worker) = self.delivery.take() {
            worker.stop().await;
        }
    }

    /// Stop every task except the display and collect the drivers.
    pub(crate) async fn stop_pipeline(&mut self) -> Vec<Box<dyn SensorDriver>> {
        let mut drivers = Vec::with_capacity(SensorKind::ALL.len());
        for kind in SensorKind::ALL {
            match self.stop_capture(kind).await {
                Ok(driver) => drivers.push(driver),
                Err(e) => warn!("{}", e),
            }
        }
        for worker in self.workers.drain(..) {
            worker.stop().await;
        }
        self.stop_delivery().await;
        drivers
    }

    /// Stop the display last so the shutdown line is rendered.
    pub(crate) async fn stop_display(&mut self) {
        if let Some(worker) = self.display.take() {
            worker.stop().await;
        }
        self.root.cancel();
    }
}
