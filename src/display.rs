//! # Display Module
//!
//! Fire-and-forget status line mirroring every state transition.
//!
//! Producers call [`DisplaySink::notify`], which never blocks: [`StatusLine`]
//! drops the oldest pending line when its queue is full. The display task
//! renders lines through `tracing` and stops accepting lines once the
//! shutdown message has been shown, so it stays on screen.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::pipeline::DropOldestQueue;
use crate::status::SensorKind;
use crate::supervisor::ShutdownCause;

/// One status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    AppStarted,
    SensorConnected(SensorKind),
    SensorReconnecting(SensorKind),
    SensorNotConnected(SensorKind),
    LinkConnected,
    LinkRetrying,
    CloudConnected,
    CloudRetrying,
    Shutdown(ShutdownCause),
}

impl fmt::Display for DisplayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayEvent::AppStarted => write!(f, "Asset tracking application started"),
            DisplayEvent::SensorConnected(kind) => write!(f, "{}: Connected", kind.part_name()),
            DisplayEvent::SensorReconnecting(kind) => write!(f, "{}: Reconnecting", kind.part_name()),
            DisplayEvent::SensorNotConnected(kind) => write!(f, "{}: Not connected", kind.part_name()),
            DisplayEvent::LinkConnected => write!(f, "Wi-Fi: Connected"),
            DisplayEvent::LinkRetrying => write!(f, "Wi-Fi: Connection retrying"),
            DisplayEvent::CloudConnected => write!(f, "Cloud: Connected"),
            DisplayEvent::CloudRetrying => write!(f, "Cloud: Connection retrying"),
            DisplayEvent::Shutdown(cause) => {
                let reason = match cause {
                    ShutdownCause::AllSensorsDown => "None of sensors are connected",
                    ShutdownCause::LinkLost => "Wi-Fi is not connected",
                    ShutdownCause::CloudLost => "Cloud is not connected",
                    ShutdownCause::External => "Stopped by request",
                };
                write!(f, "Application shutdown: {}", reason)
            }
        }
    }
}

/// Consumer of status lines. Must not block.
pub trait DisplaySink: Send + Sync {
    fn notify(&self, event: DisplayEvent);
}

/// Queue-backed sink feeding the display task.
#[derive(Debug, Clone)]
pub struct StatusLine {
    queue: Arc<DropOldestQueue<DisplayEvent>>,
}

impl StatusLine {
    pub fn new(queue: Arc<DropOldestQueue<DisplayEvent>>) -> Self {
        Self { queue }
    }
}

impl DisplaySink for StatusLine {
    fn notify(&self, event: DisplayEvent) {
        if let Some(dropped) = self.queue.push(event) {
            debug!("Display queue full, dropped: {}", dropped);
        }
    }
}

/// Turns events into lines; latches after the shutdown line.
#[derive(Debug, Default)]
pub struct Renderer {
    latched: bool,
}

impl Renderer {
    /// Render `event`, or `None` if the display has latched.
    pub fn render(&mut self, event: DisplayEvent) -> Option<String> {
        if self.latched {
            return None;
        }
        if matches!(event, DisplayEvent::Shutdown(_)) {
            self.latched = true;
        }
        Some(event.to_string())
    }
}

/// The display task.
pub struct DisplayTask {
    queue: Arc<DropOldestQueue<DisplayEvent>>,
    renderer: Renderer,
}

impl DisplayTask {
    pub fn new(queue: Arc<DropOldestQueue<DisplayEvent>>) -> Self {
        Self {
            queue,
            renderer: Renderer::default(),
        }
    }

    /// Render lines until cancelled; anything still queued at cancellation
    /// is rendered before returning.
    pub async fn run(mut self, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = self.queue.recv() => self.show(event),
            }
        }
        for event in self.queue.drain() {
            self.show(event);
        }
    }

    fn show(&mut self, event: DisplayEvent) {
        if let Some(line) = self.renderer.render(event) {
            info!(target: "display", "{}", line);
        }
    }
}
