//! Simulated collaborators.
//!
//! Lets the binary run on a host without the sensor board, radio or broker.
//! Values drift slowly around plausible indoor readings; the GNSS receiver
//! needs a couple of queries before it reports a fix, like a cold start.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::clock::SystemClock;
use crate::codec::JsonEncoder;
use crate::config::Config;
use crate::error::{CloudError, LinkError, ProbeError, ReadError};
use crate::net::{CloudClient, LinkDriver, LinkIdentity, Session, Signal};
use crate::pipeline::{Collaborators, Packet, Reading};
use crate::sensor::{FixProtocol, FixType, SensorDriver};
use crate::status::SensorKind;

/// Simulated register access latency
const BUS_LATENCY: Duration = Duration::from_millis(5);

/// Fix queries answered with "no fix" after power-up
const COLD_START_QUERIES: u32 = 3;

/// Simulated sensor of one kind.
#[derive(Debug)]
pub struct SimSensor {
    kind: SensorKind,
    tick: u32,
    fix_queries: u32,
}

impl SimSensor {
    pub fn new(kind: SensorKind) -> Self {
        Self {
            kind,
            tick: 0,
            fix_queries: 0,
        }
    }

    /// Slow drift in [-1, 1].
    fn wobble(&self, period: f32) -> f32 {
        (self.tick as f32 / period * std::f32::consts::TAU).sin()
    }
}

#[async_trait]
impl SensorDriver for SimSensor {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    async fn probe(&mut self) -> Result<(), ProbeError> {
        sleep(BUS_LATENCY).await;
        debug!("Simulated {} sensor ({}) answered probe", self.kind, self.kind.part_name());
        Ok(())
    }

    async fn read(&mut self, reading: &mut Reading) -> Result<(), ReadError> {
        sleep(BUS_LATENCY).await;
        self.tick = self.tick.wrapping_add(1);

        match reading {
            Reading::Environmental(sample) => {
                sample.temperature_c = 21.0 + 1.5 * self.wobble(120.0);
                sample.humidity_pct = 45.0 + 5.0 * self.wobble(300.0);
            }
            Reading::Inertial(sample) => {
                let sway = 0.05 * self.wobble(20.0);
                sample.accel = [sway, -sway, 9.81];
                sample.gyro = [0.2 * self.wobble(15.0), 0.0, -0.1];
            }
            Reading::Positional(sample) => {
                let drift = f64::from(self.wobble(30.0)) * 1e-5;
                sample.latitude = 59.4370 + drift;
                sample.longitude = 24.7536 - drift;
                sample.altitude_m = 31.0;
                sample.satellites = 9;
            }
        }
        Ok(())
    }

    async fn fix_type(&mut self) -> Result<FixType, ReadError> {
        sleep(BUS_LATENCY).await;
        self.fix_queries = self.fix_queries.saturating_add(1);
        let code = if self.fix_queries > COLD_START_QUERIES { 3 } else { 0 };
        Ok(FixType {
            protocol: FixProtocol::Ubx,
            code,
        })
    }

    async fn deinit(&mut self) {
        debug!("Simulated {} sensor powered down", self.kind);
    }
}

/// Simulated access point association.
#[derive(Debug)]
pub struct SimLink {
    identity: LinkIdentity,
    associated: bool,
    probes: u32,
}

impl SimLink {
    pub fn new(ssid: impl Into<String>) -> Self {
        Self {
            identity: LinkIdentity {
                mac: "02:00:5e:10:00:01".to_string(),
                ssid: ssid.into(),
            },
            associated: false,
            probes: 0,
        }
    }
}

#[async_trait]
impl LinkDriver for SimLink {
    async fn up(&mut self) -> Result<(), LinkError> {
        sleep(Duration::from_millis(200)).await;
        self.associated = true;
        info!("Simulated link associated with {}", self.identity.ssid);
        Ok(())
    }

    async fn liveness(&mut self) -> Result<Signal, LinkError> {
        if !self.associated {
            return Err(LinkError::NoSignal);
        }
        self.probes = self.probes.wrapping_add(1);
        let jitter = (self.probes % 7) as i16;
        Ok(Signal {
            rssi_dbm: -52 - jitter,
        })
    }

    async fn down(&mut self) {
        self.associated = false;
        debug!("Simulated link torn down");
    }

    fn identity(&self) -> LinkIdentity {
        self.identity.clone()
    }
}

/// Simulated broker that logs every published packet.
#[derive(Debug, Default)]
pub struct SimCloud {
    sessions: u64,
    published: u64,
}

#[async_trait]
impl CloudClient for SimCloud {
    async fn connect(&mut self) -> Result<Session, CloudError> {
        sleep(Duration::from_millis(100)).await;
        self.sessions += 1;
        Ok(Session::new(self.sessions))
    }

    async fn publish(&mut self, session: &Session, packet: &Packet) -> Result<(), CloudError> {
        self.published += 1;
        info!(
            target: "cloud",
            "session {} packet {}: {}",
            session.id(),
            self.published,
            String::from_utf8_lossy(packet.as_bytes())
        );
        Ok(())
    }

    async fn disconnect(&mut self, session: Session) {
        debug!("Simulated cloud session {} closed", session.id());
    }
}

/// Simulated collaborators for a full pipeline.
pub fn collaborators(config: &Config) -> Collaborators {
    Collaborators {
        sensors: SensorKind::ALL
            .into_iter()
            .map(|kind| Box::new(SimSensor::new(kind)) as Box<dyn SensorDriver>)
            .collect(),
        link: Box::new(SimLink::new(format!("{}-ap", config.device.id))),
        cloud: Box::new(SimCloud::default()),
        encoder: Arc::new(JsonEncoder::new(config.queues.max_packet_len)),
        clock: Arc::new(SystemClock),
    }
}
