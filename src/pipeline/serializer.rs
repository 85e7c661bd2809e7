//! Serializer task: readings in, packets out.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{DropOldestQueue, Packet, Reading};
use crate::codec::PacketEncoder;

pub(crate) struct SerializerTask {
    pub(crate) readings: Arc<DropOldestQueue<Reading>>,
    pub(crate) outbound: Arc<DropOldestQueue<Packet>>,
    pub(crate) encoder: Arc<dyn PacketEncoder>,
}

impl SerializerTask {
    pub(crate) async fn run(self, token: CancellationToken) {
        loop {
            let reading = tokio::select! {
                _ = token.cancelled() => {
                    debug!("Serializer task cancelled");
                    return;
                }
                reading = self.readings.recv() => reading,
            };
            self.forward(&reading);
        }
    }

    fn forward(&self, reading: &Reading) {
        // Make room first so the newest packet always fits
        if self.outbound.discard_oldest_if_full().is_some() {
            debug!("Outbound queue full, dropped oldest packet");
        }

        match self.encoder.serialize(reading) {
            Ok(packet) => {
                trace!("Serialized {} reading into {} bytes", reading.kind(), packet.len());
                self.outbound.push(packet);
            }
            Err(e) => warn!("Dropping {} reading: {}", reading.kind(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timestamp;
    use crate::codec::{JsonEncoder, KeepAliveIntervals};
    use crate::error::SerializeError;
    use crate::net::{LinkIdentity, Signal};
    use crate::status::SensorKind;
    use serde_json::Value;
    use std::time::Duration;

    fn spawn_task(
        outbound_capacity: usize,
        max_packet_len: usize,
    ) -> (
        Arc<DropOldestQueue<Reading>>,
        Arc<DropOldestQueue<Packet>>,
        CancellationToken,
        tokio::task::JoinHandle<()>,
    ) {
        let readings = Arc::new(DropOldestQueue::new(10));
        let outbound = Arc::new(DropOldestQueue::new(outbound_capacity));
        let task = SerializerTask {
            readings: readings.clone(),
            outbound: outbound.clone(),
            encoder: Arc::new(JsonEncoder::new(max_packet_len)),
        };
        let token = CancellationToken::new();
        let handle = tokio::spawn(task.run(token.clone()));
        (readings, outbound, token, handle)
    }

    fn available(kind: SensorKind) -> Reading {
        let mut reading = Reading::empty(kind);
        reading.set_available(true);
        reading
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_serializes_in_arrival_order() {
        let (readings, outbound, token, handle) = spawn_task(10, 512);

        readings.push(available(SensorKind::Environmental));
        readings.push(available(SensorKind::Positional));
        settle().await;

        let types: Vec<String> = outbound
            .drain()
            .iter()
            .map(|p| {
                let value: Value = serde_json::from_slice(p.as_bytes()).unwrap();
                value["msgtype"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(types, vec!["heat", "gps"]);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_outbound_drops_oldest() {
        let (readings, outbound, token, handle) = spawn_task(2, 512);

        for _ in 0..3 {
            readings.push(available(SensorKind::Inertial));
            settle().await;
        }

        assert_eq!(outbound.len(), 2);

        token.cancel();
        handle.await.unwrap();
    }

    /// Encodes everything except inertial readings.
    struct PickyEncoder(JsonEncoder);

    impl PacketEncoder for PickyEncoder {
        fn serialize(&self, reading: &Reading) -> Result<Packet, SerializeError> {
            match reading.kind() {
                SensorKind::Inertial => Err(SerializeError::TooLarge { len: 4096, max: 512 }),
                _ => self.0.serialize(reading),
            }
        }

        fn keep_alive(&self, at: Timestamp, intervals: &KeepAliveIntervals) -> Result<Packet, SerializeError> {
            self.0.keep_alive(at, intervals)
        }

        fn link_status(&self, at: Timestamp, identity: &LinkIdentity, signal: Signal) -> Result<Packet, SerializeError> {
            self.0.link_status(at, identity, signal)
        }

        fn session(&self, at: Timestamp) -> Result<Packet, SerializeError> {
            self.0.session(at)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_encoding_failure_skips_cycle() {
        let readings = Arc::new(DropOldestQueue::new(10));
        let outbound = Arc::new(DropOldestQueue::new(10));
        let task = SerializerTask {
            readings: readings.clone(),
            outbound: outbound.clone(),
            encoder: Arc::new(PickyEncoder(JsonEncoder::new(512))),
        };
        let token = CancellationToken::new();
        let handle = tokio::spawn(task.run(token.clone()));

        readings.push(available(SensorKind::Inertial));
        readings.push(available(SensorKind::Environmental));
        settle().await;

        assert!(readings.is_empty());
        assert_eq!(outbound.len(), 1);
        assert!(!handle.is_finished());

        token.cancel();
        handle.await.unwrap();
    }
}
