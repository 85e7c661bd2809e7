//! JSON message layouts.
//!
//! Every message carries `msgtype` and a millisecond UTC `timestamp`. A reading
//! whose `available` flag is false keeps its envelope and nulls its payload.

use serde::Serialize;

use super::{KeepAliveIntervals, PacketEncoder};
use crate::clock::{format_timestamp, Timestamp};
use crate::error::SerializeError;
use crate::net::{LinkIdentity, Signal};
use crate::pipeline::reading::{EnvironmentalSample, InertialSample, PositionalSample};
use crate::pipeline::{Packet, Reading};

#[derive(Serialize)]
struct HeatMessage {
    msgtype: &'static str,
    timestamp: String,
    heat: Option<Heat>,
}

#[derive(Serialize)]
struct Heat {
    temperature: Temperature,
    humidity: f32,
}

#[derive(Serialize)]
struct Temperature {
    value: f32,
    unit: &'static str,
}

#[derive(Serialize)]
struct ImuMessage {
    msgtype: &'static str,
    timestamp: String,
    accelero: Option<[f32; 3]>,
    gyro: Option<[f32; 3]>,
}

#[derive(Serialize)]
struct GpsMessage {
    msgtype: &'static str,
    timestamp: String,
    gps: Option<Gps>,
}

#[derive(Serialize)]
struct Gps {
    latitude: f64,
    longitude: f64,
    altitude: f64,
    satellites: u8,
}

#[derive(Serialize)]
struct WifiMessage<'a> {
    msgtype: &'static str,
    timestamp: String,
    wifi: Wifi<'a>,
}

#[derive(Serialize)]
struct Wifi<'a> {
    macid: &'a str,
    ssid: &'a str,
    rssi: i16,
}

#[derive(Serialize)]
struct KeepAliveMessage {
    msgtype: &'static str,
    timestamp: String,
    #[serde(rename = "keep-alive")]
    keep_alive: &'static str,
    interval: [u64; 4],
}

#[derive(Serialize)]
struct SessionMessage {
    msgtype: &'static str,
    timestamp: String,
    session: &'static str,
}

/// JSON packet encoder.
#[derive(Debug, Clone)]
pub struct JsonEncoder {
    max_packet_len: usize,
}

impl JsonEncoder {
    pub fn new(max_packet_len: usize) -> Self {
        Self { max_packet_len }
    }

    fn encode<T: Serialize>(&self, message: &T) -> Result<Packet, SerializeError> {
        let payload = serde_json::to_vec(message)?;
        Packet::new(payload, self.max_packet_len)
    }

    fn heat(sample: &EnvironmentalSample) -> HeatMessage {
        HeatMessage {
            msgtype: "heat",
            timestamp: format_timestamp(&sample.timestamp),
            heat: sample.available.then(|| Heat {
                temperature: Temperature {
                    value: sample.temperature_c,
                    unit: "celsius",
                },
                humidity: sample.humidity_pct,
            }),
        }
    }

    fn imu(sample: &InertialSample) -> ImuMessage {
        ImuMessage {
            msgtype: "imu",
            timestamp: format_timestamp(&sample.timestamp),
            accelero: sample.available.then_some(sample.accel),
            gyro: sample.available.then_some(sample.gyro),
        }
    }

    fn gps(sample: &PositionalSample) -> GpsMessage {
        GpsMessage {
            msgtype: "gps",
            timestamp: format_timestamp(&sample.timestamp),
            gps: sample.available.then(|| Gps {
                latitude: sample.latitude,
                longitude: sample.longitude,
                altitude: sample.altitude_m,
                satellites: sample.satellites,
            }),
        }
    }
}

impl PacketEncoder for JsonEncoder {
    fn serialize(&self, reading: &Reading) -> Result<Packet, SerializeError> {
        match reading {
            Reading::Environmental(sample) => self.encode(&Self::heat(sample)),
            Reading::Inertial(sample) => self.encode(&Self::imu(sample)),
            Reading::Positional(sample) => self.encode(&Self::gps(sample)),
        }
    }

    fn keep_alive(&self, at: Timestamp, intervals: &KeepAliveIntervals) -> Result<Packet, SerializeError> {
        self.encode(&KeepAliveMessage {
            msgtype: "keep-alive",
            timestamp: format_timestamp(&at),
            keep_alive: "yes",
            interval: intervals.0,
        })
    }

    fn link_status(
        &self,
        at: Timestamp,
        identity: &LinkIdentity,
        signal: Signal,
    ) -> Result<Packet, SerializeError> {
        self.encode(&WifiMessage {
            msgtype: "wifi",
            timestamp: format_timestamp(&at),
            wifi: Wifi {
                macid: &identity.mac,
                ssid: &identity.ssid,
                rssi: signal.rssi_dbm,
            },
        })
    }

    fn session(&self, at: Timestamp) -> Result<Packet, SerializeError> {
        self.encode(&SessionMessage {
            msgtype: "session",
            timestamp: format_timestamp(&at),
            session: "new",
        })
    }
}
