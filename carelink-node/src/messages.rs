//! Wire messages exchanged with the broker
//!
//! Every payload is a single flat JSON object that must fit the device's
//! fixed buffers: outbound payloads above [`MAX_PAYLOAD_BYTES`] fail to
//! encode, inbound payloads above [`MAX_INBOUND_BYTES`] are discarded.

use crate::error::{DecodeError, EncodeError};
use crate::hal::{Color, EnvReading};
use rumqttc::QoS;
use serde::{Deserialize, Serialize};

pub const MAX_PAYLOAD_BYTES: usize = 256;
pub const MAX_INBOUND_BYTES: usize = 512;

pub const STATUS_ACTIVE: &str = "Active";
pub const STATUS_OFFLINE: &str = "Offline";
pub const EVENT_FALL: &str = "FALL_DETECTED";
pub const EVENT_HELP: &str = "CALL_FOR_HELP";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Periodic traffic is fire-and-forget; alerts ask for broker acknowledgement
    pub fn qos(self) -> QoS {
        match self {
            Priority::Normal => QoS::AtMostOnce,
            Priority::High | Priority::Critical => QoS::AtLeastOnce,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Status,
    Help,
    Fall,
    Telemetry,
}

#[derive(Debug, Serialize)]
struct StatusPayload<'a> {
    unit_id: &'a str,
    status: &'a str,
    battery: f32,
}

#[derive(Debug, Serialize)]
struct HelpPayload<'a> {
    unit_id: &'a str,
    event: &'a str,
    priority: Priority,
}

#[derive(Debug, Serialize)]
struct FallPayload<'a> {
    unit_id: &'a str,
    event: &'a str,
    priority: Priority,
    g_force: f32,
    battery: f32,
}

#[derive(Debug, Serialize)]
struct TelemetryPayload<'a> {
    unit_id: &'a str,
    temp: f32,
    humidity: f32,
    pressure: f32,
    status: &'a str,
    battery: f32,
}

/// An encoded message ready for the transport.
///
/// Immutable once built; handed to the session by value and not retained.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub kind: MessageKind,
    pub priority: Priority,
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    pub fn status(topic: &str, unit_id: &str, battery: f32) -> Result<Self, EncodeError> {
        let payload = encode(&StatusPayload {
            unit_id,
            status: STATUS_ACTIVE,
            battery,
        })?;
        Ok(Self::new(topic, MessageKind::Status, Priority::Normal, payload))
    }

    pub fn help(topic: &str, unit_id: &str) -> Result<Self, EncodeError> {
        let payload = encode(&HelpPayload {
            unit_id,
            event: EVENT_HELP,
            priority: Priority::High,
        })?;
        Ok(Self::new(topic, MessageKind::Help, Priority::High, payload))
    }

    pub fn fall(topic: &str, unit_id: &str, g_force: f32, battery: f32) -> Result<Self, EncodeError> {
        let payload = encode(&FallPayload {
            unit_id,
            event: EVENT_FALL,
            priority: Priority::Critical,
            g_force,
            battery,
        })?;
        Ok(Self::new(topic, MessageKind::Fall, Priority::Critical, payload))
    }

    pub fn telemetry(
        topic: &str,
        unit_id: &str,
        reading: EnvReading,
        battery: f32,
    ) -> Result<Self, EncodeError> {
        let payload = encode(&TelemetryPayload {
            unit_id,
            temp: reading.temp,
            humidity: reading.humidity,
            pressure: reading.pressure,
            status: STATUS_ACTIVE,
            battery,
        })?;
        Ok(Self::new(topic, MessageKind::Telemetry, Priority::Normal, payload))
    }

    fn new(topic: &str, kind: MessageKind, priority: Priority, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.to_string(),
            kind,
            priority,
            payload,
        }
    }
}

/// Last-will payload registered with the broker for ungraceful drops
pub fn offline_payload(unit_id: &str) -> Result<Vec<u8>, EncodeError> {
    encode(&StatusPayload {
        unit_id,
        status: STATUS_OFFLINE,
        battery: 0.0,
    })
}

/// Serialize to compact JSON, refusing anything that would overflow the send buffer
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, EncodeError> {
    let bytes = serde_json::to_vec(value)?;
    if bytes.len() > MAX_PAYLOAD_BYTES {
        return Err(EncodeError::Oversized {
            size: bytes.len(),
            limit: MAX_PAYLOAD_BYTES,
        });
    }
    Ok(bytes)
}

/// Inbound `.../display` command sent by the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayCommand {
    #[serde(default)]
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Seconds to keep the message on screen
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl DisplayCommand {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() > MAX_INBOUND_BYTES {
            return Err(DecodeError::Oversized {
                size: payload.len(),
                limit: MAX_INBOUND_BYTES,
            });
        }
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn color(&self) -> Color {
        Color::from_name(self.color.as_deref())
    }

    /// Dashboard side: JSON body for a unit's display topic
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        encode(self)
    }
}
