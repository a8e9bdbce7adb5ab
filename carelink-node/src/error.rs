//! Error taxonomy for the node core
//!
//! Every failure is recovered (or dropped) by the component that observes it:
//! - `LinkError`: attach failed or timed out, retried on a later cycle
//! - `SessionError`: broker refused or dropped the session, forces `NoSession`
//! - `PublishError`: best-effort delivery failed, message dropped
//! - `DecodeError`: malformed inbound payload, message discarded
//! - `SensorError`: collaborator driver unavailable or read failed

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link attach gave up after {attempts} attempts")]
    AttemptsExhausted { attempts: u32 },
    #[error("link driver error: {0}")]
    Driver(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("broker rejected the session: {0}")]
    Rejected(String),
    #[error("no CONNACK within {0} ms")]
    Timeout(u64),
    #[error("subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("payload is {size} bytes, limit is {limit}")]
    Oversized { size: usize, limit: usize },
    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no active session")]
    NoSession,
    #[error("transport rejected the message: {0}")]
    Rejected(String),
    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON for this topic: {0}")]
    Json(#[from] serde_json::Error),
    #[error("inbound payload is {size} bytes, limit is {limit}")]
    Oversized { size: usize, limit: usize },
    #[error("no handler for topic {0}")]
    UnknownTopic(String),
}

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor {0} unavailable")]
    Unavailable(&'static str),
    #[error("sensor {sensor} read failed: {reason}")]
    ReadFailed { sensor: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
