//! MQTT session transport
//!
//! `rumqttc` is async; the control loop is not. The transport owns a private
//! current-thread tokio runtime and only ever drives the event loop for a
//! bounded slice:
//! - `connect`: fresh client + event loop, wait up to `connect_timeout_ms` for CONNACK
//! - `housekeep`: pump for `housekeep_slice_ms`, keep-alive pings included
//! - `publish` / `subscribe`: queue the request, then pump one slice so it leaves
//!
//! Inbound publishes are queued and handed back by `housekeep`. A connection
//! error drops the event loop instead of letting rumqttc reconnect on its own;
//! reconnecting is the session manager's call.

use crate::config::BrokerConfig;
use crate::error::{PublishError, SessionError};
use crate::session::{InboundMessage, Transport};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, LastWill, MqttOptions, QoS};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Request channel capacity; the loop publishes a handful of messages per cycle at most
const REQUEST_CAPACITY: usize = 10;

pub struct MqttTransport {
    runtime: Runtime,
    client_id: String,
    host: String,
    port: u16,
    keep_alive: Duration,
    connect_timeout: Duration,
    slice: Duration,
    will_topic: String,
    will_payload: Vec<u8>,
    client: Option<AsyncClient>,
    eventloop: Option<EventLoop>,
    inbound: VecDeque<InboundMessage>,
}

impl MqttTransport {
    /// `will_*` is registered on every connect and published by the broker if
    /// the node vanishes without a clean disconnect
    pub fn new(
        config: &BrokerConfig,
        client_id: impl Into<String>,
        will_topic: impl Into<String>,
        will_payload: Vec<u8>,
    ) -> Result<Self, SessionError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SessionError::Transport(format!("runtime: {e}")))?;

        Ok(Self {
            runtime,
            client_id: client_id.into(),
            host: config.host.clone(),
            port: config.port,
            keep_alive: Duration::from_secs(config.keep_alive_secs),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            slice: Duration::from_millis(config.housekeep_slice_ms),
            will_topic: will_topic.into(),
            will_payload,
            client: None,
            eventloop: None,
            inbound: VecDeque::new(),
        })
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        options.set_last_will(LastWill::new(
            &self.will_topic,
            self.will_payload.clone(),
            QoS::AtLeastOnce,
            false,
        ));
        options
    }

    fn drop_connection(&mut self) {
        self.client = None;
        self.eventloop = None;
    }

    /// Drive the event loop for at most `slice`, queueing inbound publishes
    fn pump(&mut self, slice: Duration) {
        let Some(eventloop) = self.eventloop.as_mut() else {
            return;
        };

        let inbound = &mut self.inbound;
        let lost = self.runtime.block_on(async {
            let deadline = tokio::time::Instant::now() + slice;
            loop {
                match tokio::time::timeout_at(deadline, eventloop.poll()).await {
                    Err(_) => return None,
                    Ok(Ok(Event::Incoming(Incoming::Publish(p)))) => {
                        debug!("Received MQTT message on topic: {}", p.topic);
                        inbound.push_back(InboundMessage {
                            topic: p.topic.clone(),
                            payload: p.payload.to_vec(),
                        });
                    }
                    Ok(Ok(Event::Incoming(Incoming::Disconnect))) => {
                        return Some("broker sent DISCONNECT".to_string());
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => return Some(e.to_string()),
                }
            }
        });

        if let Some(reason) = lost {
            warn!("MQTT connection lost: {}", reason);
            self.drop_connection();
        }
    }
}

impl Transport for MqttTransport {
    fn connect(&mut self) -> Result<(), SessionError> {
        self.drop_connection();
        info!("Connecting MQTT to {}:{} as {}", self.host, self.port, self.client_id);

        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);
        let timeout = self.connect_timeout;

        let result = self.runtime.block_on(async {
            let handshake = async {
                loop {
                    match eventloop.poll().await {
                        Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                            return match ack.code {
                                ConnectReturnCode::Success => Ok(()),
                                code => Err(SessionError::Rejected(format!("{code:?}"))),
                            };
                        }
                        Ok(_) => {}
                        Err(e) => return Err(SessionError::Transport(e.to_string())),
                    }
                }
            };
            match tokio::time::timeout(timeout, handshake).await {
                Ok(result) => result,
                Err(_) => Err(SessionError::Timeout(timeout.as_millis() as u64)),
            }
        });

        result?;
        self.client = Some(client);
        self.eventloop = Some(eventloop);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.is_some() && self.eventloop.is_some()
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), SessionError> {
        let client = self.client.as_ref().ok_or_else(|| SessionError::Subscribe {
            topic: topic.to_string(),
            reason: "not connected".to_string(),
        })?;
        client
            .try_subscribe(topic, qos)
            .map_err(|e| SessionError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        self.pump(self.slice);
        if !self.is_connected() {
            return Err(SessionError::Subscribe {
                topic: topic.to_string(),
                reason: "connection dropped while subscribing".to_string(),
            });
        }
        Ok(())
    }

    fn publish(&mut self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), PublishError> {
        let client = self.client.as_ref().ok_or(PublishError::NoSession)?;
        client
            .try_publish(topic, qos, false, payload)
            .map_err(|e| PublishError::Rejected(e.to_string()))?;

        self.pump(self.slice);
        if !self.is_connected() {
            return Err(PublishError::Rejected("connection dropped while sending".to_string()));
        }
        Ok(())
    }

    fn housekeep(&mut self) -> Vec<InboundMessage> {
        self.pump(self.slice);
        self.inbound.drain(..).collect()
    }

    fn disconnect(&mut self) {
        if let Some(client) = self.client.as_ref() {
            if let Err(e) = client.try_disconnect() {
                debug!("MQTT disconnect request failed: {}", e);
            }
            self.pump(self.slice);
        }
        self.drop_connection();
        self.inbound.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> MqttTransport {
        let config = BrokerConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout_ms: 100,
            ..BrokerConfig::default()
        };
        MqttTransport::new(&config, "test-node", "home/test/node/status", b"{}".to_vec()).unwrap()
    }

    #[test]
    fn test_starts_disconnected() {
        let mut mqtt = transport();
        assert!(!mqtt.is_connected());
        assert!(mqtt.housekeep().is_empty());
    }

    #[test]
    fn test_publish_without_connection_fails() {
        let mut mqtt = transport();
        let err = mqtt.publish("t", QoS::AtMostOnce, b"{}".to_vec()).unwrap_err();
        assert!(matches!(err, PublishError::NoSession));
    }

    #[test]
    fn test_connect_to_closed_port_fails_quickly() {
        let mut mqtt = transport();
        let started = std::time::Instant::now();
        assert!(mqtt.connect().is_err());
        assert!(!mqtt.is_connected());
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
