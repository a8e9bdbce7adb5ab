/*!
Mock transport pour tests sans broker

Implémente le trait `Transport` du nœud en mémoire:
- enregistre connexions, abonnements et publications (dans l'ordre)
- simule la réception de messages et les coupures de session
- permet de scripter les refus du broker
*/

use carelink_node::error::{PublishError, SessionError};
use carelink_node::session::{InboundMessage, Transport};
use rumqttc::QoS;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

/// Everything that crossed the transport boundary, in call order
#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    Connect,
    Subscribe(String),
    Publish(String),
    Disconnect,
}

#[derive(Debug, Default)]
struct Inner {
    connected: bool,
    broker_down: bool,
    refuse_next: u32,
    reject_publishes: bool,
    published: Vec<MockMessage>,
    subscriptions: Vec<String>,
    wire: Vec<WireEvent>,
    connect_attempts: u32,
    inbound: VecDeque<InboundMessage>,
}

/// Clonable handle: the node owns one clone, the test keeps another
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Broker unreachable: every connect fails until restored
    pub fn set_broker_available(&self, available: bool) {
        let mut inner = self.lock();
        inner.broker_down = !available;
        if !available {
            inner.connected = false;
        }
    }

    /// Refuse the next `n` connect attempts
    pub fn refuse_next_connects(&self, n: u32) {
        self.lock().refuse_next = n;
    }

    /// Accept the session but reject every publish
    pub fn reject_publishes(&self, reject: bool) {
        self.lock().reject_publishes = reject;
    }

    /// Session drops silently, as after a missed keep-alive
    pub fn simulate_drop(&self) {
        self.lock().connected = false;
        info!("[MOCK] Session dropped");
    }

    /// Queue a message delivered on the next housekeeping pass
    pub fn simulate_incoming<S, V>(&self, topic: S, payload: V)
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = InboundMessage {
            topic: topic.into(),
            payload: payload.into(),
        };
        info!("[MOCK] Simulated incoming: {}", message.topic);
        self.lock().inbound.push_back(message);
    }

    pub fn is_session_up(&self) -> bool {
        self.lock().connected
    }

    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.lock().published.clone()
    }

    pub fn get_subscriptions(&self) -> Vec<String> {
        self.lock().subscriptions.clone()
    }

    pub fn wire_log(&self) -> Vec<WireEvent> {
        self.lock().wire.clone()
    }

    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.lock()
            .published
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Parse the last message published on `topic`
    pub fn get_last_json_message<T>(&self, topic: &str) -> anyhow::Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        match self.find_messages_by_topic(topic).last() {
            Some(last) => Ok(Some(serde_json::from_slice(&last.payload)?)),
            None => Ok(None),
        }
    }

    /// Forget recorded traffic, keep the connection state
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.published.clear();
        inner.subscriptions.clear();
        inner.wire.clear();
    }
}

impl Transport for MockTransport {
    fn connect(&mut self) -> Result<(), SessionError> {
        let mut inner = self.lock();
        inner.connect_attempts += 1;
        inner.wire.push(WireEvent::Connect);

        if inner.broker_down {
            return Err(SessionError::Transport("connection refused".to_string()));
        }
        if inner.refuse_next > 0 {
            inner.refuse_next -= 1;
            return Err(SessionError::Rejected("NotAuthorized".to_string()));
        }
        inner.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn subscribe(&mut self, topic: &str, _qos: QoS) -> Result<(), SessionError> {
        let mut inner = self.lock();
        if !inner.connected {
            return Err(SessionError::Subscribe {
                topic: topic.to_string(),
                reason: "not connected".to_string(),
            });
        }
        inner.subscriptions.push(topic.to_string());
        inner.wire.push(WireEvent::Subscribe(topic.to_string()));
        info!("[MOCK] Subscribed to {}", topic);
        Ok(())
    }

    fn publish(&mut self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), PublishError> {
        let mut inner = self.lock();
        if !inner.connected {
            return Err(PublishError::NoSession);
        }
        if inner.reject_publishes {
            return Err(PublishError::Rejected("request queue full".to_string()));
        }
        info!("[MOCK] Published to {}: {} bytes", topic, payload.len());
        inner.wire.push(WireEvent::Publish(topic.to_string()));
        inner.published.push(MockMessage {
            topic: topic.to_string(),
            payload,
            qos,
        });
        Ok(())
    }

    fn housekeep(&mut self) -> Vec<InboundMessage> {
        let mut inner = self.lock();
        if !inner.connected {
            return Vec::new();
        }
        inner.inbound.drain(..).collect()
    }

    fn disconnect(&mut self) {
        let mut inner = self.lock();
        inner.connected = false;
        inner.wire.push(WireEvent::Disconnect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_transport_publish_subscribe() {
        let mock = MockTransport::new();
        let mut transport = mock.clone();

        transport.connect().unwrap();
        transport.subscribe("home/bedside/comm/display", QoS::AtLeastOnce).unwrap();
        assert_eq!(mock.get_subscriptions(), vec!["home/bedside/comm/display"]);

        transport
            .publish("home/bedside/comm/status", QoS::AtMostOnce, br#"{"status":"Active"}"#.to_vec())
            .unwrap();

        let messages = mock.get_published_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "home/bedside/comm/status");

        let parsed: Option<serde_json::Value> = mock.get_last_json_message("home/bedside/comm/status").unwrap();
        assert_eq!(parsed.unwrap()["status"], "Active");
    }

    #[test]
    fn test_scripted_refusals() {
        let mock = MockTransport::new();
        let mut transport = mock.clone();
        mock.refuse_next_connects(2);

        assert!(transport.connect().is_err());
        assert!(transport.connect().is_err());
        assert!(transport.connect().is_ok());
        assert_eq!(mock.connect_attempts(), 3);
    }

    #[test]
    fn test_publish_requires_session() {
        let mut transport = MockTransport::new();
        let err = transport.publish("t", QoS::AtMostOnce, vec![]).unwrap_err();
        assert!(matches!(err, PublishError::NoSession));
    }

    #[test]
    fn test_inbound_held_until_housekeeping() {
        let mock = MockTransport::new();
        let mut transport = mock.clone();
        transport.connect().unwrap();

        mock.simulate_incoming("home/bedside/comm/display", br#"{"msg":"hi"}"#.to_vec());
        let delivered = transport.housekeep();
        assert_eq!(delivered.len(), 1);
        assert!(transport.housekeep().is_empty());
    }
}
