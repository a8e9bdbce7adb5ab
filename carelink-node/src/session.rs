//! Session manager: broker session layered on the link
//!
//! Invariants:
//! - `SessionActive` only while the link is `Attached`; any other link state
//!   forces `NoSession`
//! - every `NoSession -> SessionActive` transition re-subscribes the whole
//!   subscription set before anything else is published
//! - at most one establish call per poll
//!
//! Inbound messages are handed back from [`SessionManager::housekeep`] as
//! values; nothing inside the transport calls back into session state.

use crate::error::{PublishError, SessionError};
use crate::link::ConnectionState;
use crate::messages::OutboundMessage;
use crate::topics::SubscriptionSet;
use rumqttc::QoS;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    SessionActive,
}

/// A publish received from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Broker session primitive
pub trait Transport {
    /// One bounded session-establish attempt
    fn connect(&mut self) -> Result<(), SessionError>;
    fn is_connected(&self) -> bool;
    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), SessionError>;
    fn publish(&mut self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), PublishError>;
    /// Keep-alive and network processing; returns the publishes received meanwhile
    fn housekeep(&mut self) -> Vec<InboundMessage>;
    /// Drop the session (link went away)
    fn disconnect(&mut self);
}

pub struct SessionManager<T: Transport> {
    transport: T,
    state: SessionState,
    subscriptions: SubscriptionSet,
    established: u32,
}

impl<T: Transport> SessionManager<T> {
    pub fn new(transport: T, subscriptions: SubscriptionSet) -> Self {
        Self {
            transport,
            state: SessionState::NoSession,
            subscriptions,
            established: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::SessionActive
    }

    /// Number of sessions established since boot
    pub fn established(&self) -> u32 {
        self.established
    }

    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn poll(&mut self, link: ConnectionState) -> SessionState {
        if link != ConnectionState::Attached {
            if self.is_active() {
                warn!("Link left Attached ({:?}), dropping session", link);
                self.transport.disconnect();
            }
            self.state = SessionState::NoSession;
            return self.state;
        }

        match self.state {
            SessionState::SessionActive => {
                if !self.transport.is_connected() {
                    warn!("Broker session dropped");
                    self.state = SessionState::NoSession;
                }
            }
            SessionState::NoSession => match self.transport.connect() {
                Ok(()) => self.activate(),
                Err(e) => debug!("Session establish failed: {} (retrying later)", e),
            },
        }

        self.state
    }

    fn activate(&mut self) {
        for topic in self.subscriptions.iter() {
            if let Err(e) = self.transport.subscribe(topic, QoS::AtLeastOnce) {
                warn!("Resubscribe failed, tearing session down: {}", e);
                self.transport.disconnect();
                return;
            }
            debug!("Subscribed to {}", topic);
        }

        self.state = SessionState::SessionActive;
        self.established += 1;
        info!(
            "Broker session established (#{}) - {} subscriptions restored",
            self.established,
            self.subscriptions.len()
        );
    }

    /// Best-effort publish; fails without touching the transport when no session exists
    pub fn publish(&mut self, message: OutboundMessage) -> Result<(), PublishError> {
        if !self.is_active() {
            return Err(PublishError::NoSession);
        }
        let qos = message.priority.qos();
        self.transport.publish(&message.topic, qos, message.payload)
    }

    /// Run every cycle regardless of state, otherwise the session silently expires
    pub fn housekeep(&mut self) -> Vec<InboundMessage> {
        let inbound = self.transport.housekeep();
        if self.is_active() && !self.transport.is_connected() {
            warn!("Broker session lost during housekeeping");
            self.state = SessionState::NoSession;
        }
        inbound
    }
}
