/**
 * FLEET - Routage des messages des nœuds vers la carte de flotte
 *
 * RÔLE : Décode status / button / alert / telemetry, met à jour l'état par unité,
 * journalise les alertes et balaie les unités silencieuses.
 */

use crate::models::{AlertIn, StatusIn, TelemetryMsg};
use crate::state::Fleet;
use carelink_node::messages::{Priority, STATUS_OFFLINE};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("{0} is not a node topic")]
    UnknownTopic(String),
    #[error("invalid payload on {topic}: {source}")]
    Json {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    Status,
    Button,
    Alert,
    Telemetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeTopic<'a> {
    pub zone: &'a str,
    pub class: &'a str,
    pub kind: TopicKind,
}

/// Filters covering every topic a node publishes under `domain`
pub fn subscriptions(domain: &str) -> Vec<String> {
    vec![
        format!("{domain}/+/+/status"),
        format!("{domain}/+/+/button"),
        format!("{domain}/+/safety/alert"),
        format!("{domain}/+/env/telemetry"),
    ]
}

pub fn parse_topic<'a>(domain: &str, topic: &'a str) -> Option<NodeTopic<'a>> {
    let mut parts = topic.split('/');
    let (Some(head), Some(zone), Some(class), Some(leaf), None) =
        (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    if head != domain || zone.is_empty() || class.is_empty() {
        return None;
    }
    let kind = match (class, leaf) {
        (_, "status") => TopicKind::Status,
        (_, "button") => TopicKind::Button,
        ("safety", "alert") => TopicKind::Alert,
        ("env", "telemetry") => TopicKind::Telemetry,
        _ => return None,
    };
    Some(NodeTopic { zone, class, kind })
}

/// What a routed publish changed in the fleet
#[derive(Debug, Clone, PartialEq)]
pub enum FleetEvent {
    CameOnline(String),
    Heartbeat(String),
    WentOffline(String),
    Alert {
        unit_id: String,
        event: String,
        priority: Priority,
    },
    Telemetry(String),
}

fn decode<T: DeserializeOwned>(topic: &str, payload: &[u8]) -> Result<T, RouteError> {
    serde_json::from_slice(payload).map_err(|source| RouteError::Json {
        topic: topic.to_string(),
        source,
    })
}

pub fn handle_publish(
    fleet: &Fleet,
    domain: &str,
    topic: &str,
    payload: &[u8],
    now: OffsetDateTime,
) -> Result<FleetEvent, RouteError> {
    let node = parse_topic(domain, topic).ok_or_else(|| RouteError::UnknownTopic(topic.to_string()))?;

    match node.kind {
        TopicKind::Status => {
            let status: StatusIn = decode(topic, payload)?;
            if status.status == STATUS_OFFLINE {
                // Last will or graceful shutdown
                fleet.touch(&status.unit_id, node.zone, node.class, None, now);
                fleet.mark_offline(&status.unit_id);
                warn!("Unit {} in {} went offline", status.unit_id, node.zone);
                return Ok(FleetEvent::WentOffline(status.unit_id));
            }
            if fleet.touch(&status.unit_id, node.zone, node.class, status.battery, now) {
                info!(
                    "Unit {} online ({}/{}, battery {:?})",
                    status.unit_id, node.zone, node.class, status.battery
                );
                Ok(FleetEvent::CameOnline(status.unit_id))
            } else {
                debug!("Heartbeat from {}", status.unit_id);
                Ok(FleetEvent::Heartbeat(status.unit_id))
            }
        }
        TopicKind::Button | TopicKind::Alert => {
            let alert: AlertIn = decode(topic, payload)?;
            fleet.touch(&alert.unit_id, node.zone, node.class, alert.battery, now);
            fleet.record_alert(&alert.unit_id);
            match alert.priority {
                Priority::Critical => error!(
                    "ALERT {} from {} in {} (priority {:?}, g_force {:?})",
                    alert.event, alert.unit_id, node.zone, alert.priority, alert.g_force
                ),
                _ => warn!(
                    "ALERT {} from {} in {} (priority {:?})",
                    alert.event, alert.unit_id, node.zone, alert.priority
                ),
            }
            Ok(FleetEvent::Alert {
                unit_id: alert.unit_id,
                event: alert.event,
                priority: alert.priority,
            })
        }
        TopicKind::Telemetry => {
            let msg: TelemetryMsg = decode(topic, payload)?;
            fleet.touch(&msg.unit_id, node.zone, node.class, msg.battery, now);
            fleet.record_telemetry(&msg.unit_id, msg.reading);
            debug!(
                "Telemetry from {}: {:.1} C, {:.1} %, {:.0} Pa",
                msg.unit_id, msg.reading.temp, msg.reading.humidity, msg.reading.pressure
            );
            Ok(FleetEvent::Telemetry(msg.unit_id))
        }
    }
}

/// Periodic liveness sweep against the wall clock
pub fn spawn_sweeper(fleet: Fleet, timeout: Duration, every: Duration) -> JoinHandle<()> {
    let timeout = time::Duration::try_from(timeout).unwrap_or(time::Duration::MAX);
    task::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            for unit_id in fleet.sweep(OffsetDateTime::now_utc(), timeout) {
                warn!("Unit {} silent for more than {}s, marked offline", unit_id, timeout.whole_seconds());
            }
        }
    })
}
