use carelink_node::messages::Priority;
use serde::Deserialize;
use std::collections::HashMap;
use time::OffsetDateTime;

/// `.../status` heartbeat or last will
#[derive(Debug, Deserialize)]
pub struct StatusIn {
    pub unit_id: String,
    pub status: String,
    pub battery: Option<f32>,
}

/// `.../button` help request or `.../safety/alert` fall alert
#[derive(Debug, Clone, Deserialize)]
pub struct AlertIn {
    pub unit_id: String,
    pub event: String,
    pub priority: Priority,
    pub g_force: Option<f32>,
    pub battery: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TelemetryIn {
    pub temp: f32,
    pub humidity: f32,
    pub pressure: f32,
}

#[derive(Debug, Deserialize)]
pub struct TelemetryMsg {
    pub unit_id: String,
    #[serde(flatten)]
    pub reading: TelemetryIn,
    pub battery: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone)]
pub struct UnitState {
    pub unit_id: String,
    pub zone: String,
    pub class: String,
    pub status: UnitStatus,
    pub battery: Option<f32>,
    pub last_seen: OffsetDateTime,
    pub last_telemetry: Option<TelemetryIn>,
    pub alerts: u32,
}

pub type FleetMap = HashMap<String, UnitState>;
