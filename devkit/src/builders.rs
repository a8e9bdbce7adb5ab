/*!
Builders de messages de test

Produit les payloads JSON tels que le dashboard et les nœuds les émettent.
*/

use serde_json::Value;

pub struct CareLinkMessageBuilder;

impl CareLinkMessageBuilder {
    /// Message pushed by the dashboard to `.../display`
    pub fn display_command(msg: &str, color: Option<&str>, duration: Option<u64>) -> Value {
        let mut command = serde_json::json!({ "msg": msg });
        if let Some(color) = color {
            command["color"] = Value::from(color);
        }
        if let Some(duration) = duration {
            command["duration"] = Value::from(duration);
        }
        command
    }

    pub fn display_bytes(msg: &str, color: Option<&str>, duration: Option<u64>) -> Vec<u8> {
        Self::display_command(msg, color, duration).to_string().into_bytes()
    }

    /// Heartbeat as published by a node
    pub fn status(unit_id: &str, status: &str, battery: f32) -> Value {
        serde_json::json!({
            "unit_id": unit_id,
            "status": status,
            "battery": battery
        })
    }

    pub fn fall_alert(unit_id: &str, g_force: f32, battery: f32) -> Value {
        serde_json::json!({
            "unit_id": unit_id,
            "event": "FALL_DETECTED",
            "priority": "CRITICAL",
            "g_force": g_force,
            "battery": battery
        })
    }

    pub fn help_request(unit_id: &str) -> Value {
        serde_json::json!({
            "unit_id": unit_id,
            "event": "CALL_FOR_HELP",
            "priority": "HIGH"
        })
    }
}
