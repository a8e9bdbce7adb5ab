use crate::models::{FleetMap, TelemetryIn, UnitState, UnitStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use time::OffsetDateTime;

/// Fleet map shared between the MQTT listener and the sweeper
#[derive(Clone, Default)]
pub struct Fleet {
    units: Arc<Mutex<FleetMap>>,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a unit seen on `zone/class`; returns true when it just came (back) online
    pub fn touch(&self, unit_id: &str, zone: &str, class: &str, battery: Option<f32>, now: OffsetDateTime) -> bool {
        let mut units = self.units.lock();
        let unit = units.entry(unit_id.to_string()).or_insert_with(|| UnitState {
            unit_id: unit_id.to_string(),
            zone: zone.to_string(),
            class: class.to_string(),
            status: UnitStatus::Offline,
            battery: None,
            last_seen: now,
            last_telemetry: None,
            alerts: 0,
        });
        let revived = unit.status == UnitStatus::Offline;
        unit.status = UnitStatus::Online;
        unit.last_seen = now;
        if battery.is_some() {
            unit.battery = battery;
        }
        revived
    }

    /// Returns false when the unit was already offline (or unknown)
    pub fn mark_offline(&self, unit_id: &str) -> bool {
        match self.units.lock().get_mut(unit_id) {
            Some(unit) if unit.status == UnitStatus::Online => {
                unit.status = UnitStatus::Offline;
                true
            }
            _ => false,
        }
    }

    pub fn record_alert(&self, unit_id: &str) {
        if let Some(unit) = self.units.lock().get_mut(unit_id) {
            unit.alerts += 1;
        }
    }

    pub fn record_telemetry(&self, unit_id: &str, reading: TelemetryIn) {
        if let Some(unit) = self.units.lock().get_mut(unit_id) {
            unit.last_telemetry = Some(reading);
        }
    }

    /// Mark every online unit silent for longer than `timeout` offline
    pub fn sweep(&self, now: OffsetDateTime, timeout: time::Duration) -> Vec<String> {
        let mut expired = Vec::new();
        for unit in self.units.lock().values_mut() {
            if unit.status == UnitStatus::Online && now - unit.last_seen > timeout {
                unit.status = UnitStatus::Offline;
                expired.push(unit.unit_id.clone());
            }
        }
        expired.sort();
        expired
    }

    pub fn get(&self, unit_id: &str) -> Option<UnitState> {
        self.units.lock().get(unit_id).cloned()
    }

    pub fn online_count(&self) -> usize {
        self.units
            .lock()
            .values()
            .filter(|u| u.status == UnitStatus::Online)
            .count()
    }

    pub fn len(&self) -> usize {
        self.units.lock().len()
    }
}
