//! Node configuration
//!
//! Handles:
//! - Unit identity and topic coordinates (domain / zone / class)
//! - Link attach budget and broker session settings
//! - Heartbeat, telemetry and detector tuning
//! - TOML loading from an env-selected or OS-specific location
//!
//! The configuration is read once at startup and never mutated afterwards.

use crate::detector::RearmPolicy;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env var pointing at the node's TOML file
pub const CONFIG_ENV: &str = "CARELINK_NODE_CONFIG";

/// Upper bound for any blocking local alarm
pub const MAX_ALARM: Duration = Duration::from_millis(2000);
/// Longest a single broker wait (connect or housekeeping pump) may hold the loop
pub const MAX_BLOCKING_SLICE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub unit: UnitConfig,
    pub link: LinkConfig,
    pub broker: BrokerConfig,
    pub heartbeat: HeartbeatConfig,
    #[serde(rename = "loop")]
    pub cycle: LoopConfig,
    pub alarm: AlarmConfig,
    pub battery: BatteryConfig,
    pub inputs: InputsConfig,
    pub impact: Option<ImpactConfig>,
    pub button: Option<ButtonConfig>,
    pub display: Option<DisplayConfig>,
    pub telemetry: Option<TelemetryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    pub name: String,
    pub domain: String,
    pub zone: String,
    pub class: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Restrict attachment to one interface (e.g. `wlan0`)
    pub interface: Option<String>,
    pub max_attempts: u32,
    pub attempt_interval_ms: u64,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
    pub connect_timeout_ms: u64,
    pub housekeep_slice_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub cycle_ms: u64,
    /// How often the loop logs its counters
    pub stats_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    pub fall_ms: u64,
    pub help_ms: u64,
    /// Buzz length when a display message arrives
    pub display_buzz_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    pub sysfs_path: Option<PathBuf>,
    pub fallback_volts: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputsConfig {
    /// Read button / accelerometer / env samples from stdin (bench runs)
    pub console: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    pub threshold_g: f32,
    pub cooldown_ms: u64,
    pub rearm: RearmPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonConfig {
    pub cooldown_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Seconds a message stays up when the sender gives no duration; 0 keeps it
    pub default_duration_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub interval_secs: u64,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            name: gethostname::gethostname().to_string_lossy().to_string(),
            domain: "home".to_string(),
            zone: "default".to_string(),
            class: "node".to_string(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            interface: None,
            max_attempts: 20,
            attempt_interval_ms: 500,
            retry_delay_ms: 5000,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            keep_alive_secs: 15,
            connect_timeout_ms: 250,
            housekeep_slice_ms: 5,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            cycle_ms: 10,
            stats_interval_secs: 300,
        }
    }
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            fall_ms: 1000,
            help_ms: 2000,
            display_buzz_ms: 500,
        }
    }
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            sysfs_path: None,
            fallback_volts: 0.0,
        }
    }
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self { console: true }
    }
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            threshold_g: 2.5,
            cooldown_ms: 3000,
            rearm: RearmPolicy::default(),
        }
    }
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self { cooldown_ms: 0 }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

impl NodeConfig {
    /// Load config from `$CARELINK_NODE_CONFIG` or the OS-specific location,
    /// falling back to defaults when no file exists
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Config file path: env override first, then `<config dir>/carelink-node/node.toml`
    pub fn config_file_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }

        let mut path = dirs::config_dir()?;
        path.push("carelink-node");
        path.push("node.toml");
        Some(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_segment("unit.name", &self.unit.name)?;
        check_segment("unit.domain", &self.unit.domain)?;
        check_segment("unit.zone", &self.unit.zone)?;
        check_segment("unit.class", &self.unit.class)?;

        if self.link.max_attempts == 0 {
            return Err(ConfigError::invalid("link.max_attempts", "must be at least 1"));
        }
        if self.broker.host.trim().is_empty() {
            return Err(ConfigError::invalid("broker.host", "must not be empty"));
        }
        if self.broker.keep_alive_secs == 0 {
            return Err(ConfigError::invalid("broker.keep_alive_secs", "must be at least 1"));
        }
        for (field, ms) in [
            ("broker.connect_timeout_ms", self.broker.connect_timeout_ms),
            ("broker.housekeep_slice_ms", self.broker.housekeep_slice_ms),
        ] {
            if Duration::from_millis(ms) > MAX_BLOCKING_SLICE {
                return Err(ConfigError::invalid(
                    field,
                    format!("{ms} ms exceeds the {} ms blocking cap", MAX_BLOCKING_SLICE.as_millis()),
                ));
            }
        }
        if self.heartbeat.interval_secs == 0 {
            return Err(ConfigError::invalid("heartbeat.interval_secs", "must be at least 1"));
        }
        if self.cycle.cycle_ms == 0 {
            return Err(ConfigError::invalid("loop.cycle_ms", "must be at least 1"));
        }

        for (field, ms) in [
            ("alarm.fall_ms", self.alarm.fall_ms),
            ("alarm.help_ms", self.alarm.help_ms),
            ("alarm.display_buzz_ms", self.alarm.display_buzz_ms),
        ] {
            if Duration::from_millis(ms) > MAX_ALARM {
                return Err(ConfigError::invalid(
                    field,
                    format!("{ms} ms exceeds the {} ms alarm cap", MAX_ALARM.as_millis()),
                ));
            }
        }

        if let Some(impact) = &self.impact {
            if !impact.threshold_g.is_finite() || impact.threshold_g <= 0.0 {
                return Err(ConfigError::invalid(
                    "impact.threshold_g",
                    format!("{} is not a positive finite value", impact.threshold_g),
                ));
            }
        }
        if let Some(telemetry) = &self.telemetry {
            if telemetry.interval_secs == 0 {
                return Err(ConfigError::invalid("telemetry.interval_secs", "must be at least 1"));
            }
        }

        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat.interval_secs)
    }

    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle.cycle_ms)
    }
}

/// Topic segments must be non-empty and free of MQTT separators/wildcards
fn check_segment(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty"));
    }
    if value.contains(['/', '+', '#']) {
        return Err(ConfigError::invalid(
            field,
            format!("'{value}' contains '/', '+' or '#'"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALL_NODE: &str = r#"
        [unit]
        name = "Belt_Fall_Detector"
        domain = "home"
        zone = "user_belt"
        class = "safety"

        [broker]
        host = "192.168.10.106"

        [impact]
        threshold_g = 2.5
        cooldown_ms = 3000
        rearm = "timer"
    "#;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.link.max_attempts, 20);
        assert_eq!(config.heartbeat.interval_secs, 30);
        assert!(config.impact.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = NodeConfig::from_toml_str(FALL_NODE).unwrap();
        assert_eq!(config.unit.zone, "user_belt");
        assert_eq!(config.broker.port, 1883);
        let impact = config.impact.unwrap();
        assert_eq!(impact.rearm, RearmPolicy::Timer);
        assert_eq!(impact.cooldown_ms, 3000);
        assert!(config.button.is_none());
    }

    #[test]
    fn test_empty_section_enables_feature_with_defaults() {
        let config = NodeConfig::from_toml_str("[display]\n[telemetry]\n").unwrap();
        assert!(config.display.is_some());
        assert_eq!(config.telemetry.unwrap().interval_secs, 5);
    }

    #[test]
    fn test_rejects_wildcard_in_zone() {
        let err = NodeConfig::from_toml_str("[unit]\nzone = \"kitchen/#\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "unit.zone", .. }));
    }

    #[test]
    fn test_rejects_alarm_above_cap() {
        let err = NodeConfig::from_toml_str("[alarm]\nhelp_ms = 5000\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "alarm.help_ms", .. }));
    }

    #[test]
    fn test_rejects_connect_timeout_above_cap() {
        let err = NodeConfig::from_toml_str("[broker]\nconnect_timeout_ms = 60000\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "broker.connect_timeout_ms", .. }));

        let err = NodeConfig::from_toml_str("[broker]\nhousekeep_slice_ms = 30000\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "broker.housekeep_slice_ms", .. }));

        assert!(NodeConfig::from_toml_str("[broker]\nconnect_timeout_ms = 500\nhousekeep_slice_ms = 20\n").is_ok());
    }

    #[test]
    fn test_rejects_non_positive_threshold() {
        let err = NodeConfig::from_toml_str("[impact]\nthreshold_g = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "impact.threshold_g", .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, FALL_NODE).unwrap();

        let config = NodeConfig::load_from(&path).unwrap();
        assert_eq!(config.unit.name, "Belt_Fall_Detector");
    }
}
