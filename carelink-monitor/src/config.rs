use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    pub mqtt: MqttConf,
    /// First topic segment shared by every unit of the fleet
    pub domain: String,
    /// Silence after which a unit is considered offline (3 heartbeats)
    pub offline_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "carelink-monitor".into(),
            keep_alive_secs: 15,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConf::default(),
            domain: "home".into(),
            offline_timeout_secs: 90,
            sweep_interval_secs: 10,
        }
    }
}

impl MonitorConfig {
    pub fn offline_timeout(&self) -> Duration {
        Duration::from_secs(self.offline_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Resolve `CARELINK_MONITOR_CONFIG` (default `monitor.yaml`) and load it
pub async fn load_config() -> MonitorConfig {
    let path = std::env::var("CARELINK_MONITOR_CONFIG").unwrap_or_else(|_| "monitor.yaml".into());
    load_config_from(Path::new(&path)).await
}

/// Missing, empty or invalid files fall back to defaults
pub async fn load_config_from(path: &Path) -> MonitorConfig {
    if !path.exists() {
        info!("No {}, using default monitor config", path.display());
        return MonitorConfig::default();
    }
    let txt = fs::read_to_string(path).await.unwrap_or_default();
    if txt.trim().is_empty() {
        return MonitorConfig::default();
    }
    serde_yaml::from_str(&txt).unwrap_or_else(|e| {
        warn!("Invalid monitor config {}: {}", path.display(), e);
        MonitorConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("carelink-monitor-{}-{}.yaml", name, std::process::id()))
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let cfg = load_config_from(&scratch("missing")).await;
        assert_eq!(cfg, MonitorConfig::default());
        assert_eq!(cfg.offline_timeout(), Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_partial_yaml_keeps_other_defaults() {
        let path = scratch("partial");
        fs::write(&path, "domain: clinic\nmqtt:\n  host: broker.local\n").await.unwrap();

        let cfg = load_config_from(&path).await;
        let _ = fs::remove_file(&path).await;

        assert_eq!(cfg.domain, "clinic");
        assert_eq!(cfg.mqtt.host, "broker.local");
        assert_eq!(cfg.mqtt.port, 1883);
        assert_eq!(cfg.sweep_interval_secs, 10);
    }

    #[tokio::test]
    async fn test_invalid_yaml_falls_back() {
        let path = scratch("invalid");
        fs::write(&path, "offline_timeout_secs: [not, a, number]\n").await.unwrap();

        let cfg = load_config_from(&path).await;
        let _ = fs::remove_file(&path).await;

        assert_eq!(cfg, MonitorConfig::default());
    }

    #[test]
    fn test_sweep_interval_never_zero() {
        let cfg = MonitorConfig {
            sweep_interval_secs: 0,
            ..MonitorConfig::default()
        };
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(1));
    }
}
