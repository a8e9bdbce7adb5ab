//! Battery gauge backed by the Linux power-supply class
//!
//! Reads `voltage_now` (microvolts) from the configured sysfs file, or from
//! the first `/sys/class/power_supply/*/voltage_now` found. Hosts without a
//! battery report the configured fallback.

use crate::config::BatteryConfig;
use crate::hal::BatteryGauge;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";

pub struct SysfsBattery {
    path: Option<PathBuf>,
    fallback: f32,
    warned: bool,
}

impl SysfsBattery {
    pub fn new(config: &BatteryConfig) -> Self {
        let path = config
            .sysfs_path
            .clone()
            .or_else(|| discover(Path::new(POWER_SUPPLY_DIR)));
        match &path {
            Some(p) => debug!("Battery voltage from {}", p.display()),
            None => debug!("No battery found, reporting {} V", config.fallback_volts),
        }
        Self {
            path,
            fallback: config.fallback_volts,
            warned: false,
        }
    }
}

impl BatteryGauge for SysfsBattery {
    fn volts(&mut self) -> f32 {
        let Some(path) = &self.path else {
            return self.fallback;
        };
        match read_microvolts(path) {
            Ok(uv) => uv as f32 / 1_000_000.0,
            Err(e) => {
                if !self.warned {
                    warn!("Battery read from {} failed: {}", path.display(), e);
                    self.warned = true;
                }
                self.fallback
            }
        }
    }
}

fn read_microvolts(path: &Path) -> std::io::Result<u64> {
    let raw = fs::read_to_string(path)?;
    raw.trim()
        .parse::<u64>()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// First supply exposing `voltage_now`, batteries (`BAT*`) preferred
fn discover(dir: &Path) -> Option<PathBuf> {
    let mut supplies: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.join("voltage_now").is_file())
        .collect();
    supplies.sort_by_key(|p| {
        let is_battery = p
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("BAT"));
        (!is_battery, p.clone())
    });
    supplies.into_iter().next().map(|p| p.join("voltage_now"))
}
