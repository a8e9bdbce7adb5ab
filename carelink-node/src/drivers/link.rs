//! Host link driver
//!
//! On a host the OS owns association; the driver only decides whether a
//! usable interface is up and which address it holds:
//! - Interface enumeration with `if-addrs`
//! - Optional pinning to a configured interface name
//! - Primary address selection with priority (Ethernet > WiFi > Other)

use crate::error::LinkError;
use crate::link::LinkDriver;
use if_addrs::{get_if_addrs, IfAddr};
use std::net::IpAddr;
use tracing::{debug, info};

/// Interface type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceType {
    Ethernet,
    Wireless,
    Loopback,
    Other,
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub ip: IpAddr,
    pub interface_type: InterfaceType,
}

pub struct HostLink {
    interface: Option<String>,
    attached: Option<Candidate>,
}

impl HostLink {
    pub fn new(interface: Option<String>) -> Self {
        Self {
            interface,
            attached: None,
        }
    }

    fn enumerate(&self) -> Result<Vec<Candidate>, LinkError> {
        let if_addrs = get_if_addrs().map_err(|e| LinkError::Driver(e.to_string()))?;

        let candidates = if_addrs
            .into_iter()
            .filter(|a| !a.is_loopback())
            .filter_map(|a| match a.addr {
                IfAddr::V4(v4) => Some(Candidate {
                    interface_type: classify_interface(&a.name),
                    name: a.name,
                    ip: IpAddr::V4(v4.ip),
                }),
                IfAddr::V6(_) => None,
            })
            .filter(|c| match &self.interface {
                Some(wanted) => &c.name == wanted,
                None => true,
            })
            .collect();

        Ok(candidates)
    }
}

impl LinkDriver for HostLink {
    fn begin(&mut self) -> Result<(), LinkError> {
        // Association belongs to the OS; make sure the interface list is readable
        let candidates = self.enumerate()?;
        debug!("Link begin: {} candidate interfaces", candidates.len());
        Ok(())
    }

    fn is_attached(&mut self) -> bool {
        let candidates = match self.enumerate() {
            Ok(c) => c,
            Err(e) => {
                debug!("Interface enumeration failed: {}", e);
                self.attached = None;
                return false;
            }
        };

        let primary = select_primary(&candidates).cloned();
        if let Some(c) = &primary {
            let changed = self.attached.as_ref().map(|a| a.ip) != Some(c.ip);
            if changed {
                info!("Using {:?} interface {} ({})", c.interface_type, c.name, c.ip);
            }
        }
        self.attached = primary;
        self.attached.is_some()
    }

    fn local_addr(&self) -> Option<IpAddr> {
        self.attached.as_ref().map(|c| c.ip)
    }

    fn target(&self) -> String {
        self.interface
            .clone()
            .unwrap_or_else(|| "any interface".to_string())
    }
}

/// Classify interface type based on name patterns
pub fn classify_interface(name: &str) -> InterfaceType {
    let name_lower = name.to_lowercase();

    if name_lower == "lo" || name_lower.starts_with("lo0") {
        return InterfaceType::Loopback;
    }

    if name_lower.contains("wlan")
        || name_lower.contains("wifi")
        || name_lower.starts_with("wlp")
        || name_lower.starts_with("wlo")
    {
        return InterfaceType::Wireless;
    }

    if name_lower.starts_with("eth") || name_lower.starts_with("en") {
        return InterfaceType::Ethernet;
    }

    InterfaceType::Other
}

/// Ethernet first, then wireless, then anything else
pub fn select_primary(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates
        .iter()
        .find(|c| c.interface_type == InterfaceType::Ethernet)
        .or_else(|| {
            candidates
                .iter()
                .find(|c| c.interface_type == InterfaceType::Wireless)
        })
        .or_else(|| candidates.first())
}
