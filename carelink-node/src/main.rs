//! CareLink node - connectivity and event-delivery loop for one unit
//!
//! Configuration comes from `$CARELINK_NODE_CONFIG` or the OS config dir
//! (see `NodeConfig::load`). Which features run is decided by the config
//! sections present: `[impact]` for fall detection, `[button]` for the help
//! button, `[display]` for dashboard messages, `[telemetry]` for environment
//! reports.

use anyhow::{Context, Result};
use carelink_node::clock::SystemClock;
use carelink_node::detector::{fall_detector, help_detector};
use carelink_node::drivers::{ConsoleInputs, HostLink, MqttTransport, SysfsBattery, TracingDisplay, TracingHaptic};
use carelink_node::hal::Peripherals;
use carelink_node::messages::offline_payload;
use carelink_node::topics::Topics;
use carelink_node::{Node, NodeConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("CareLink node v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = NodeConfig::load().context("Failed to load node configuration")?;
    let topics = Topics::from_config(&config);
    info!(
        "Unit {} ({}/{}/{}) - broker {}:{}",
        config.unit.name, config.unit.domain, config.unit.zone, config.unit.class, config.broker.host, config.broker.port
    );

    let will = offline_payload(&config.unit.name).context("Failed to encode last will")?;
    let transport = MqttTransport::new(&config.broker, &config.unit.name, &topics.status, will)
        .context("Failed to create MQTT transport")?;

    let peripherals = Peripherals {
        display: Box::new(TracingDisplay::new()),
        haptic: Box::new(TracingHaptic::new()),
        battery: Box::new(SysfsBattery::new(&config.battery)),
    };

    let mut node = Node::new(
        &config,
        SystemClock,
        HostLink::new(config.link.interface.clone()),
        transport,
        peripherals,
    );

    let wants_inputs = config.impact.is_some() || config.button.is_some() || config.telemetry.is_some();
    if wants_inputs {
        if config.inputs.console {
            let inputs = ConsoleInputs::spawn();
            if let Some(impact) = &config.impact {
                node.add_detector(fall_detector(inputs.accelerometer, impact));
            }
            if let Some(button) = &config.button {
                node.add_detector(help_detector(inputs.button, button));
            }
            node.attach_env_sensor(Box::new(inputs.env));
            info!("Console inputs enabled (press | g <x> <y> <z> | env <t> <h> <p>)");
        } else {
            warn!("Detectors or telemetry configured but no input source enabled");
        }
    }

    node.run()
}
