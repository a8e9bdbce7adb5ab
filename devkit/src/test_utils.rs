/*!
Test Harness pour nœuds CareLink

Monte un `Node` complet sur des doubles:
- horloge manuelle, lien et transport scriptés
- écran / vibreur enregistreurs, capteurs pilotables
- assertions sur les messages publiés
*/

use crate::builders::CareLinkMessageBuilder;
use crate::fakes::{
    FakeClock, FakeLink, FixedBattery, RecordingDisplay, RecordingHaptic, ScriptedAccelerometer, ScriptedButton,
    ScriptedEnv,
};
use crate::mock_transport::MockTransport;
use anyhow::Result;
use carelink_node::alert::AlertOutcome;
use carelink_node::clock::Clock;
use carelink_node::config::{ButtonConfig, DisplayConfig, ImpactConfig, NodeConfig, TelemetryConfig};
use carelink_node::detector::{fall_detector, help_detector};
use carelink_node::hal::{EnvReading, Peripherals};
use carelink_node::link::ConnectionState;
use carelink_node::session::SessionState;
use carelink_node::topics::Topics;
use carelink_node::{Node, NodeStats};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

pub type TestNode = Node<FakeClock, FakeLink, MockTransport>;

/// Battery voltage reported by every harness node
pub const TEST_BATTERY: f32 = 4.0;

/// Install a test-friendly tracing subscriber (idempotent)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Configs for the three deployed device roles
pub mod profiles {
    use super::*;

    fn base(name: &str, zone: &str, class: &str) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.unit.name = name.to_string();
        config.unit.domain = "home".to_string();
        config.unit.zone = zone.to_string();
        config.unit.class = class.to_string();
        config
    }

    /// Bedside unit: help button + dashboard display
    pub fn comm() -> NodeConfig {
        let mut config = base("Bedside_Comm_Unit", "bedside", "comm");
        config.button = Some(ButtonConfig::default());
        config.display = Some(DisplayConfig::default());
        config
    }

    /// Belt unit: impact detection
    pub fn fall() -> NodeConfig {
        let mut config = base("Belt_Fall_Detector", "user_belt", "safety");
        config.impact = Some(ImpactConfig::default());
        config
    }

    /// Living-room unit: environment telemetry
    pub fn env() -> NodeConfig {
        let mut config = base("Living_Room_Env", "living_room", "env");
        config.telemetry = Some(TelemetryConfig::default());
        config
    }
}

/// Complete node on doubles, with handles on every collaborator
pub struct NodeHarness {
    pub node: TestNode,
    pub topics: Topics,
    pub clock: FakeClock,
    pub link: FakeLink,
    pub transport: MockTransport,
    pub display: RecordingDisplay,
    pub haptic: RecordingHaptic,
    pub accelerometer: ScriptedAccelerometer,
    pub button: ScriptedButton,
    pub env: ScriptedEnv,
    cycle: Duration,
}

impl NodeHarness {
    /// Link attaching on the third check, steady 21.5 C environment
    pub fn new(config: NodeConfig) -> Self {
        Self::with_parts(
            config,
            FakeLink::attaching_after(3),
            ScriptedEnv::steady(EnvReading {
                temp: 21.5,
                humidity: 40.0,
                pressure: 101_325.0,
            }),
        )
    }

    pub fn with_parts(config: NodeConfig, link: FakeLink, env: ScriptedEnv) -> Self {
        init_tracing();

        let clock = FakeClock::new();
        let transport = MockTransport::new();
        let display = RecordingDisplay::default();
        let haptic = RecordingHaptic::default();
        let accelerometer = ScriptedAccelerometer::resting();
        let button = ScriptedButton::default();

        let peripherals = Peripherals {
            display: Box::new(display.clone()),
            haptic: Box::new(haptic.clone()),
            battery: Box::new(FixedBattery(TEST_BATTERY)),
        };

        let mut node = Node::new(&config, clock.clone(), link.clone(), transport.clone(), peripherals);
        if let Some(impact) = &config.impact {
            node.add_detector(fall_detector(accelerometer.clone(), impact));
        }
        if let Some(button_config) = &config.button {
            node.add_detector(help_detector(button.clone(), button_config));
        }
        node.attach_env_sensor(Box::new(env.clone()));

        Self {
            node,
            topics: Topics::from_config(&config),
            clock,
            link,
            transport,
            display,
            haptic,
            accelerometer,
            button,
            env,
            cycle: config.cycle_delay(),
        }
    }

    pub fn tick(&mut self) -> Vec<AlertOutcome> {
        self.node.tick()
    }

    /// One cycle followed by the configured loop delay
    pub fn step(&mut self) -> Vec<AlertOutcome> {
        let outcomes = self.node.tick();
        self.clock.sleep(self.cycle);
        outcomes
    }

    /// Step until at least `duration` of fake time has elapsed
    pub fn run_for(&mut self, duration: Duration) -> Vec<AlertOutcome> {
        let end = self.clock.now() + duration;
        let mut outcomes = Vec::new();
        while self.clock.now() < end {
            outcomes.extend(self.step());
        }
        outcomes
    }

    /// Step until the session is active; fails after `limit` of fake time
    pub fn bring_online(&mut self, limit: Duration) -> Result<()> {
        let end = self.clock.now() + limit;
        while self.clock.now() < end {
            self.step();
            if self.session_state() == SessionState::SessionActive {
                info!("Harness online after {:?}", self.clock.elapsed());
                return Ok(());
            }
        }
        anyhow::bail!(
            "session not active after {:?} (link {:?})",
            limit,
            self.link_state()
        );
    }

    pub fn link_state(&self) -> ConnectionState {
        self.node.link().state()
    }

    pub fn session_state(&self) -> SessionState {
        self.node.session().state()
    }

    pub fn stats(&self) -> NodeStats {
        self.node.stats()
    }

    /// Dashboard pushes a message to this unit's display topic
    pub fn send_display(&self, msg: &str, color: Option<&str>, duration: Option<u64>) {
        let payload = CareLinkMessageBuilder::display_bytes(msg, color, duration);
        self.transport.simulate_incoming(self.topics.display.clone(), payload);
    }

    pub fn heartbeats(&self) -> usize {
        self.transport.find_messages_by_topic(&self.topics.status).len()
    }

    pub fn fall_alerts(&self) -> usize {
        self.transport.find_messages_by_topic(&self.topics.alert).len()
    }

    pub fn help_alerts(&self) -> usize {
        self.transport.find_messages_by_topic(&self.topics.button).len()
    }

    /// Assert a field of the last message on `topic`
    pub fn assert_field_equals(&self, topic: &str, field: &str, expected: &Value) -> Result<()> {
        let Some(message) = self.transport.get_last_json_message::<Value>(topic)? else {
            anyhow::bail!("no message published on {}", topic);
        };
        match message.get(field) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => anyhow::bail!("field '{}' mismatch: expected {:?}, got {:?}", field, expected, actual),
            None => anyhow::bail!("field '{}' missing in last message on {}", field, topic),
        }
    }

    /// Messages per topic, for quick overviews in failing tests
    pub fn topic_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for message in self.transport.get_published_messages() {
            *counts.entry(message.topic).or_insert(0) += 1;
        }
        counts
    }
}
