//! Node control loop
//!
//! One cooperative cycle, always in the same order:
//! 1. link poll
//! 2. session poll (gated on the link)
//! 3. session housekeeping, every cycle
//! 4. inbound display commands, then display expiry
//! 5. heartbeat, then telemetry
//! 6. detectors, then the alert publisher for whatever they fired
//!
//! Detectors run whether or not a session exists: an offline node still
//! sounds its local alarm. Only the alarm and the display buzz block, both
//! capped at [`MAX_ALARM`](crate::config::MAX_ALARM); detections of the same
//! cycle share one alarm. Broker I/O is bounded by
//! [`MAX_BLOCKING_SLICE`](crate::config::MAX_BLOCKING_SLICE).
//!
//! Telemetry leaves the screen alone while a dashboard message is held.

use crate::alert::{AlertOutcome, AlertPublisher};
use crate::clock::{Clock, IntervalTimer};
use crate::config::NodeConfig;
use crate::detector::Detector;
use crate::error::DecodeError;
use crate::hal::{Color, Display, EnvSensor, Peripherals};
use crate::heartbeat::{HeartbeatScheduler, HeartbeatTick};
use crate::link::{ConnectionState, LinkDriver, LinkManager};
use crate::messages::DisplayCommand;
use crate::session::{InboundMessage, SessionManager, SessionState, Transport};
use crate::telemetry::{TelemetryReporter, TelemetryTick};
use crate::topics::{SubscriptionSet, Topics};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Loop counters, logged every `loop.stats_interval_secs`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub cycles: u64,
    pub heartbeats_sent: u64,
    pub heartbeats_dropped: u64,
    pub telemetry_sent: u64,
    pub telemetry_dropped: u64,
    pub alerts: u64,
    pub alerts_delivered: u64,
    pub publish_failures: u64,
    pub display_commands: u64,
    pub decode_errors: u64,
    pub sessions_established: u32,
    pub link_failures: u32,
}

pub struct Node<C: Clock, L: LinkDriver, T: Transport> {
    unit_id: String,
    topics: Topics,
    clock: C,
    link: LinkManager<L>,
    session: SessionManager<T>,
    heartbeat: HeartbeatScheduler,
    telemetry: Option<TelemetryReporter>,
    telemetry_interval: Option<Duration>,
    detectors: Vec<Box<dyn Detector>>,
    publisher: AlertPublisher,
    peripherals: Peripherals,
    display_buzz: Duration,
    display_hold: Option<Duration>,
    display_until: Option<Instant>,
    cycle_delay: Duration,
    stats: NodeStats,
    stats_timer: IntervalTimer,
}

impl<C: Clock, L: LinkDriver, T: Transport> Node<C, L, T> {
    pub fn new(config: &NodeConfig, clock: C, link: L, transport: T, mut peripherals: Peripherals) -> Self {
        let topics = Topics::from_config(config);
        let subscriptions = SubscriptionSet::from_config(config, &topics);
        let unit_id = config.unit.name.clone();

        let mut stats_timer = IntervalTimer::new(Duration::from_secs(config.cycle.stats_interval_secs));
        stats_timer.mark(clock.now());

        peripherals
            .display
            .render(&format!("{unit_id} ACTIVE"), Color::Default);
        info!(
            "Node {} ready - status on {}, {} subscriptions",
            unit_id,
            topics.status,
            subscriptions.len()
        );

        Self {
            heartbeat: HeartbeatScheduler::new(config.heartbeat_interval(), &topics.status, &unit_id),
            publisher: AlertPublisher::new(&unit_id, &topics, &config.alarm),
            link: LinkManager::new(link, &config.link),
            session: SessionManager::new(transport, subscriptions),
            telemetry: None,
            telemetry_interval: config.telemetry.as_ref().map(|t| Duration::from_secs(t.interval_secs)),
            detectors: Vec::new(),
            display_buzz: Duration::from_millis(config.alarm.display_buzz_ms),
            display_hold: config
                .display
                .as_ref()
                .map(|d| Duration::from_secs(d.default_duration_secs))
                .filter(|d| !d.is_zero()),
            display_until: None,
            cycle_delay: config.cycle_delay(),
            stats: NodeStats::default(),
            stats_timer,
            unit_id,
            topics,
            clock,
            peripherals,
        }
    }

    pub fn add_detector(&mut self, detector: Box<dyn Detector>) {
        debug!("Detector registered: {:?}", detector.class());
        self.detectors.push(detector);
    }

    /// Wire the environment sensor; ignored unless `[telemetry]` is configured
    pub fn attach_env_sensor(&mut self, sensor: Box<dyn EnvSensor>) {
        let Some(interval) = self.telemetry_interval else {
            debug!("No [telemetry] section, environment sensor left unused");
            return;
        };
        let mut reporter = TelemetryReporter::new(sensor, interval, &self.topics.telemetry, &self.unit_id);
        reporter.probe(self.peripherals.display.as_mut());
        self.telemetry = Some(reporter);
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn link(&self) -> &LinkManager<L> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut LinkManager<L> {
        &mut self.link
    }

    pub fn session(&self) -> &SessionManager<T> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionManager<T> {
        &mut self.session
    }

    pub fn telemetry(&self) -> Option<&TelemetryReporter> {
        self.telemetry.as_ref()
    }

    pub fn stats(&self) -> NodeStats {
        let mut stats = self.stats.clone();
        stats.sessions_established = self.session.established();
        stats.link_failures = self.link.failures();
        stats
    }

    /// One full cycle; returns the alerts raised during it
    pub fn tick(&mut self) -> Vec<AlertOutcome> {
        let now = self.clock.now();
        self.stats.cycles += 1;

        let link_state = self.link.poll(now, self.peripherals.display.as_mut());
        let session_state = self.session.poll(link_state);
        debug_assert!(session_state != SessionState::SessionActive || link_state == ConnectionState::Attached);

        for message in self.session.housekeep() {
            self.apply_inbound(message);
        }
        self.expire_display(self.clock.now());

        let now = self.clock.now();
        // Housekeeping may have noticed a drop
        let session_state = self.session.state();
        match self.heartbeat.tick(
            now,
            session_state,
            self.peripherals.battery.as_mut(),
            |m| self.session.publish(m),
        ) {
            HeartbeatTick::Published => self.stats.heartbeats_sent += 1,
            HeartbeatTick::Dropped => {
                self.stats.heartbeats_dropped += 1;
                self.stats.publish_failures += 1;
            }
            HeartbeatTick::Idle => {}
        }

        if let Some(telemetry) = self.telemetry.as_mut() {
            let display: Option<&mut dyn Display> = match self.display_until {
                Some(_) => None,
                None => Some(self.peripherals.display.as_mut() as &mut dyn Display),
            };
            match telemetry.tick(now, self.peripherals.battery.as_mut(), display, |m| {
                self.session.publish(m)
            }) {
                TelemetryTick::Published => self.stats.telemetry_sent += 1,
                TelemetryTick::Dropped => {
                    self.stats.telemetry_dropped += 1;
                    self.stats.publish_failures += 1;
                }
                TelemetryTick::Idle | TelemetryTick::Disabled => {}
            }
        }

        let detections: Vec<_> = self
            .detectors
            .iter_mut()
            .filter_map(|d| d.poll(now))
            .collect();

        let outcomes = self.publisher.publish_all(
            &detections,
            &mut self.session,
            &mut self.peripherals,
            &self.clock,
        );
        for outcome in &outcomes {
            self.stats.alerts += 1;
            if outcome.delivered {
                self.stats.alerts_delivered += 1;
            } else {
                self.stats.publish_failures += 1;
            }
        }
        if !outcomes.is_empty() {
            // The alarm cleared the screen
            self.display_until = None;
        }

        if self.stats_timer.is_due(now) {
            self.stats_timer.mark(now);
            self.log_stats();
        }

        outcomes
    }

    fn apply_inbound(&mut self, message: InboundMessage) {
        let command = if message.topic == self.topics.display {
            DisplayCommand::decode(&message.payload)
        } else {
            Err(DecodeError::UnknownTopic(message.topic))
        };

        let command = match command {
            Ok(c) => c,
            Err(e) => {
                warn!("Inbound message discarded: {}", e);
                self.stats.decode_errors += 1;
                return;
            }
        };

        info!("Display message: {:?} ({:?})", command.msg, command.color());
        self.stats.display_commands += 1;
        self.peripherals.display.render(&command.msg, command.color());
        self.peripherals.haptic.set(true);
        self.clock.sleep(self.display_buzz);
        self.peripherals.haptic.set(false);

        let hold = command.duration.map(Duration::from_secs).or(self.display_hold);
        self.display_until = hold.filter(|d| !d.is_zero()).map(|d| self.clock.now() + d);
    }

    fn expire_display(&mut self, now: Instant) {
        if let Some(until) = self.display_until {
            if now >= until {
                debug!("Display message expired");
                self.peripherals.display.clear();
                self.display_until = None;
            }
        }
    }

    fn log_stats(&self) {
        let stats = self.stats();
        info!(
            "Stats: {} cycles, link {:?} ({} failures), {} sessions, heartbeats {}/{} dropped, alerts {}/{} delivered, {} publish failures, {} decode errors",
            stats.cycles,
            self.link.state(),
            stats.link_failures,
            stats.sessions_established,
            stats.heartbeats_sent,
            stats.heartbeats_dropped,
            stats.alerts_delivered,
            stats.alerts,
            stats.publish_failures,
            stats.decode_errors,
        );
    }

    /// Run `cycles` iterations with the configured delay between them
    pub fn run_cycles(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.tick();
            self.clock.sleep(self.cycle_delay);
        }
    }

    pub fn run(&mut self) -> ! {
        info!("Entering control loop ({:?} cycle)", self.cycle_delay);
        loop {
            self.tick();
            self.clock.sleep(self.cycle_delay);
        }
    }
}
