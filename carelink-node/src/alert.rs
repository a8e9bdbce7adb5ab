//! Alert publisher
//!
//! Turns a [`Detection`] into:
//! - a best-effort outbound message (help -> button topic, fall -> alert topic)
//! - a bounded, blocking local alarm (red banner, optional vibration)
//!
//! The publish is attempted first so the bytes are on their way before the
//! loop stalls for the alarm. The alarm runs whatever the publish outcome;
//! there is no outbound queue and nothing is retried. Detections raised in
//! the same cycle share a single alarm, so a cycle never blocks longer than
//! [`MAX_ALARM`].

use crate::clock::Clock;
use crate::config::{AlarmConfig, MAX_ALARM};
use crate::detector::{Detection, EventClass};
use crate::error::PublishError;
use crate::hal::{Color, Peripherals};
use crate::messages::OutboundMessage;
use crate::session::{SessionManager, Transport};
use crate::topics::Topics;
use std::time::Duration;
use tracing::{error, info, warn};

/// What the local alarm shows and for how long
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmProfile {
    pub banner: &'static str,
    pub duration: Duration,
    pub haptic: bool,
}

impl AlarmProfile {
    pub fn new(banner: &'static str, duration: Duration, haptic: bool) -> Self {
        Self {
            banner,
            duration: duration.min(MAX_ALARM),
            haptic,
        }
    }

    /// One alarm standing for several: first banner, longest duration, haptic if any asks for it
    pub fn merge<'a>(profiles: impl IntoIterator<Item = &'a AlarmProfile>) -> Option<AlarmProfile> {
        profiles.into_iter().fold(None, |merged: Option<AlarmProfile>, p| {
            Some(match merged {
                None => p.clone(),
                Some(m) => AlarmProfile {
                    banner: m.banner,
                    duration: m.duration.max(p.duration),
                    haptic: m.haptic || p.haptic,
                },
            })
        })
    }

    /// Red banner plus a buzz: the only sanctioned blocking section of a cycle
    pub fn sound(&self, peripherals: &mut Peripherals, clock: &dyn Clock) {
        peripherals.display.render(self.banner, Color::Red);
        if self.haptic {
            peripherals.haptic.set(true);
        }
        clock.sleep(self.duration);
        if self.haptic {
            peripherals.haptic.set(false);
        }
        peripherals.display.clear();
    }
}

#[derive(Debug)]
pub struct AlertOutcome {
    pub class: EventClass,
    pub delivered: bool,
    pub error: Option<PublishError>,
}

pub struct AlertPublisher {
    unit_id: String,
    alert_topic: String,
    button_topic: String,
    fall: AlarmProfile,
    help: AlarmProfile,
}

impl AlertPublisher {
    pub fn new(unit_id: impl Into<String>, topics: &Topics, alarm: &AlarmConfig) -> Self {
        Self {
            unit_id: unit_id.into(),
            alert_topic: topics.alert.clone(),
            button_topic: topics.button.clone(),
            fall: AlarmProfile::new("FALL!", Duration::from_millis(alarm.fall_ms), true),
            help: AlarmProfile::new("CALLING...", Duration::from_millis(alarm.help_ms), false),
        }
    }

    pub fn profile(&self, class: EventClass) -> &AlarmProfile {
        match class {
            EventClass::Fall => &self.fall,
            EventClass::Help => &self.help,
        }
    }

    fn build(&self, detection: &Detection, battery: f32) -> Result<OutboundMessage, PublishError> {
        let message = match detection.class {
            EventClass::Fall => {
                OutboundMessage::fall(&self.alert_topic, &self.unit_id, detection.value, battery)?
            }
            EventClass::Help => OutboundMessage::help(&self.button_topic, &self.unit_id)?,
        };
        Ok(message)
    }

    /// Publish one detection best-effort, without sounding the alarm
    pub fn publish<T: Transport>(
        &self,
        detection: &Detection,
        session: &mut SessionManager<T>,
        peripherals: &mut Peripherals,
    ) -> AlertOutcome {
        let battery = peripherals.battery.volts();
        let result = self
            .build(detection, battery)
            .and_then(|message| session.publish(message));

        match result {
            Ok(()) => {
                info!("{:?} alert sent (value {:.2})", detection.class, detection.value);
                AlertOutcome {
                    class: detection.class,
                    delivered: true,
                    error: None,
                }
            }
            Err(e) => {
                match &e {
                    PublishError::Encode(_) => error!("{:?} alert could not be encoded: {}", detection.class, e),
                    _ => warn!("{:?} alert not delivered, local alarm only: {}", detection.class, e),
                }
                AlertOutcome {
                    class: detection.class,
                    delivered: false,
                    error: Some(e),
                }
            }
        }
    }

    pub fn publish_event<T: Transport>(
        &self,
        detection: &Detection,
        session: &mut SessionManager<T>,
        peripherals: &mut Peripherals,
        clock: &dyn Clock,
    ) -> AlertOutcome {
        let outcome = self.publish(detection, session, peripherals);
        self.profile(detection.class).sound(peripherals, clock);
        outcome
    }

    /// Publish every detection of a cycle, then sound one merged alarm
    pub fn publish_all<T: Transport>(
        &self,
        detections: &[Detection],
        session: &mut SessionManager<T>,
        peripherals: &mut Peripherals,
        clock: &dyn Clock,
    ) -> Vec<AlertOutcome> {
        let outcomes: Vec<_> = detections
            .iter()
            .map(|d| self.publish(d, session, peripherals))
            .collect();

        if let Some(alarm) = AlarmProfile::merge(detections.iter().map(|d| self.profile(d.class))) {
            alarm.sound(peripherals, clock);
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::hal::{BatteryGauge, Display, Haptic};
    use crate::link::ConnectionState;
    use crate::session::InboundMessage;
    use crate::topics::SubscriptionSet;
    use rumqttc::QoS;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::time::Instant;

    type Log = Rc<RefCell<Vec<String>>>;

    struct LogDisplay(Log);
    impl Display for LogDisplay {
        fn render(&mut self, text: &str, color: Color) {
            self.0.borrow_mut().push(format!("render {text} {color:?}"));
        }
        fn clear(&mut self) {
            self.0.borrow_mut().push("clear".into());
        }
    }

    struct LogHaptic(Log);
    impl Haptic for LogHaptic {
        fn set(&mut self, on: bool) {
            self.0.borrow_mut().push(format!("haptic {on}"));
        }
    }

    struct Battery;
    impl BatteryGauge for Battery {
        fn volts(&mut self) -> f32 {
            3.9
        }
    }

    struct SleepClock {
        start: Instant,
        slept: Cell<Duration>,
    }
    impl Clock for SleepClock {
        fn now(&self) -> Instant {
            self.start + self.slept.get()
        }
        fn sleep(&self, duration: Duration) {
            self.slept.set(self.slept.get() + duration);
        }
    }

    #[derive(Default)]
    struct Wire {
        sent: Vec<(String, QoS, Vec<u8>)>,
    }
    impl Transport for Wire {
        fn connect(&mut self) -> Result<(), SessionError> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            true
        }
        fn subscribe(&mut self, _topic: &str, _qos: QoS) -> Result<(), SessionError> {
            Ok(())
        }
        fn publish(&mut self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), PublishError> {
            self.sent.push((topic.to_string(), qos, payload));
            Ok(())
        }
        fn housekeep(&mut self) -> Vec<InboundMessage> {
            Vec::new()
        }
        fn disconnect(&mut self) {}
    }

    fn setup() -> (AlertPublisher, Peripherals, Log, SleepClock) {
        let log: Log = Rc::default();
        let peripherals = Peripherals {
            display: Box::new(LogDisplay(log.clone())),
            haptic: Box::new(LogHaptic(log.clone())),
            battery: Box::new(Battery),
        };
        let topics = Topics::new("home", "user_belt", "safety");
        let publisher = AlertPublisher::new("Belt_Fall_Detector", &topics, &AlarmConfig::default());
        let clock = SleepClock {
            start: Instant::now(),
            slept: Cell::new(Duration::ZERO),
        };
        (publisher, peripherals, log, clock)
    }

    fn fall(value: f32) -> Detection {
        Detection {
            class: EventClass::Fall,
            value,
            at: Instant::now(),
        }
    }

    #[test]
    fn test_fall_published_then_alarm() {
        let (publisher, mut peripherals, log, clock) = setup();
        let mut session = SessionManager::new(Wire::default(), SubscriptionSet::default());
        session.poll(ConnectionState::Attached);

        let outcome = publisher.publish_event(&fall(3.0), &mut session, &mut peripherals, &clock);
        assert!(outcome.delivered);

        let sent = &session.transport().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "home/user_belt/safety/alert");
        assert_eq!(sent[0].1, QoS::AtLeastOnce);
        let body: serde_json::Value = serde_json::from_slice(&sent[0].2).unwrap();
        assert!((body["battery"].as_f64().unwrap() - 3.9).abs() < 1e-3);

        assert_eq!(clock.slept.get(), Duration::from_millis(1000));
        assert_eq!(
            *log.borrow(),
            vec!["render FALL! Red", "haptic true", "haptic false", "clear"]
        );
    }

    #[test]
    fn test_alarm_runs_without_session() {
        let (publisher, mut peripherals, log, clock) = setup();
        let mut session = SessionManager::new(Wire::default(), SubscriptionSet::default());

        let help = Detection {
            class: EventClass::Help,
            value: 1.0,
            at: Instant::now(),
        };
        let outcome = publisher.publish_event(&help, &mut session, &mut peripherals, &clock);

        assert!(!outcome.delivered);
        assert!(matches!(outcome.error, Some(PublishError::NoSession)));
        assert!(session.transport().sent.is_empty());
        assert_eq!(clock.slept.get(), Duration::from_millis(2000));
        assert_eq!(log.borrow()[0], "render CALLING... Red");
    }

    #[test]
    fn test_simultaneous_alerts_share_one_alarm() {
        let (publisher, mut peripherals, log, clock) = setup();
        let mut session = SessionManager::new(Wire::default(), SubscriptionSet::default());
        session.poll(ConnectionState::Attached);

        let help = Detection {
            class: EventClass::Help,
            value: 1.0,
            at: Instant::now(),
        };
        let outcomes = publisher.publish_all(&[fall(3.0), help], &mut session, &mut peripherals, &clock);

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.delivered));
        assert_eq!(session.transport().sent.len(), 2);
        // 1 s fall + 2 s help collapse into a single 2 s alarm
        assert_eq!(clock.slept.get(), Duration::from_millis(2000));
        assert!(clock.slept.get() <= MAX_ALARM);
        assert_eq!(
            *log.borrow(),
            vec!["render FALL! Red", "haptic true", "haptic false", "clear"]
        );
    }

    #[test]
    fn test_no_detection_no_alarm() {
        let (publisher, mut peripherals, log, clock) = setup();
        let mut session = SessionManager::new(Wire::default(), SubscriptionSet::default());

        assert!(publisher.publish_all(&[], &mut session, &mut peripherals, &clock).is_empty());
        assert_eq!(clock.slept.get(), Duration::ZERO);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_profile_duration_is_capped() {
        let profile = AlarmProfile::new("FALL!", Duration::from_secs(10), true);
        assert_eq!(profile.duration, MAX_ALARM);
    }
}
