//! Environment telemetry reporter
//!
//! Runs on its own timer, independent of the heartbeat. Each due tick reads
//! the sensor, refreshes the local screen (when the caller lends it) and
//! publishes best-effort. A failed
//! read keeps the previous values; a sensor missing at startup disables the
//! reporter for the rest of the run instead of halting the node.

use crate::clock::IntervalTimer;
use crate::error::{PublishError, SensorError};
use crate::hal::{BatteryGauge, Color, Display, EnvReading, EnvSensor};
use crate::messages::OutboundMessage;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryTick {
    Idle,
    Published,
    Dropped,
    Disabled,
}

pub struct TelemetryReporter {
    sensor: Option<Box<dyn EnvSensor>>,
    timer: IntervalTimer,
    topic: String,
    unit_id: String,
    last: EnvReading,
    read_failures: u64,
}

impl TelemetryReporter {
    pub fn new(
        sensor: Box<dyn EnvSensor>,
        interval: Duration,
        topic: impl Into<String>,
        unit_id: impl Into<String>,
    ) -> Self {
        Self {
            sensor: Some(sensor),
            timer: IntervalTimer::new(interval),
            topic: topic.into(),
            unit_id: unit_id.into(),
            last: EnvReading::default(),
            read_failures: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sensor.is_some()
    }

    pub fn last_reading(&self) -> EnvReading {
        self.last
    }

    pub fn read_failures(&self) -> u64 {
        self.read_failures
    }

    /// Startup check; a missing sensor disables the reporter and says so on screen
    pub fn probe(&mut self, display: &mut dyn Display) {
        let Some(sensor) = self.sensor.as_mut() else {
            return;
        };
        match sensor.read() {
            Ok(reading) => self.last = reading,
            Err(e @ SensorError::Unavailable(_)) => {
                error!("Environment sensor missing, telemetry disabled: {}", e);
                display.render("Sensor Missing!", Color::Red);
                self.sensor = None;
            }
            Err(e) => {
                warn!("Initial environment read failed: {}", e);
                self.read_failures += 1;
            }
        }
    }

    pub fn tick<F>(
        &mut self,
        now: Instant,
        gauge: &mut dyn BatteryGauge,
        display: Option<&mut dyn Display>,
        publish: F,
    ) -> TelemetryTick
    where
        F: FnOnce(OutboundMessage) -> Result<(), PublishError>,
    {
        let Some(sensor) = self.sensor.as_mut() else {
            return TelemetryTick::Disabled;
        };
        if !self.timer.is_due(now) {
            return TelemetryTick::Idle;
        }
        self.timer.mark(now);

        match sensor.read() {
            Ok(reading) => self.last = reading,
            Err(e) => {
                self.read_failures += 1;
                warn!("Environment read failed, reporting previous values: {}", e);
            }
        }

        if let Some(display) = display {
            display.render(&render_reading(&self.last), Color::Default);
        }

        let battery = gauge.volts();
        let result = OutboundMessage::telemetry(&self.topic, &self.unit_id, self.last, battery)
            .map_err(PublishError::from)
            .and_then(publish);
        match result {
            Ok(()) => {
                debug!(
                    "Telemetry sent: {:.1} C, {:.1} %, {:.0} Pa",
                    self.last.temp, self.last.humidity, self.last.pressure
                );
                TelemetryTick::Published
            }
            Err(e) => {
                debug!("Telemetry dropped: {}", e);
                TelemetryTick::Dropped
            }
        }
    }
}

fn render_reading(reading: &EnvReading) -> String {
    format!(
        "T: {:.1} C\nH: {:.1} %\nP: {:.0} Pa",
        reading.temp, reading.humidity, reading.pressure
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Script(VecDeque<Result<EnvReading, SensorError>>);

    impl EnvSensor for Script {
        fn read(&mut self) -> Result<EnvReading, SensorError> {
            self.0.pop_front().unwrap_or(Err(SensorError::ReadFailed {
                sensor: "sht30",
                reason: "empty script".into(),
            }))
        }
    }

    struct Gauge;

    impl BatteryGauge for Gauge {
        fn volts(&mut self) -> f32 {
            4.0
        }
    }

    #[derive(Default)]
    struct Screen(Vec<(String, Color)>);

    impl Display for Screen {
        fn render(&mut self, text: &str, color: Color) {
            self.0.push((text.to_string(), color));
        }
        fn clear(&mut self) {}
    }

    fn reading(temp: f32) -> EnvReading {
        EnvReading {
            temp,
            humidity: 40.0,
            pressure: 101_325.0,
        }
    }

    fn reporter(script: Vec<Result<EnvReading, SensorError>>) -> TelemetryReporter {
        TelemetryReporter::new(
            Box::new(Script(script.into())),
            Duration::from_secs(5),
            "home/living_room/env/telemetry",
            "Living_Room_Env",
        )
    }

    #[test]
    fn test_publishes_reading_and_renders() {
        let mut telemetry = reporter(vec![Ok(reading(21.5))]);
        let mut screen = Screen::default();
        let mut sent = Vec::new();

        let tick = telemetry.tick(Instant::now(), &mut Gauge, Some(&mut screen), |m| {
            sent.push(m);
            Ok(())
        });

        assert_eq!(tick, TelemetryTick::Published);
        let body: serde_json::Value = serde_json::from_slice(&sent[0].payload).unwrap();
        assert_eq!(body["temp"], 21.5);
        assert_eq!(body["status"], "Active");
        assert_eq!(screen.0[0].0, "T: 21.5 C\nH: 40.0 %\nP: 101325 Pa");
    }

    #[test]
    fn test_failed_read_keeps_last_values() {
        let start = Instant::now();
        let failure = Err(SensorError::ReadFailed {
            sensor: "sht30",
            reason: "crc".into(),
        });
        let mut telemetry = reporter(vec![Ok(reading(21.5)), failure]);
        let mut screen = Screen::default();

        telemetry.tick(start, &mut Gauge, Some(&mut screen), |_| Ok(()));
        let mut sent = Vec::new();
        telemetry.tick(start + Duration::from_secs(5), &mut Gauge, Some(&mut screen), |m| {
            sent.push(m);
            Ok(())
        });

        assert_eq!(telemetry.read_failures(), 1);
        let body: serde_json::Value = serde_json::from_slice(&sent[0].payload).unwrap();
        assert_eq!(body["temp"], 21.5);
    }

    #[test]
    fn test_runs_on_its_own_interval() {
        let start = Instant::now();
        let mut telemetry = reporter((0..10).map(|i| Ok(reading(i as f32))).collect());
        let mut screen = Screen::default();
        let mut count = 0;

        for secs in 0..=12u64 {
            telemetry.tick(start + Duration::from_secs(secs), &mut Gauge, Some(&mut screen), |_| {
                count += 1;
                Ok(())
            });
        }
        // t = 0, 5, 10
        assert_eq!(count, 3);
    }

    #[test]
    fn test_missing_sensor_disables_reporter() {
        let mut telemetry = reporter(vec![Err(SensorError::Unavailable("qmp6988"))]);
        let mut screen = Screen::default();

        telemetry.probe(&mut screen);
        assert!(!telemetry.is_enabled());
        assert_eq!(screen.0[0], ("Sensor Missing!".to_string(), Color::Red));

        let tick = telemetry.tick(Instant::now(), &mut Gauge, Some(&mut screen), |_| {
            panic!("disabled reporter must not publish")
        });
        assert_eq!(tick, TelemetryTick::Disabled);
    }

    #[test]
    fn test_tick_without_screen_still_publishes() {
        let mut telemetry = reporter(vec![Ok(reading(22.0))]);
        let mut sent = 0;
        let tick = telemetry.tick(Instant::now(), &mut Gauge, None, |_| {
            sent += 1;
            Ok(())
        });
        assert_eq!(tick, TelemetryTick::Published);
        assert_eq!(sent, 1);
        assert_eq!(telemetry.last_reading().temp, 22.0);
    }

    #[test]
    fn test_publish_failure_is_dropped() {
        let mut telemetry = reporter(vec![Ok(reading(20.0))]);
        let mut screen = Screen::default();
        let tick = telemetry.tick(Instant::now(), &mut Gauge, Some(&mut screen), |_| Err(PublishError::NoSession));
        assert_eq!(tick, TelemetryTick::Dropped);
        // Screen still refreshed offline
        assert_eq!(screen.0.len(), 1);
    }
}
