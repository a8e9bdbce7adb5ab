//! Event detection with threshold + cooldown
//!
//! One detector shape serves every device variant: an [`EventSource`]
//! supplies `sample()` and `classify()`, the [`EventDetector`] applies the
//! cooldown window and the re-arm policy on top.
//!
//! Re-arm policies:
//! - `BelowThreshold` (default): after firing, the signal must classify false
//!   at least once *and* the cooldown must have elapsed before it fires again.
//!   A signal held high forever yields exactly one event.
//! - `Timer`: only the cooldown matters; a signal held high re-fires once per
//!   cooldown period.

use crate::config::{ButtonConfig, ImpactConfig};
use crate::error::SensorError;
use crate::hal::{Accelerometer, ButtonInput};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RearmPolicy {
    #[default]
    BelowThreshold,
    Timer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    Fall,
    Help,
}

/// Sampling capability polymorphic over the physical quantity
pub trait EventSource {
    fn sample(&mut self) -> Result<f32, SensorError>;
    fn classify(&self, value: f32) -> bool;
}

/// Acceleration magnitude compared against a g-force threshold
pub struct ImpactSource<A: Accelerometer> {
    accel: A,
    threshold_g: f32,
}

impl<A: Accelerometer> ImpactSource<A> {
    pub fn new(accel: A, threshold_g: f32) -> Self {
        Self { accel, threshold_g }
    }
}

impl<A: Accelerometer> EventSource for ImpactSource<A> {
    fn sample(&mut self) -> Result<f32, SensorError> {
        let [x, y, z] = self.accel.read()?;
        Ok((x * x + y * y + z * z).sqrt())
    }

    fn classify(&self, value: f32) -> bool {
        value > self.threshold_g
    }
}

/// Press edge reported as 1.0, idle as 0.0
pub struct ButtonSource<B: ButtonInput> {
    button: B,
}

impl<B: ButtonInput> ButtonSource<B> {
    pub fn new(button: B) -> Self {
        Self { button }
    }
}

impl<B: ButtonInput> EventSource for ButtonSource<B> {
    fn sample(&mut self) -> Result<f32, SensorError> {
        Ok(if self.button.was_pressed() { 1.0 } else { 0.0 })
    }

    fn classify(&self, value: f32) -> bool {
        value >= 0.5
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub class: EventClass,
    pub value: f32,
    pub at: Instant,
}

/// Per-class last trigger plus a fixed cooldown
#[derive(Debug, Clone)]
pub struct CooldownWindow {
    cooldown: Duration,
    last_trigger: Option<Instant>,
}

impl CooldownWindow {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_trigger: None,
        }
    }

    pub fn permits(&self, now: Instant) -> bool {
        match self.last_trigger {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.cooldown,
        }
    }

    pub fn trigger(&mut self, now: Instant) {
        self.last_trigger = Some(now);
    }

    pub fn last_trigger(&self) -> Option<Instant> {
        self.last_trigger
    }
}

/// Object-safe view used by the control loop
pub trait Detector {
    fn class(&self) -> EventClass;
    fn poll(&mut self, now: Instant) -> Option<Detection>;
}

pub struct EventDetector<S: EventSource> {
    class: EventClass,
    source: S,
    window: CooldownWindow,
    rearm: RearmPolicy,
    armed: bool,
    sample_errors: u64,
}

impl<S: EventSource> EventDetector<S> {
    pub fn new(class: EventClass, source: S, cooldown: Duration, rearm: RearmPolicy) -> Self {
        Self {
            class,
            source,
            window: CooldownWindow::new(cooldown),
            rearm,
            armed: true,
            sample_errors: 0,
        }
    }

    pub fn window(&self) -> &CooldownWindow {
        &self.window
    }

    pub fn sample_errors(&self) -> u64 {
        self.sample_errors
    }
}

impl<S: EventSource> Detector for EventDetector<S> {
    fn class(&self) -> EventClass {
        self.class
    }

    fn poll(&mut self, now: Instant) -> Option<Detection> {
        let value = match self.source.sample() {
            Ok(v) => v,
            Err(e) => {
                self.sample_errors += 1;
                // Sampling runs at ~100 Hz, keep the log readable
                if self.sample_errors == 1 || self.sample_errors % 1000 == 0 {
                    warn!("{:?} sample failed ({} so far): {}", self.class, self.sample_errors, e);
                }
                return None;
            }
        };

        if !self.source.classify(value) {
            self.armed = true;
            return None;
        }

        if self.rearm == RearmPolicy::BelowThreshold && !self.armed {
            return None;
        }

        if !self.window.permits(now) {
            trace!("{:?} suppressed by cooldown (value {})", self.class, value);
            return None;
        }

        self.window.trigger(now);
        self.armed = false;
        Some(Detection {
            class: self.class,
            value,
            at: now,
        })
    }
}

/// Impact detector tuned from the `[impact]` section
pub fn fall_detector<A: Accelerometer + 'static>(accel: A, config: &ImpactConfig) -> Box<dyn Detector> {
    Box::new(EventDetector::new(
        EventClass::Fall,
        ImpactSource::new(accel, config.threshold_g),
        Duration::from_millis(config.cooldown_ms),
        config.rearm,
    ))
}

/// Help button; the press edge is the debounce, so re-arm is timer-only
pub fn help_detector<B: ButtonInput + 'static>(button: B, config: &ButtonConfig) -> Box<dyn Detector> {
    Box::new(EventDetector::new(
        EventClass::Help,
        ButtonSource::new(button),
        Duration::from_millis(config.cooldown_ms),
        RearmPolicy::Timer,
    ))
}
