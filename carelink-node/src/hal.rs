//! Narrow interfaces to the device's physical collaborators
//!
//! Register-level drivers, screen rendering and haptics live outside the
//! core; the core only sees these traits. Host implementations are in
//! [`crate::drivers`], test doubles in the devkit crate.

use crate::error::SensorError;

/// Text colour used by the local screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
    Default,
}

impl Color {
    /// Maps the dashboard's colour names; anything unknown falls back to default
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("red") => Color::Red,
            Some("green") => Color::Green,
            _ => Color::Default,
        }
    }
}

pub trait Display {
    fn render(&mut self, text: &str, color: Color);
    fn clear(&mut self);
}

/// Vibration motor
pub trait Haptic {
    fn set(&mut self, on: bool);
}

pub trait BatteryGauge {
    /// Battery voltage in volts
    fn volts(&mut self) -> f32;
}

/// Three-axis accelerometer reporting in g
pub trait Accelerometer {
    fn read(&mut self) -> Result<[f32; 3], SensorError>;
}

/// Physical push button.
///
/// `was_pressed` reports a press edge at most once: the edge is consumed by
/// the call that observes it.
pub trait ButtonInput {
    fn was_pressed(&mut self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnvReading {
    pub temp: f32,
    pub humidity: f32,
    pub pressure: f32,
}

/// Temperature / humidity / pressure sensor
pub trait EnvSensor {
    fn read(&mut self) -> Result<EnvReading, SensorError>;
}

/// Screen, vibration motor and battery gauge owned by the control loop
pub struct Peripherals {
    pub display: Box<dyn Display>,
    pub haptic: Box<dyn Haptic>,
    pub battery: Box<dyn BatteryGauge>,
}
