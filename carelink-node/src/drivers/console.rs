//! Bench inputs read from stdin
//!
//! A reader thread parses one command per line and forwards it over a
//! channel; the loop-side handles drain the channel without blocking.
//!
//! ```text
//! press             help button press
//! g <x> <y> <z>     one accelerometer sample in g (then back to rest)
//! env <t> <h> <p>   temperature C, humidity %, pressure Pa
//! ```

use crate::error::SensorError;
use crate::hal::{Accelerometer, ButtonInput, EnvReading, EnvSensor};
use std::cell::RefCell;
use std::io::BufRead;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use tracing::{debug, warn};

/// Device lying still: 1 g straight down
const REST: [f32; 3] = [0.0, 0.0, 1.0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsoleEvent {
    Press,
    Accel([f32; 3]),
    Env(EnvReading),
}

pub fn parse_line(line: &str) -> Result<ConsoleEvent, String> {
    let mut parts = line.split_whitespace();
    let command = parts.next().ok_or("empty line")?;
    let numbers = parts
        .map(|p| p.parse::<f32>().map_err(|e| format!("'{p}': {e}")))
        .collect::<Result<Vec<_>, _>>()?;

    match (command, numbers.as_slice()) {
        ("press", []) => Ok(ConsoleEvent::Press),
        ("g", [x, y, z]) => Ok(ConsoleEvent::Accel([*x, *y, *z])),
        ("env", [temp, humidity, pressure]) => Ok(ConsoleEvent::Env(EnvReading {
            temp: *temp,
            humidity: *humidity,
            pressure: *pressure,
        })),
        _ => Err(format!("unknown command '{}'", line.trim())),
    }
}

struct Shared {
    rx: Receiver<ConsoleEvent>,
    closed: bool,
    presses: u32,
    accel: Option<[f32; 3]>,
    env: Option<EnvReading>,
}

impl Shared {
    fn drain(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(ConsoleEvent::Press) => self.presses += 1,
                Ok(ConsoleEvent::Accel(sample)) => self.accel = Some(sample),
                Ok(ConsoleEvent::Env(reading)) => self.env = Some(reading),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.closed {
                        debug!("Console input closed");
                        self.closed = true;
                    }
                    break;
                }
            }
        }
    }
}

/// Loop-side handles sharing one input channel
pub struct ConsoleInputs {
    pub button: ConsoleButton,
    pub accelerometer: ConsoleAccelerometer,
    pub env: ConsoleEnv,
}

impl ConsoleInputs {
    /// Spawn the stdin reader thread
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_line(&line) {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Ignoring console input: {}", e),
                }
            }
        });
        Self::from_receiver(rx)
    }

    pub fn from_receiver(rx: Receiver<ConsoleEvent>) -> Self {
        let shared = Rc::new(RefCell::new(Shared {
            rx,
            closed: false,
            presses: 0,
            accel: None,
            env: None,
        }));
        Self {
            button: ConsoleButton(shared.clone()),
            accelerometer: ConsoleAccelerometer(shared.clone()),
            env: ConsoleEnv(shared),
        }
    }
}

pub struct ConsoleButton(Rc<RefCell<Shared>>);

impl ButtonInput for ConsoleButton {
    fn was_pressed(&mut self) -> bool {
        let mut shared = self.0.borrow_mut();
        shared.drain();
        if shared.presses > 0 {
            shared.presses -= 1;
            true
        } else {
            false
        }
    }
}

pub struct ConsoleAccelerometer(Rc<RefCell<Shared>>);

impl Accelerometer for ConsoleAccelerometer {
    fn read(&mut self) -> Result<[f32; 3], SensorError> {
        let mut shared = self.0.borrow_mut();
        shared.drain();
        Ok(shared.accel.take().unwrap_or(REST))
    }
}

pub struct ConsoleEnv(Rc<RefCell<Shared>>);

impl EnvSensor for ConsoleEnv {
    fn read(&mut self) -> Result<EnvReading, SensorError> {
        let mut shared = self.0.borrow_mut();
        shared.drain();
        shared.env.ok_or_else(|| SensorError::ReadFailed {
            sensor: "console-env",
            reason: "no sample yet".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_line("press"), Ok(ConsoleEvent::Press));
        assert_eq!(parse_line("g 0 0 3.1"), Ok(ConsoleEvent::Accel([0.0, 0.0, 3.1])));
        assert_eq!(
            parse_line("env 21.5 40 101325"),
            Ok(ConsoleEvent::Env(EnvReading {
                temp: 21.5,
                humidity: 40.0,
                pressure: 101_325.0
            }))
        );
        assert!(parse_line("g 1 2").is_err());
        assert!(parse_line("jump").is_err());
        assert!(parse_line("g x y z").is_err());
    }

    #[test]
    fn test_handles_consume_events() {
        let (tx, rx) = mpsc::channel();
        let mut inputs = ConsoleInputs::from_receiver(rx);

        tx.send(ConsoleEvent::Press).unwrap();
        tx.send(ConsoleEvent::Accel([0.0, 3.0, 0.0])).unwrap();

        assert!(inputs.button.was_pressed());
        assert!(!inputs.button.was_pressed());
        assert_eq!(inputs.accelerometer.read().unwrap(), [0.0, 3.0, 0.0]);
        assert_eq!(inputs.accelerometer.read().unwrap(), REST);
        assert!(inputs.env.read().is_err());

        tx.send(ConsoleEvent::Env(EnvReading::default())).unwrap();
        assert_eq!(inputs.env.read().unwrap(), EnvReading::default());
    }
}
