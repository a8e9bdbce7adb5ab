/*!
Doubles des collaborateurs matériels

Chaque fake est un handle clonable: le nœud en possède un, le test garde
l'autre pour piloter le scénario et observer les effets de bord.
*/

use carelink_node::clock::Clock;
use carelink_node::error::{LinkError, SensorError};
use carelink_node::hal::{Accelerometer, BatteryGauge, ButtonInput, Color, Display, EnvReading, EnvSensor, Haptic};
use carelink_node::link::LinkDriver;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Manual clock; `sleep` advances time instead of blocking
#[derive(Clone)]
pub struct FakeClock {
    origin: Instant,
    offset: Rc<Cell<Duration>>,
    slept: Rc<Cell<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Rc::default(),
            slept: Rc::default(),
        }
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }

    /// Time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }

    /// Total time spent inside `sleep`
    pub fn slept(&self) -> Duration {
        self.slept.get()
    }

    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    fn sleep(&self, duration: Duration) {
        self.slept.set(self.slept.get() + duration);
        self.advance(duration);
    }
}

#[derive(Debug)]
struct LinkScript {
    attach_on_check: Option<u32>,
    checks: u32,
    begins: u32,
    up: bool,
}

/// Link that attaches on the n-th status check of an attempt
#[derive(Clone)]
pub struct FakeLink {
    script: Rc<RefCell<LinkScript>>,
    addr: IpAddr,
}

impl FakeLink {
    pub fn attaching_after(checks: u32) -> Self {
        Self::scripted(Some(checks))
    }

    pub fn never_attaching() -> Self {
        Self::scripted(None)
    }

    fn scripted(attach_on_check: Option<u32>) -> Self {
        Self {
            script: Rc::new(RefCell::new(LinkScript {
                attach_on_check,
                checks: 0,
                begins: 0,
                up: true,
            })),
            addr: IpAddr::from([192, 168, 10, 42]),
        }
    }

    /// Access point disappears (or comes back)
    pub fn set_up(&self, up: bool) {
        self.script.borrow_mut().up = up;
    }

    pub fn begins(&self) -> u32 {
        self.script.borrow().begins
    }

    pub fn checks(&self) -> u32 {
        self.script.borrow().checks
    }
}

impl LinkDriver for FakeLink {
    fn begin(&mut self) -> Result<(), LinkError> {
        let mut script = self.script.borrow_mut();
        script.begins += 1;
        script.checks = 0;
        Ok(())
    }

    fn is_attached(&mut self) -> bool {
        let mut script = self.script.borrow_mut();
        script.checks += 1;
        script.up && matches!(script.attach_on_check, Some(n) if script.checks >= n)
    }

    fn local_addr(&self) -> Option<IpAddr> {
        Some(self.addr)
    }

    fn target(&self) -> String {
        "fake-ap".to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String, Color),
    Cleared,
}

#[derive(Clone, Default)]
pub struct RecordingDisplay {
    frames: Rc<RefCell<Vec<Frame>>>,
}

impl RecordingDisplay {
    pub fn frames(&self) -> Vec<Frame> {
        self.frames.borrow().clone()
    }

    pub fn rendered(&self) -> Vec<(String, Color)> {
        self.frames
            .borrow()
            .iter()
            .filter_map(|f| match f {
                Frame::Text(t, c) => Some((t.clone(), *c)),
                Frame::Cleared => None,
            })
            .collect()
    }

    pub fn contains(&self, text: &str, color: Color) -> bool {
        self.rendered().iter().any(|(t, c)| t == text && *c == color)
    }

    pub fn last(&self) -> Option<Frame> {
        self.frames.borrow().last().cloned()
    }
}

impl Display for RecordingDisplay {
    fn render(&mut self, text: &str, color: Color) {
        self.frames.borrow_mut().push(Frame::Text(text.to_string(), color));
    }

    fn clear(&mut self) {
        self.frames.borrow_mut().push(Frame::Cleared);
    }
}

#[derive(Clone, Default)]
pub struct RecordingHaptic {
    switches: Rc<RefCell<Vec<bool>>>,
}

impl RecordingHaptic {
    /// Completed on/off pulses
    pub fn pulses(&self) -> usize {
        self.switches
            .borrow()
            .windows(2)
            .filter(|w| w[0] && !w[1])
            .count()
    }

    pub fn is_on(&self) -> bool {
        self.switches.borrow().last().copied().unwrap_or(false)
    }
}

impl Haptic for RecordingHaptic {
    fn set(&mut self, on: bool) {
        self.switches.borrow_mut().push(on);
    }
}

#[derive(Clone)]
pub struct FixedBattery(pub f32);

impl BatteryGauge for FixedBattery {
    fn volts(&mut self) -> f32 {
        self.0
    }
}

/// Accelerometer holding whatever magnitude the test last set (z-axis)
#[derive(Clone)]
pub struct ScriptedAccelerometer {
    g: Rc<Cell<Option<f32>>>,
}

impl ScriptedAccelerometer {
    pub fn resting() -> Self {
        Self {
            g: Rc::new(Cell::new(Some(1.0))),
        }
    }

    pub fn set_g(&self, g: f32) {
        self.g.set(Some(g));
    }

    /// Subsequent reads fail until `set_g`
    pub fn fail(&self) {
        self.g.set(None);
    }
}

impl Accelerometer for ScriptedAccelerometer {
    fn read(&mut self) -> Result<[f32; 3], SensorError> {
        self.g.get().map(|g| [0.0, 0.0, g]).ok_or_else(|| SensorError::ReadFailed {
            sensor: "imu",
            reason: "scripted failure".to_string(),
        })
    }
}

/// Button whose press edges are queued by the test
#[derive(Clone, Default)]
pub struct ScriptedButton {
    pending: Rc<Cell<u32>>,
}

impl ScriptedButton {
    pub fn press(&self) {
        self.pending.set(self.pending.get() + 1);
    }
}

impl ButtonInput for ScriptedButton {
    fn was_pressed(&mut self) -> bool {
        let pending = self.pending.get();
        if pending > 0 {
            self.pending.set(pending - 1);
            true
        } else {
            false
        }
    }
}

/// Environment sensor replaying queued results, then repeating the last reading
#[derive(Clone)]
pub struct ScriptedEnv {
    queue: Rc<RefCell<VecDeque<Result<EnvReading, SensorError>>>>,
    steady: Rc<Cell<Option<EnvReading>>>,
}

impl ScriptedEnv {
    pub fn steady(reading: EnvReading) -> Self {
        Self {
            queue: Rc::default(),
            steady: Rc::new(Cell::new(Some(reading))),
        }
    }

    /// Sensor absent from the bus
    pub fn missing() -> Self {
        let env = Self {
            queue: Rc::default(),
            steady: Rc::new(Cell::new(None)),
        };
        env.push(Err(SensorError::Unavailable("env-unit")));
        env
    }

    pub fn push(&self, result: Result<EnvReading, SensorError>) {
        self.queue.borrow_mut().push_back(result);
    }
}

impl EnvSensor for ScriptedEnv {
    fn read(&mut self) -> Result<EnvReading, SensorError> {
        if let Some(next) = self.queue.borrow_mut().pop_front() {
            if let Ok(reading) = &next {
                self.steady.set(Some(*reading));
            }
            return next;
        }
        self.steady.get().ok_or(SensorError::Unavailable("env-unit"))
    }
}
