//! Link manager: network attachment state machine
//!
//! `Disconnected -> Attaching -> Attached`, driven one step per poll. An
//! attach attempt is bounded by an attempt budget spaced `attempt_interval`
//! apart; when the budget runs out the manager falls back to
//! `Disconnected` and waits `retry_delay` before starting over. No poll
//! ever blocks.

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::hal::{Color, Display};
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Attaching,
    Attached,
}

/// Network attachment primitive (WiFi association, interface check, ...)
pub trait LinkDriver {
    /// Start an association attempt; must return promptly
    fn begin(&mut self) -> Result<(), LinkError>;
    fn is_attached(&mut self) -> bool;
    fn local_addr(&self) -> Option<IpAddr>;
    /// Human-readable target shown on the status screen
    fn target(&self) -> String;
}

pub struct LinkManager<L: LinkDriver> {
    driver: L,
    state: ConnectionState,
    max_attempts: u32,
    attempt_interval: Duration,
    retry_delay: Duration,
    attempts: u32,
    last_check: Option<Instant>,
    retry_at: Option<Instant>,
    failures: u32,
    last_error: Option<LinkError>,
}

impl<L: LinkDriver> LinkManager<L> {
    pub fn new(driver: L, config: &LinkConfig) -> Self {
        Self {
            driver,
            state: ConnectionState::Disconnected,
            max_attempts: config.max_attempts.max(1),
            attempt_interval: Duration::from_millis(config.attempt_interval_ms),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            attempts: 0,
            last_check: None,
            retry_at: None,
            failures: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Attempts consumed by the current (or last) attach cycle
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn last_error(&self) -> Option<&LinkError> {
        self.last_error.as_ref()
    }

    pub fn local_addr(&self) -> Option<IpAddr> {
        self.driver.local_addr()
    }

    pub fn driver(&self) -> &L {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut L {
        &mut self.driver
    }

    /// Advance the attach state machine by at most one step
    pub fn poll(&mut self, now: Instant, display: &mut dyn Display) -> ConnectionState {
        match self.state {
            ConnectionState::Disconnected => self.start_attach(now, display),
            ConnectionState::Attaching => self.check_attach(now, display),
            ConnectionState::Attached => {
                if !self.driver.is_attached() {
                    warn!("Link to {} lost", self.driver.target());
                    display.render("Link lost", Color::Red);
                    self.state = ConnectionState::Disconnected;
                    self.retry_at = None;
                }
            }
        }
        self.state
    }

    fn start_attach(&mut self, now: Instant, display: &mut dyn Display) {
        if let Some(at) = self.retry_at {
            if now < at {
                return;
            }
        }

        let target = self.driver.target();
        info!("Connecting link to {}", target);
        display.render(&format!("Connecting to: {target}"), Color::Default);

        match self.driver.begin() {
            Ok(()) => {
                self.state = ConnectionState::Attaching;
                self.attempts = 0;
                self.last_check = None;
            }
            Err(e) => self.fail(now, e, display),
        }
    }

    fn check_attach(&mut self, now: Instant, display: &mut dyn Display) {
        if let Some(last) = self.last_check {
            if now.saturating_duration_since(last) < self.attempt_interval {
                return;
            }
        }
        self.last_check = Some(now);
        self.attempts += 1;

        if self.driver.is_attached() {
            self.state = ConnectionState::Attached;
            self.retry_at = None;
            self.last_error = None;
            match self.driver.local_addr() {
                Some(addr) => {
                    info!("Link attached after {} attempts - IP: {}", self.attempts, addr);
                    display.render(&format!("Link OK!\nIP: {addr}"), Color::Default);
                }
                None => {
                    info!("Link attached after {} attempts", self.attempts);
                    display.render("Link OK!", Color::Default);
                }
            }
            return;
        }

        debug!("Link attempt {}/{} pending", self.attempts, self.max_attempts);
        if self.attempts >= self.max_attempts {
            self.fail(
                now,
                LinkError::AttemptsExhausted {
                    attempts: self.attempts,
                },
                display,
            );
        }
    }

    fn fail(&mut self, now: Instant, error: LinkError, display: &mut dyn Display) {
        warn!("Link attach failed: {} (retrying in {:?})", error, self.retry_delay);
        display.render("Link Failed!", Color::Red);
        self.state = ConnectionState::Disconnected;
        self.retry_at = Some(now + self.retry_delay);
        self.failures += 1;
        self.last_error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Attaches on the n-th status check; `None` never attaches
    struct ScriptedLink {
        attach_on_check: Option<u32>,
        checks: u32,
        begins: u32,
        dropped: bool,
    }

    impl ScriptedLink {
        fn new(attach_on_check: Option<u32>) -> Self {
            Self {
                attach_on_check,
                checks: 0,
                begins: 0,
                dropped: false,
            }
        }
    }

    impl LinkDriver for ScriptedLink {
        fn begin(&mut self) -> Result<(), LinkError> {
            self.begins += 1;
            self.checks = 0;
            Ok(())
        }

        fn is_attached(&mut self) -> bool {
            if self.dropped {
                return false;
            }
            self.checks += 1;
            matches!(self.attach_on_check, Some(n) if self.checks >= n)
        }

        fn local_addr(&self) -> Option<IpAddr> {
            Some(IpAddr::from([192, 168, 10, 42]))
        }

        fn target(&self) -> String {
            "test-ap".to_string()
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

    fn config() -> LinkConfig {
        LinkConfig {
            interface: None,
            max_attempts: 20,
            attempt_interval_ms: 500,
            retry_delay_ms: 5000,
        }
    }

    #[test]
    fn test_attaches_after_three_attempts() {
        let mut link = LinkManager::new(ScriptedLink::new(Some(3)), &config());
        let mut screen = Screen::default();
        let start = Instant::now();

        let mut state = ConnectionState::Disconnected;
        for step in 0..100u64 {
            state = link.poll(start + Duration::from_millis(step * 100), &mut screen);
            if state == ConnectionState::Attached {
                break;
            }
        }

        assert_eq!(state, ConnectionState::Attached);
        assert_eq!(link.attempts(), 3);
        assert!(screen.0.iter().any(|(t, _)| t.contains("192.168.10.42")));
    }

    #[test]
    fn test_attempts_are_spaced() {
        let mut link = LinkManager::new(ScriptedLink::new(None), &config());
        let mut screen = Screen::default();
        let start = Instant::now();

        link.poll(start, &mut screen);
        link.poll(start, &mut screen);
        link.poll(start + Duration::from_millis(100), &mut screen);
        assert_eq!(link.attempts(), 1);

        link.poll(start + Duration::from_millis(500), &mut screen);
        assert_eq!(link.attempts(), 2);
    }

    #[test]
    fn test_budget_exhaustion_reports_failure_and_backs_off() {
        let mut link = LinkManager::new(ScriptedLink::new(None), &config());
        let mut screen = Screen::default();
        let start = Instant::now();

        let mut now = start;
        for _ in 0..25 {
            link.poll(now, &mut screen);
            now += Duration::from_millis(500);
        }

        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(link.failures(), 1);
        assert!(matches!(
            link.last_error(),
            Some(LinkError::AttemptsExhausted { attempts: 20 })
        ));
        assert!(screen.0.iter().any(|(t, c)| t == "Link Failed!" && *c == Color::Red));

        // Still inside the retry delay: no new attach begins
        let begins = link.driver().begins;
        link.poll(now, &mut screen);
        assert_eq!(link.driver().begins, begins);

        link.poll(now + Duration::from_secs(5), &mut screen);
        assert_eq!(link.driver().begins, begins + 1);
        assert_eq!(link.state(), ConnectionState::Attaching);
    }

    #[test]
    fn test_link_loss_returns_to_disconnected() {
        let mut link = LinkManager::new(ScriptedLink::new(Some(1)), &config());
        let mut screen = Screen::default();
        let now = Instant::now();

        link.poll(now, &mut screen);
        assert_eq!(link.poll(now, &mut screen), ConnectionState::Attached);

        link.driver_mut().dropped = true;
        assert_eq!(link.poll(now, &mut screen), ConnectionState::Disconnected);
    }

    #[test]
    fn test_steady_attached_state_is_silent() {
        let mut link = LinkManager::new(ScriptedLink::new(Some(1)), &config());
        let mut screen = Screen::default();
        let now = Instant::now();

        link.poll(now, &mut screen);
        link.poll(now, &mut screen);
        let rendered = screen.0.len();

        for _ in 0..10 {
            link.poll(now, &mut screen);
        }
        assert_eq!(screen.0.len(), rendered);
    }
}
