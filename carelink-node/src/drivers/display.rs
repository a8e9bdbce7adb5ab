//! Screen and vibration motor rendered as structured log lines
//!
//! Headless hosts have no panel; the operator follows the node through the
//! `display` / `haptic` log targets instead.

use crate::hal::{Color, Display, Haptic};
use tracing::info;

#[derive(Debug, Default)]
pub struct TracingDisplay {
    current: Option<(String, Color)>,
}

impl TracingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text currently on screen, if any
    pub fn current(&self) -> Option<&(String, Color)> {
        self.current.as_ref()
    }
}

impl Display for TracingDisplay {
    fn render(&mut self, text: &str, color: Color) {
        info!(target: "display", color = ?color, "{}", text.replace('\n', " | "));
        self.current = Some((text.to_string(), color));
    }

    fn clear(&mut self) {
        if self.current.take().is_some() {
            info!(target: "display", "(cleared)");
        }
    }
}

#[derive(Debug, Default)]
pub struct TracingHaptic {
    on: bool,
}

impl TracingHaptic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

impl Haptic for TracingHaptic {
    fn set(&mut self, on: bool) {
        if on != self.on {
            info!(target: "haptic", "vibration {}", if on { "on" } else { "off" });
        }
        self.on = on;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_tracks_current_text() {
        let mut display = TracingDisplay::new();
        display.render("FALL!", Color::Red);
        assert_eq!(display.current(), Some(&("FALL!".to_string(), Color::Red)));

        display.clear();
        assert!(display.current().is_none());
    }

    #[test]
    fn test_haptic_state() {
        let mut haptic = TracingHaptic::new();
        haptic.set(true);
        assert!(haptic.is_on());
        haptic.set(false);
        assert!(!haptic.is_on());
    }
}
