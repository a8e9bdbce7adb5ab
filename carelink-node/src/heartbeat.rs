//! Heartbeat scheduler
//!
//! Emits `{unit_id, status: "Active", battery}` on the status topic once per
//! interval while a session is active. The timer advances on every fire,
//! published or not, so a dead broker never causes a retry storm.

use crate::clock::IntervalTimer;
use crate::error::PublishError;
use crate::hal::BatteryGauge;
use crate::messages::OutboundMessage;
use crate::session::SessionState;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatTick {
    /// Not due yet, or no session
    Idle,
    Published,
    Dropped,
}

pub struct HeartbeatScheduler {
    timer: IntervalTimer,
    topic: String,
    unit_id: String,
}

impl HeartbeatScheduler {
    pub fn new(interval: Duration, topic: impl Into<String>, unit_id: impl Into<String>) -> Self {
        Self {
            timer: IntervalTimer::new(interval),
            topic: topic.into(),
            unit_id: unit_id.into(),
        }
    }

    pub fn last_emission(&self) -> Option<Instant> {
        self.timer.last()
    }

    /// The gauge is only read when a heartbeat actually goes out
    pub fn tick<F>(
        &mut self,
        now: Instant,
        session: SessionState,
        gauge: &mut dyn BatteryGauge,
        publish: F,
    ) -> HeartbeatTick
    where
        F: FnOnce(OutboundMessage) -> Result<(), PublishError>,
    {
        if session != SessionState::SessionActive || !self.timer.is_due(now) {
            return HeartbeatTick::Idle;
        }
        self.timer.mark(now);
        let battery = gauge.volts();

        let result = OutboundMessage::status(&self.topic, &self.unit_id, battery)
            .map_err(PublishError::from)
            .and_then(publish);

        match result {
            Ok(()) => {
                debug!("Heartbeat sent (battery {:.2} V)", battery);
                HeartbeatTick::Published
            }
            Err(e) => {
                warn!("Heartbeat dropped: {}", e);
                HeartbeatTick::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Gauge;

    impl BatteryGauge for Gauge {
        fn volts(&mut self) -> f32 {
            4.0
        }
    }

    fn scheduler() -> HeartbeatScheduler {
        HeartbeatScheduler::new(Duration::from_secs(30), "home/bedside/comm/status", "Bedside_Comm_Unit")
    }

    #[test]
    fn test_first_tick_with_session_fires() {
        let mut hb = scheduler();
        let mut sent = Vec::new();
        let tick = hb.tick(Instant::now(), SessionState::SessionActive, &mut Gauge, |m| {
            sent.push(m);
            Ok(())
        });

        assert_eq!(tick, HeartbeatTick::Published);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "home/bedside/comm/status");
    }

    #[test]
    fn test_no_session_never_fires_or_marks() {
        let mut hb = scheduler();
        let tick = hb.tick(Instant::now(), SessionState::NoSession, &mut Gauge, |_| {
            panic!("must not publish without a session")
        });
        assert_eq!(tick, HeartbeatTick::Idle);
        assert!(hb.last_emission().is_none());
    }

    #[test]
    fn test_never_fires_early() {
        let start = Instant::now();
        let mut hb = scheduler();
        let mut count = 0;

        for secs in 0..=60u64 {
            hb.tick(start + Duration::from_secs(secs), SessionState::SessionActive, &mut Gauge, |_| {
                count += 1;
                Ok(())
            });
        }
        // t = 0, 30, 60
        assert_eq!(count, 3);
    }

    #[test]
    fn test_failed_publish_still_advances_timer() {
        let start = Instant::now();
        let mut hb = scheduler();

        let tick = hb.tick(start, SessionState::SessionActive, &mut Gauge, |_| {
            Err(PublishError::Rejected("queue full".into()))
        });
        assert_eq!(tick, HeartbeatTick::Dropped);
        assert_eq!(hb.last_emission(), Some(start));

        let retry = hb.tick(start + Duration::from_secs(1), SessionState::SessionActive, &mut Gauge, |_| Ok(()));
        assert_eq!(retry, HeartbeatTick::Idle);
    }
}
