//! CareLink node core
//!
//! Connectivity and event delivery for battery-powered sensor/alert nodes:
//! - Link and broker-session state machines that heal themselves
//! - Heartbeat and environment telemetry on independent timers
//! - Threshold + cooldown event detection (fall impact, help button)
//! - Best-effort alert publishing with a bounded local alarm
//!
//! Everything runs on one cooperative loop ([`node::Node`]); hardware and the
//! broker connection sit behind the traits in [`hal`], [`link`] and [`session`].

pub mod alert;
pub mod clock;
pub mod config;
pub mod detector;
pub mod drivers;
pub mod error;
pub mod hal;
pub mod heartbeat;
pub mod link;
pub mod messages;
pub mod node;
pub mod session;
pub mod telemetry;
pub mod topics;

pub use config::NodeConfig;
pub use node::{Node, NodeStats};
