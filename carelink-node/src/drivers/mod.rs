//! Host implementations of the collaborator traits
//!
//! Used by the `carelink-node` binary on Linux hosts and bench rigs. Devices
//! with real panels and IMUs plug their own drivers in behind the same traits.

pub mod battery;
pub mod console;
pub mod display;
pub mod link;
pub mod mqtt;

pub use battery::SysfsBattery;
pub use console::ConsoleInputs;
pub use display::{TracingDisplay, TracingHaptic};
pub use link::HostLink;
pub use mqtt::MqttTransport;
