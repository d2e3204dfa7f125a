//! Sensor-to-attribute bridge.
//!
//! Data flows one way: the [`PollLoop`] pulls a [`Reading`] from the sensor
//! link, the [`PresenceCache`] decides what changed, and only changes reach
//! the [`AttributeSink`].

pub mod cache;
pub mod poll;
pub mod sink;

pub use cache::{PresenceCache, ReportedState};
pub use poll::{DEFAULT_INTERVAL, PollLoop, TickOutcome};
pub use sink::AttributeSink;

use std::time::Instant;

/// Snapshot of one decoded data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub presence: bool,
    /// Raw sensor light level, 0-255
    pub light_level: u8,
    pub timestamp: Instant,
}
