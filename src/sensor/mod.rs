//! LD2410 presence radar access.
//!
//! - `frame`: wire format decoder and command encoder
//! - `transport`: non-blocking byte transport (serial port or in-memory)
//! - `link`: the initialized sensor link polled by the bridge

pub mod frame;
pub mod link;
pub mod transport;

pub use link::{FrameKind, LinkConfig, LinkStats, SensorLink};
pub use transport::{Framing, LineSettings, SerialPortTransport, SerialTransport};
