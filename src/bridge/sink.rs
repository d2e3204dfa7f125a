//! AttributeSink trait: the attribute store the bridge reports into.

use crate::error::SinkError;

/// Remote store for the occupancy and illuminance attributes.
///
/// Writes are synchronous from the bridge's point of view and are never
/// issued concurrently. Any queuing, retry or timeout is the sink's own
/// business.
///
/// Reads and writes are separate named methods so a call site always shows
/// whether it touches the network.
pub trait AttributeSink {
    /// Whether the sink accepts writes (endpoint bound and started).
    fn is_ready(&self) -> bool;

    /// Write the occupancy attribute.
    fn set_occupancy(&mut self, occupied: bool) -> Result<(), SinkError>;

    /// Write the illuminance attribute.
    fn set_illuminance(&mut self, value: u16) -> Result<(), SinkError>;

    /// Stored occupancy, e.g. restored from a previous session.
    fn get_occupancy(&self) -> bool;

    /// Stored illuminance, e.g. restored from a previous session.
    fn get_illuminance(&self) -> u16;
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum SinkCall {
        Occupancy(bool),
        Illuminance(u16),
    }

    /// Sink that records every write and can be told to fail.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSink {
        pub ready: bool,
        pub occupancy: bool,
        pub illuminance: u16,
        pub fail_occupancy: bool,
        pub fail_illuminance: bool,
        pub calls: Vec<SinkCall>,
    }

    impl RecordingSink {
        pub(crate) fn ready() -> Self {
            Self {
                ready: true,
                ..Self::default()
            }
        }
    }

    impl AttributeSink for RecordingSink {
        fn is_ready(&self) -> bool {
            self.ready
        }

        fn set_occupancy(&mut self, occupied: bool) -> Result<(), SinkError> {
            self.calls.push(SinkCall::Occupancy(occupied));
            if self.fail_occupancy {
                return Err(SinkError::Rejected("occupancy".to_string()));
            }
            self.occupancy = occupied;
            Ok(())
        }

        fn set_illuminance(&mut self, value: u16) -> Result<(), SinkError> {
            self.calls.push(SinkCall::Illuminance(value));
            if self.fail_illuminance {
                return Err(SinkError::Rejected("illuminance".to_string()));
            }
            self.illuminance = value;
            Ok(())
        }

        fn get_occupancy(&self) -> bool {
            self.occupancy
        }

        fn get_illuminance(&self) -> u16 {
            self.illuminance
        }
    }
}
