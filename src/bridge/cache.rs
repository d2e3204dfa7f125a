//! Last-reported attribute values and the reconcile step.

use super::Reading;
use super::sink::AttributeSink;
use crate::error::{Attribute, BridgeError, Result};
use log::{debug, info};

/// What the sink has confirmed so far.
///
/// Only ever holds values the sink acknowledged, so the bridge and the
/// network view cannot drift apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportedState {
    pub occupancy: bool,
    /// Raw sensor light level (0-255)
    pub illuminance: u16,
    pub initialized: bool,
}

/// Dedup cache between the sensor readings and the attribute sink.
#[derive(Debug, Default)]
pub struct PresenceCache {
    state: ReportedState,
}

impl PresenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ReportedState {
        self.state
    }

    /// Adopt the values the sink already holds (previous session state).
    pub fn sync_from_sink<S: AttributeSink>(&mut self, sink: &S) -> Result<()> {
        if !sink.is_ready() {
            return Err(BridgeError::SinkNotReady);
        }
        self.state = ReportedState {
            occupancy: sink.get_occupancy(),
            illuminance: sink.get_illuminance(),
            initialized: true,
        };
        debug!(
            "Presence cache synced from sink: occupancy={}, illuminance={}",
            self.state.occupancy, self.state.illuminance
        );
        Ok(())
    }

    /// Push `reading` into `sink`, writing only the attributes that changed.
    ///
    /// Occupancy is written (and confirmed or failed) before illuminance is
    /// looked at. A failed write leaves the cached value untouched and stops
    /// the reconcile; the next reading retries it.
    pub fn reconcile<S: AttributeSink>(&mut self, reading: &Reading, sink: &mut S) -> Result<()> {
        if !sink.is_ready() {
            return Err(BridgeError::SinkNotReady);
        }

        if reading.presence != self.state.occupancy {
            sink.set_occupancy(reading.presence)
                .map_err(|source| BridgeError::WriteFailed {
                    attribute: Attribute::Occupancy,
                    source,
                })?;
            self.state.occupancy = reading.presence;
            info!(
                "Occupancy set to {}",
                if reading.presence { "Occupied" } else { "Vacant" }
            );
        }

        let illuminance = u16::from(reading.light_level);
        if illuminance != self.state.illuminance {
            sink.set_illuminance(illuminance)
                .map_err(|source| BridgeError::WriteFailed {
                    attribute: Attribute::Illuminance,
                    source,
                })?;
            self.state.illuminance = illuminance;
            debug!("Illuminance set to {}", illuminance);
        }

        self.state.initialized = true;
        Ok(())
    }
}
