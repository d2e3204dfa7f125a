//! Matter cluster handlers for the presence sensor endpoint.
//!
//! These handlers bridge the shared presence attributes to rs-matter's data
//! model traits.

use super::attributes::Sensor;
use rs_matter::dm::Dataver;
use std::sync::atomic::{AtomicU32, Ordering};

pub mod illuminance_measurement;
pub mod occupancy_sensing;

pub use illuminance_measurement::IlluminanceMeasurementHandler;
pub use occupancy_sensing::OccupancySensingHandler;

/// Sync dataver with sensor version changes.
///
/// Call this at the start of `read_impl()` for any cluster handler backed by a sensor.
/// When the sensor's version has changed since the last read, this bumps the dataver
/// to notify subscribers that the attribute value has changed.
pub fn sync_dataver_with_sensor<S: Sensor>(
    sensor: &S,
    last_version: &AtomicU32,
    dataver: &Dataver,
) {
    let current = sensor.version();
    let last = last_version.swap(current, Ordering::SeqCst);
    if current != last {
        dataver.changed();
    }
}
