//! Device type definitions for the presence sensor endpoint.

use rs_matter::dm::DeviceType;

/// Matter Occupancy Sensor device type
///
/// Device Type ID: 0x0107 (263 decimal)
/// Device Type Revision: 1
///
/// Required clusters:
/// - OccupancySensing (0x0406)
/// - Descriptor (standard)
pub const DEV_TYPE_OCCUPANCY_SENSOR: DeviceType = DeviceType {
    dtype: 0x0107,
    drev: 1,
};

/// Matter Light Sensor device type
///
/// Device Type ID: 0x0106 (262 decimal)
/// Device Type Revision: 1
///
/// Required clusters:
/// - IlluminanceMeasurement (0x0400)
/// - Descriptor (standard)
pub const DEV_TYPE_LIGHT_SENSOR: DeviceType = DeviceType {
    dtype: 0x0106,
    drev: 1,
};
