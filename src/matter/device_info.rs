//! Device information for the Matter stack.

use crate::config::MatterConfig;
use rs_matter::dm::clusters::basic_info::BasicInfoConfig;

/// Fixed device details; vendor/product IDs and the device name are taken
/// from [`MatterConfig`] at startup.
pub const DEV_INFO: BasicInfoConfig<'static> = BasicInfoConfig {
    vid: 0xFFF1,
    pid: 0x8001,
    hw_ver: 1,
    hw_ver_str: "1",
    sw_ver: 1,
    sw_ver_str: "1.0",
    serial_no: "PMB-001",
    device_name: "PresenceSensor",
    product_name: "Presence Matter Bridge",
    vendor_name: "presence-matter-bridge",
    ..BasicInfoConfig::new()
};

/// Device details with the configured identity applied.
///
/// The name is leaked once; the stack holds it for the process lifetime.
pub fn device_info(config: &MatterConfig) -> BasicInfoConfig<'static> {
    let device_name: &'static str = Box::leak(config.device_name.clone().into_boxed_str());
    BasicInfoConfig {
        vid: config.vendor_id,
        pid: config.product_id,
        device_name,
        ..DEV_INFO
    }
}
