use crate::sensor::{Framing, LinkConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::{Display, EnumString};

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    load_dotenv_from(Path::new(".env"));
}

fn load_dotenv_from(env_path: &Path) {
    let Ok(content) = fs::read_to_string(env_path) else {
        return;
    };

    for (key, value) in parse_dotenv(&content) {
        // Env vars take precedence
        if std::env::var(key).is_err() {
            // SAFETY: called from main before the runtime or any thread starts
            unsafe { std::env::set_var(key, value) };
        }
    }
}

/// Split `.env` content into key/value pairs, skipping blanks and comments.
fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let mut value = value.trim();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }
            Some((key.trim(), value))
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub serial: SerialConfig,
    pub sensor: SensorConfig,
    pub bridge: BridgeConfig,
    pub join: JoinConfig,
    pub matter: MatterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    pub device: PathBuf,
    pub baud_rate: u32,
    pub framing: Framing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub enhanced: bool,
    pub debug_frames: bool,
    pub quiet_timeout_secs: u8,
    pub handshake_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub interval_ms: u64,
    /// Hold a per-device lock so two bridges never share one serial port
    pub single_instance: bool,
}

/// How the host learns that it is attached to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum JoinProbeKind {
    /// Ask a local OpenThread daemon via `ot-ctl`
    OtCtl,
    /// Attached by construction (Ethernet, Wi-Fi)
    Static,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinConfig {
    pub probe: JoinProbeKind,
    pub ot_ctl_program: String,
    pub timeout_secs: u64,
    pub probe_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatterConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_name: String,
    pub discriminator: u16,
    pub passcode: u32,
    /// Interface the stack binds to and advertises on
    pub interface: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig {
                device: PathBuf::from("/dev/ttyUSB0"),
                baud_rate: 256_000,
                framing: Framing::EightNoneOne,
            },
            sensor: SensorConfig {
                enhanced: true,
                debug_frames: false,
                quiet_timeout_secs: 5,
                handshake_timeout_ms: 2000,
            },
            bridge: BridgeConfig {
                interval_ms: 10,
                single_instance: true,
            },
            join: JoinConfig {
                probe: JoinProbeKind::Static,
                ot_ctl_program: "ot-ctl".to_string(),
                timeout_secs: 120,
                probe_interval_ms: 1000,
            },
            matter: MatterConfig {
                vendor_id: 0xFFF1,
                product_id: 0x8001,
                device_name: "Presence Sensor".to_string(),
                discriminator: 3840,
                passcode: 20202021,
                interface: "eth0".to_string(),
            },
        }
    }
}

/// Parse an env var, keeping `target` when unset or malformed.
fn env_parse<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => log::warn!("Ignoring invalid {}={:?}", key, raw),
        }
    }
}

/// Parse a boolean env var; accepts 1/0, true/false, yes/no, on/off.
fn env_flag(key: &str, target: &mut bool) {
    if let Ok(raw) = std::env::var(key) {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => *target = true,
            "0" | "false" | "no" | "off" => *target = false,
            _ => log::warn!("Ignoring invalid {}={:?}", key, raw),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Serial port
        if let Ok(device) = std::env::var("SERIAL_DEVICE") {
            config.serial.device = PathBuf::from(device);
        }
        env_parse("SERIAL_BAUD", &mut config.serial.baud_rate);
        env_parse("SERIAL_FRAMING", &mut config.serial.framing);

        // Sensor
        env_flag("SENSOR_ENHANCED", &mut config.sensor.enhanced);
        env_flag("SENSOR_DEBUG_FRAMES", &mut config.sensor.debug_frames);
        env_parse(
            "SENSOR_QUIET_TIMEOUT_SECS",
            &mut config.sensor.quiet_timeout_secs,
        );
        env_parse(
            "SENSOR_HANDSHAKE_TIMEOUT_MS",
            &mut config.sensor.handshake_timeout_ms,
        );

        // Bridge
        env_parse("BRIDGE_INTERVAL_MS", &mut config.bridge.interval_ms);
        env_flag("BRIDGE_SINGLE_INSTANCE", &mut config.bridge.single_instance);

        // Network join
        env_parse("JOIN_PROBE", &mut config.join.probe);
        if let Ok(program) = std::env::var("JOIN_OT_CTL") {
            config.join.ot_ctl_program = program;
        }
        env_parse("JOIN_TIMEOUT_SECS", &mut config.join.timeout_secs);
        env_parse("JOIN_PROBE_INTERVAL_MS", &mut config.join.probe_interval_ms);

        // Matter
        if let Ok(name) = std::env::var("DEVICE_NAME") {
            config.matter.device_name = name;
        }
        env_parse("MATTER_VENDOR_ID", &mut config.matter.vendor_id);
        env_parse("MATTER_PRODUCT_ID", &mut config.matter.product_id);
        env_parse("MATTER_DISCRIMINATOR", &mut config.matter.discriminator);
        env_parse("MATTER_PASSCODE", &mut config.matter.passcode);
        if let Ok(interface) = std::env::var("MATTER_INTERFACE") {
            config.matter.interface = interface;
        }

        config
    }

    /// Startup settings for the sensor link.
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            baud_rate: self.serial.baud_rate,
            framing: self.serial.framing,
            handshake_timeout: Duration::from_millis(self.sensor.handshake_timeout_ms),
            enhanced: self.sensor.enhanced,
            quiet_timeout_secs: self.sensor.quiet_timeout_secs,
            debug_frames: self.sensor.debug_frames,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.bridge.interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join.timeout_secs)
    }

    pub fn join_probe_interval(&self) -> Duration {
        Duration::from_millis(self.join.probe_interval_ms)
    }
}
