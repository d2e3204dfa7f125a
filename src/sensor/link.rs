//! Serial link to the LD2410 presence radar.
//!
//! `SensorLink` owns the transport and the receive buffer. A link can only be
//! obtained through [`SensorLink::initialize`], which fails unless the sensor
//! answers the capability probe, so a running bridge never reads values from a
//! sensor that was never there.

use super::frame::{
    self, DataFrame, Decoded, FirmwareVersion, Frame, SensorParameters, command,
};
use super::transport::{Framing, LineSettings, SerialTransport};
use crate::error::LinkError;
use heapless::Vec;
use log::{debug, info, warn};
use std::io;
use std::time::{Duration, Instant};

/// Receive buffer size; holds a few maximum-size frames.
pub const RX_CAPACITY: usize = 256;

/// Max gates assumed when the sensor parameters could not be read.
const DEFAULT_MAX_GATE: u8 = 8;

/// Sleep between receive attempts while waiting for a command ACK.
const ACK_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Startup configuration for the link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub baud_rate: u32,
    pub framing: Framing,
    /// Budget for each command acknowledgement, including the probe
    pub handshake_timeout: Duration,
    /// Engineering mode (adds per-gate energies and the light level)
    pub enhanced: bool,
    /// Seconds without a target before the sensor reports "no one"
    pub quiet_timeout_secs: u8,
    /// Log every decoded frame
    pub debug_frames: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: 256_000,
            framing: Framing::EightNoneOne,
            handshake_timeout: Duration::from_millis(2000),
            enhanced: true,
            quiet_timeout_secs: 5,
            debug_frames: false,
        }
    }
}

/// Kind of frame returned by [`SensorLink::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    BasicData,
    EngineeringData,
    Ack(u16),
}

impl FrameKind {
    pub fn is_data(&self) -> bool {
        matches!(self, FrameKind::BasicData | FrameKind::EngineeringData)
    }
}

/// Diagnostics counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub frames_decoded: u32,
    pub frames_dropped: u32,
    /// Bytes thrown away while looking for a frame header
    pub bytes_discarded: u32,
}

pub struct SensorLink<T: SerialTransport> {
    transport: T,
    rx: Vec<u8, RX_CAPACITY>,
    presence: bool,
    light_level: u8,
    enhanced: bool,
    quiet_timeout: Option<u8>,
    firmware: Option<FirmwareVersion>,
    parameters: Option<SensorParameters>,
    command_timeout: Duration,
    debug_frames: bool,
    stats: LinkStats,
}

impl<T: SerialTransport> SensorLink<T> {
    /// Open the link and probe the sensor.
    ///
    /// Fails with [`LinkError::HandshakeFailed`] if the line cannot be
    /// configured or the sensor does not answer within the timeout budget.
    /// Mode and quiet-timeout setup failures are logged and tolerated.
    pub fn initialize(mut transport: T, config: &LinkConfig) -> Result<Self, LinkError> {
        transport
            .configure(&LineSettings {
                baud_rate: config.baud_rate,
                framing: config.framing,
            })
            .map_err(|e| LinkError::HandshakeFailed(format!("serial line setup: {e}")))?;

        let mut link = Self {
            transport,
            rx: Vec::new(),
            presence: false,
            light_level: 0,
            enhanced: false,
            quiet_timeout: None,
            firmware: None,
            parameters: None,
            command_timeout: config.handshake_timeout,
            debug_frames: config.debug_frames,
            stats: LinkStats::default(),
        };

        link.probe()
            .map_err(|e| LinkError::HandshakeFailed(e.to_string()))?;
        match link.firmware {
            Some(fw) => info!("LD2410 answered, firmware {}", fw),
            None => info!("LD2410 answered (firmware version unreadable)"),
        }

        // Failures are logged by the setters and leave the defaults in place.
        link.configure_mode(config.enhanced).ok();
        link.set_quiet_timeout(config.quiet_timeout_secs).ok();

        Ok(link)
    }

    fn probe(&mut self) -> Result<(), LinkError> {
        self.in_config_mode(|link| {
            let ack = link.command(command::READ_FIRMWARE, &[])?;
            link.firmware = FirmwareVersion::parse(&ack.data);

            match link.command(command::READ_PARAMETERS, &[]) {
                Ok(ack) => link.parameters = SensorParameters::parse(&ack.data),
                Err(e) => debug!("Reading sensor parameters failed: {}", e),
            }
            if let Some(params) = link.parameters {
                link.quiet_timeout = u8::try_from(params.no_one_duration).ok();
            }
            Ok(())
        })
    }

    /// Switch between engineering (enhanced) and basic reporting.
    ///
    /// On failure the link falls back to basic decoding. Waits for the ACKs
    /// (up to the handshake timeout per command), so it only runs during
    /// [`initialize`](Self::initialize).
    pub(crate) fn configure_mode(&mut self, enhanced: bool) -> Result<(), LinkError> {
        let cmd = if enhanced {
            command::ENABLE_ENGINEERING
        } else {
            command::END_ENGINEERING
        };
        match self.in_config_mode(|link| link.command(cmd, &[]).map(|_| ())) {
            Ok(()) => {
                self.enhanced = enhanced;
                info!(
                    "Sensor reporting mode: {}",
                    if enhanced { "engineering" } else { "basic" }
                );
                Ok(())
            }
            Err(e) => {
                self.enhanced = false;
                warn!("Failed to set sensor mode, using basic decoding: {}", e);
                Err(e)
            }
        }
    }

    /// Set the sensor's "no one" debounce window in seconds.
    ///
    /// On failure the previous window is kept. Waits for the ACKs like
    /// [`configure_mode`](Self::configure_mode).
    pub(crate) fn set_quiet_timeout(&mut self, seconds: u8) -> Result<(), LinkError> {
        let (moving, stationary) = self
            .parameters
            .map(|p| (p.max_moving_gate, p.max_stationary_gate))
            .unwrap_or((DEFAULT_MAX_GATE, DEFAULT_MAX_GATE));
        let value = frame::gates_and_duration_value(moving, stationary, seconds as u16);

        match self.in_config_mode(|link| {
            link.command(command::SET_MAX_GATES_AND_DURATION, &value)
                .map(|_| ())
        }) {
            Ok(()) => {
                self.quiet_timeout = Some(seconds);
                info!("Sensor quiet timeout set to {}s", seconds);
                Ok(())
            }
            Err(e) => {
                warn!(
                    "Failed to set sensor quiet timeout, keeping {:?}: {}",
                    self.quiet_timeout, e
                );
                Err(e)
            }
        }
    }

    /// Drain buffered bytes and decode at most one frame. Never blocks.
    pub fn poll(&mut self) -> Option<FrameKind> {
        self.next_frame().map(|frame| match frame {
            Frame::Data(data) if data.engineering.is_some() => FrameKind::EngineeringData,
            Frame::Data(_) => FrameKind::BasicData,
            Frame::Ack(ack) => FrameKind::Ack(ack.command),
        })
    }

    /// Presence flag of the most recent data frame.
    pub fn last_presence(&self) -> bool {
        self.presence
    }

    /// Light level of the most recent engineering frame.
    pub fn last_light_level(&self) -> u8 {
        self.light_level
    }

    pub fn enhanced(&self) -> bool {
        self.enhanced
    }

    pub fn quiet_timeout(&self) -> Option<u8> {
        self.quiet_timeout
    }

    pub fn firmware(&self) -> Option<FirmwareVersion> {
        self.firmware
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    fn next_frame(&mut self) -> Option<Frame> {
        self.fill();
        loop {
            match frame::decode(&self.rx) {
                Decoded::Incomplete => return None,
                Decoded::Skip(n) => {
                    self.stats.bytes_discarded = self
                        .stats
                        .bytes_discarded
                        .saturating_add(u32::try_from(n).unwrap_or(u32::MAX));
                    self.consume(n);
                }
                Decoded::Malformed(e, n) => {
                    self.stats.frames_dropped = self.stats.frames_dropped.saturating_add(1);
                    debug!("Dropping malformed sensor frame: {}", e);
                    self.consume(n);
                }
                Decoded::Frame(frame, n) => {
                    self.consume(n);
                    self.stats.frames_decoded = self.stats.frames_decoded.saturating_add(1);
                    if let Frame::Data(data) = &frame {
                        self.apply(data);
                    }
                    return Some(frame);
                }
            }
        }
    }

    fn apply(&mut self, data: &DataFrame) {
        self.presence = data.presence();
        if let Some(level) = data.light_level() {
            self.light_level = level;
        }
        if self.debug_frames {
            debug!(
                "Sensor frame: {:?}, moving {}cm/{}, stationary {}cm/{}, light {:?}",
                data.target.state,
                data.target.moving_distance,
                data.target.moving_energy,
                data.target.stationary_distance,
                data.target.stationary_energy,
                data.light_level()
            );
        }
    }

    /// Move whatever the transport has buffered into the receive buffer.
    fn fill(&mut self) {
        let mut chunk = [0u8; 64];
        while self.rx.len() < RX_CAPACITY {
            let want = (RX_CAPACITY - self.rx.len()).min(chunk.len());
            match self.transport.read_available(&mut chunk[..want]) {
                Ok(0) => break,
                Ok(n) => {
                    if self.rx.extend_from_slice(&chunk[..n]).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Serial read failed: {}", e);
                    break;
                }
            }
        }
    }

    fn consume(&mut self, n: usize) {
        let len = self.rx.len();
        let n = n.min(len);
        self.rx.copy_within(n..len, 0);
        self.rx.truncate(len - n);
    }

    /// Run `f` between enable-config and end-config commands. End-config is
    /// always attempted.
    fn in_config_mode<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, LinkError>,
    ) -> Result<R, LinkError> {
        self.command(command::ENABLE_CONFIG, &[0x01, 0x00])?;
        let result = f(self);
        let end = self.command(command::END_CONFIG, &[]);
        let value = result?;
        end?;
        Ok(value)
    }

    /// Send a command and wait (bounded) for its acknowledgement.
    fn command(&mut self, cmd: u16, value: &[u8]) -> Result<frame::Ack, LinkError> {
        let bytes = frame::encode_command(cmd, value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.transport.write_all(&bytes)?;

        let deadline = Instant::now() + self.command_timeout;
        loop {
            match self.next_frame() {
                Some(Frame::Ack(ack)) if ack.command == cmd => {
                    if !ack.is_success() {
                        return Err(LinkError::CommandRejected {
                            command: cmd,
                            status: ack.status,
                        });
                    }
                    return Ok(ack);
                }
                Some(_) => continue,
                None if Instant::now() >= deadline => {
                    return Err(LinkError::Timeout { command: cmd });
                }
                None => std::thread::sleep(ACK_POLL_INTERVAL),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sensor::frame::tests::{ack_frame, basic_frame, engineering_frame};
    use crate::sensor::transport::mock::MockTransport;

    pub(crate) fn test_config() -> LinkConfig {
        LinkConfig {
            handshake_timeout: Duration::from_millis(20),
            ..LinkConfig::default()
        }
    }

    /// Answers every command like a healthy sensor, rejecting the listed ones.
    pub(crate) fn sensor(rejected: &'static [u16]) -> MockTransport {
        MockTransport::with_responder(move |written| {
            let cmd = u16::from_le_bytes([written[6], written[7]]);
            if rejected.contains(&cmd) {
                return ack_frame(cmd, 1, &[]);
            }
            let data: std::vec::Vec<u8> = match cmd {
                command::ENABLE_CONFIG => vec![0x01, 0x00, 0x40, 0x00],
                command::READ_FIRMWARE => vec![0x00, 0x01, 0x07, 0x02, 0x16, 0x24, 0x06, 0x22],
                command::READ_PARAMETERS => {
                    let mut d = vec![0xAA, 0x08, 0x06, 0x06];
                    d.extend_from_slice(&[40; 18]);
                    d.extend_from_slice(&[0x0A, 0x00]);
                    d
                }
                _ => vec![],
            };
            ack_frame(cmd, 0, &data)
        })
    }

    #[test]
    fn test_initialize_probes_and_configures() {
        let transport = sensor(&[]);
        let link = SensorLink::initialize(transport.clone(), &test_config()).unwrap();

        assert_eq!(link.firmware().unwrap().to_string(), "V2.07.22062416");
        assert!(link.enhanced());
        assert_eq!(link.quiet_timeout(), Some(5));

        let commands = transport.commands();
        assert_eq!(
            &commands[..4],
            &[
                command::ENABLE_CONFIG,
                command::READ_FIRMWARE,
                command::READ_PARAMETERS,
                command::END_CONFIG
            ]
        );
        assert!(commands.contains(&command::ENABLE_ENGINEERING));

        // quiet timeout keeps the gates read from the sensor
        let written = transport.written();
        let set = written
            .iter()
            .find(|f| u16::from_le_bytes([f[6], f[7]]) == command::SET_MAX_GATES_AND_DURATION)
            .unwrap();
        assert_eq!(&set[8..], {
            let mut expected = frame::gates_and_duration_value(6, 6, 5).to_vec();
            expected.extend_from_slice(&frame::CMD_FOOTER);
            expected
        });
    }

    #[test]
    fn test_silent_sensor_fails_handshake() {
        let err = SensorLink::initialize(MockTransport::default(), &test_config())
            .err()
            .unwrap();
        assert!(matches!(err, LinkError::HandshakeFailed(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_mode_failure_falls_back_to_basic() {
        let link = SensorLink::initialize(sensor(&[command::ENABLE_ENGINEERING]), &test_config())
            .unwrap();
        assert!(!link.enhanced());
    }

    #[test]
    fn test_quiet_timeout_failure_keeps_previous_window() {
        let link = SensorLink::initialize(
            sensor(&[command::SET_MAX_GATES_AND_DURATION]),
            &test_config(),
        )
        .unwrap();
        // the window read from the sensor parameters survives
        assert_eq!(link.quiet_timeout(), Some(10));
    }

    #[test]
    fn test_poll_without_bytes_returns_none() {
        let transport = sensor(&[]);
        let mut link = SensorLink::initialize(transport.clone(), &test_config()).unwrap();
        assert_eq!(link.poll(), None);
        assert!(!link.last_presence());
        assert_eq!(link.last_light_level(), 0);
    }

    #[test]
    fn test_poll_decodes_one_frame_at_a_time() {
        let transport = sensor(&[]);
        let mut link = SensorLink::initialize(transport.clone(), &test_config()).unwrap();

        transport.push(&engineering_frame(0x01, 42));
        transport.push(&basic_frame(0x00));

        assert_eq!(link.poll(), Some(FrameKind::EngineeringData));
        assert!(link.last_presence());
        assert_eq!(link.last_light_level(), 42);

        // basic frames carry no light level
        assert_eq!(link.poll(), Some(FrameKind::BasicData));
        assert!(!link.last_presence());
        assert_eq!(link.last_light_level(), 42);

        assert_eq!(link.poll(), None);
    }

    #[test]
    fn test_frame_split_across_reads() {
        let transport = sensor(&[]);
        let mut link = SensorLink::initialize(transport.clone(), &test_config()).unwrap();

        let bytes = engineering_frame(0x02, 99);
        transport.push(&bytes[..10]);
        assert_eq!(link.poll(), None);
        transport.push(&bytes[10..]);
        assert_eq!(link.poll(), Some(FrameKind::EngineeringData));
        assert_eq!(link.last_light_level(), 99);
    }

    #[test]
    fn test_malformed_frame_keeps_last_values() {
        let transport = sensor(&[]);
        let mut link = SensorLink::initialize(transport.clone(), &test_config()).unwrap();

        transport.push(&engineering_frame(0x01, 30));
        assert!(link.poll().is_some());
        let before = link.stats();

        let mut corrupt = engineering_frame(0x00, 200);
        let tail = corrupt.len() - 6;
        corrupt[tail] = 0x00; // 0x55 tail
        transport.push(&corrupt);

        assert_eq!(link.poll(), None);
        assert!(link.last_presence());
        assert_eq!(link.last_light_level(), 30);
        assert_eq!(link.stats().frames_dropped, before.frames_dropped + 1);
    }

    #[test]
    fn test_garbage_between_frames_is_discarded() {
        let transport = sensor(&[]);
        let mut link = SensorLink::initialize(transport.clone(), &test_config()).unwrap();
        let before = link.stats().bytes_discarded;

        transport.push(&[0x00, 0xFF, 0x12]);
        transport.push(&basic_frame(0x03));
        assert_eq!(link.poll(), Some(FrameKind::BasicData));
        assert!(link.last_presence());
        assert_eq!(link.stats().bytes_discarded, before + 3);
    }

    #[test]
    fn test_stats_saturate_instead_of_overflowing() {
        let transport = sensor(&[]);
        let mut link = SensorLink::initialize(transport.clone(), &test_config()).unwrap();
        link.stats = LinkStats {
            frames_decoded: u32::MAX,
            frames_dropped: u32::MAX,
            bytes_discarded: u32::MAX - 1,
        };

        let mut corrupt = engineering_frame(0x00, 1);
        let tail = corrupt.len() - 6;
        corrupt[tail] = 0x00;
        transport.push(&[0x00, 0x11, 0x22]);
        transport.push(&corrupt);
        transport.push(&basic_frame(0x01));

        assert_eq!(link.poll(), Some(FrameKind::BasicData));
        assert_eq!(
            link.stats(),
            LinkStats {
                frames_decoded: u32::MAX,
                frames_dropped: u32::MAX,
                bytes_discarded: u32::MAX,
            }
        );
    }

    #[test]
    fn test_runtime_mode_switch_to_basic() {
        let transport = sensor(&[]);
        let mut link = SensorLink::initialize(transport.clone(), &test_config()).unwrap();
        assert!(link.enhanced());
        link.configure_mode(false).unwrap();
        assert!(!link.enhanced());
        assert!(transport.commands().contains(&command::END_ENGINEERING));
    }

    #[test]
    fn test_poll_drains_large_backlog_in_bounded_steps() {
        let transport = sensor(&[]);
        let mut link = SensorLink::initialize(transport.clone(), &test_config()).unwrap();

        for _ in 0..20 {
            transport.push(&engineering_frame(0x01, 7));
        }
        let mut frames = 0;
        while link.poll().is_some() {
            frames += 1;
        }
        assert_eq!(frames, 20);
        assert_eq!(transport.pending(), 0);
    }
}
