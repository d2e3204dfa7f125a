//! LD2410 wire format.
//!
//! The radar speaks two frame families over the UART:
//!
//! - Data frames, streamed continuously while the sensor is in normal mode:
//!   `F4 F3 F2 F1 | len (u16 LE) | payload | F8 F7 F6 F5`
//! - Command / ACK frames, exchanged while in config mode:
//!   `FD FC FB FA | len (u16 LE) | command word (u16 LE) | value | 04 03 02 01`
//!
//! A data payload is `type | 0xAA | target block | [engineering block] | 0x55 | 0x00`
//! where type is 0x01 (engineering) or 0x02 (basic).

use heapless::Vec;
use std::fmt;
use strum::FromRepr;
use thiserror::Error;

pub const DATA_HEADER: [u8; 4] = [0xF4, 0xF3, 0xF2, 0xF1];
pub const DATA_FOOTER: [u8; 4] = [0xF8, 0xF7, 0xF6, 0xF5];
pub const CMD_HEADER: [u8; 4] = [0xFD, 0xFC, 0xFB, 0xFA];
pub const CMD_FOOTER: [u8; 4] = [0x04, 0x03, 0x02, 0x01];

/// Largest payload accepted from the sensor. Anything longer is treated as
/// a corrupt length field.
pub const MAX_PAYLOAD_LEN: usize = 64;

/// Header + length + payload + footer.
pub const MAX_FRAME_LEN: usize = 4 + 2 + MAX_PAYLOAD_LEN + 4;

/// Distance gates reported per direction (gate 0 through gate 8).
pub const GATE_COUNT: usize = 9;

const DATA_TYPE_ENGINEERING: u8 = 0x01;
const DATA_TYPE_BASIC: u8 = 0x02;
const DATA_HEAD: u8 = 0xAA;
const DATA_TAIL: u8 = 0x55;
const DATA_CHECK: u8 = 0x00;
const ACK_FLAG: u16 = 0x0100;

/// Target block length: state, moving distance/energy, stationary
/// distance/energy, detection distance.
const TARGET_BLOCK_LEN: usize = 9;

/// Command words understood by the sensor.
pub mod command {
    pub const ENABLE_CONFIG: u16 = 0x00FF;
    pub const END_CONFIG: u16 = 0x00FE;
    pub const SET_MAX_GATES_AND_DURATION: u16 = 0x0060;
    pub const READ_PARAMETERS: u16 = 0x0061;
    pub const ENABLE_ENGINEERING: u16 = 0x0062;
    pub const END_ENGINEERING: u16 = 0x0063;
    pub const READ_FIRMWARE: u16 = 0x00A0;
}

/// Reasons a frame was rejected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload length {0} out of range")]
    BadLength(usize),
    #[error("footer mismatch")]
    BadFooter,
    #[error("missing 0xAA payload head")]
    BadHead,
    #[error("missing 0x55 payload tail")]
    BadTail,
    #[error("non-zero check byte")]
    BadCheck,
    #[error("unknown data type 0x{0:02X}")]
    UnknownDataType(u8),
    #[error("unknown target state {0}")]
    UnknownTargetState(u8),
    #[error("gate count {0} out of range")]
    BadGateCount(u8),
    #[error("payload truncated")]
    Truncated,
    #[error("command frame is not an acknowledgement")]
    NotAnAck,
}

/// Target state byte of a data frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr)]
#[repr(u8)]
pub enum TargetState {
    None = 0x00,
    Moving = 0x01,
    Stationary = 0x02,
    MovingAndStationary = 0x03,
}

/// Target block shared by basic and engineering frames.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TargetReport {
    pub state: TargetState,
    /// Distance to the moving target in cm
    pub moving_distance: u16,
    pub moving_energy: u8,
    /// Distance to the stationary target in cm
    pub stationary_distance: u16,
    pub stationary_energy: u8,
    pub detection_distance: u16,
}

/// Extra block carried by engineering-mode frames.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EngineeringReport {
    pub max_moving_gate: u8,
    pub max_stationary_gate: u8,
    pub moving_energies: Vec<u8, GATE_COUNT>,
    pub stationary_energies: Vec<u8, GATE_COUNT>,
    /// Ambient light level, 0-255
    pub light_level: u8,
    pub out_pin: bool,
}

/// A decoded data frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DataFrame {
    pub target: TargetReport,
    pub engineering: Option<EngineeringReport>,
}

impl DataFrame {
    pub fn presence(&self) -> bool {
        self.target.state != TargetState::None
    }

    pub fn light_level(&self) -> Option<u8> {
        self.engineering.as_ref().map(|e| e.light_level)
    }
}

/// Acknowledgement of a command sent in config mode.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Ack {
    /// The command word being acknowledged (without the ACK flag)
    pub command: u16,
    /// 0 on success
    pub status: u16,
    pub data: Vec<u8, MAX_PAYLOAD_LEN>,
}

impl Ack {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Frame {
    Data(DataFrame),
    Ack(Ack),
}

/// Result of scanning the head of a receive buffer.
#[derive(Debug, Eq, PartialEq)]
pub enum Decoded {
    /// Not enough bytes yet.
    Incomplete,
    /// The leading bytes cannot start a frame and should be discarded.
    Skip(usize),
    /// A frame occupying the leading `usize` bytes.
    Frame(Frame, usize),
    /// A corrupt frame; drop the leading `usize` bytes and rescan.
    Malformed(FrameError, usize),
}

/// Try to decode one frame from the start of `buf`.
pub fn decode(buf: &[u8]) -> Decoded {
    let Some(start) = find_header(buf) else {
        // Keep a trailing partial header so it can complete on the next read.
        let keep = partial_header_suffix(buf);
        return match buf.len() - keep {
            0 => Decoded::Incomplete,
            n => Decoded::Skip(n),
        };
    };
    if start > 0 {
        return Decoded::Skip(start);
    }

    if buf.len() < 6 {
        return Decoded::Incomplete;
    }
    let is_data = buf[..4] == DATA_HEADER;
    let payload_len = u16::from_le_bytes([buf[4], buf[5]]) as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Decoded::Malformed(FrameError::BadLength(payload_len), 1);
    }

    let total = 6 + payload_len + 4;
    if buf.len() < total {
        return Decoded::Incomplete;
    }

    let footer = if is_data { DATA_FOOTER } else { CMD_FOOTER };
    if buf[total - 4..total] != footer {
        return Decoded::Malformed(FrameError::BadFooter, 1);
    }

    let payload = &buf[6..6 + payload_len];
    let parsed = if is_data {
        parse_data(payload).map(Frame::Data)
    } else {
        parse_ack(payload).map(Frame::Ack)
    };
    match parsed {
        Ok(frame) => Decoded::Frame(frame, total),
        Err(e) => Decoded::Malformed(e, total),
    }
}

fn find_header(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == DATA_HEADER || w == CMD_HEADER)
}

fn partial_header_suffix(buf: &[u8]) -> usize {
    (1..=3.min(buf.len()))
        .rev()
        .find(|&n| {
            let tail = &buf[buf.len() - n..];
            DATA_HEADER.starts_with(tail) || CMD_HEADER.starts_with(tail)
        })
        .unwrap_or(0)
}

fn parse_data(payload: &[u8]) -> Result<DataFrame, FrameError> {
    if payload.len() < 2 + TARGET_BLOCK_LEN + 2 {
        return Err(FrameError::Truncated);
    }
    let data_type = payload[0];
    if payload[1] != DATA_HEAD {
        return Err(FrameError::BadHead);
    }
    let len = payload.len();
    if payload[len - 2] != DATA_TAIL {
        return Err(FrameError::BadTail);
    }
    if payload[len - 1] != DATA_CHECK {
        return Err(FrameError::BadCheck);
    }

    let body = &payload[2..len - 2];
    let target = parse_target(&body[..TARGET_BLOCK_LEN])?;
    let engineering = match data_type {
        DATA_TYPE_BASIC => None,
        DATA_TYPE_ENGINEERING => Some(parse_engineering(&body[TARGET_BLOCK_LEN..])?),
        other => return Err(FrameError::UnknownDataType(other)),
    };

    Ok(DataFrame {
        target,
        engineering,
    })
}

fn parse_target(block: &[u8]) -> Result<TargetReport, FrameError> {
    let state =
        TargetState::from_repr(block[0]).ok_or(FrameError::UnknownTargetState(block[0]))?;
    Ok(TargetReport {
        state,
        moving_distance: u16::from_le_bytes([block[1], block[2]]),
        moving_energy: block[3],
        stationary_distance: u16::from_le_bytes([block[4], block[5]]),
        stationary_energy: block[6],
        detection_distance: u16::from_le_bytes([block[7], block[8]]),
    })
}

fn parse_engineering(block: &[u8]) -> Result<EngineeringReport, FrameError> {
    let [max_moving_gate, max_stationary_gate, rest @ ..] = block else {
        return Err(FrameError::Truncated);
    };
    let moving_count = gate_count(*max_moving_gate)?;
    let stationary_count = gate_count(*max_stationary_gate)?;

    // energies for each direction, then light level and OUT pin
    if rest.len() < moving_count + stationary_count + 2 {
        return Err(FrameError::Truncated);
    }
    let (moving, rest) = rest.split_at(moving_count);
    let (stationary, rest) = rest.split_at(stationary_count);

    Ok(EngineeringReport {
        max_moving_gate: *max_moving_gate,
        max_stationary_gate: *max_stationary_gate,
        moving_energies: Vec::from_slice(moving).map_err(|_| FrameError::Truncated)?,
        stationary_energies: Vec::from_slice(stationary).map_err(|_| FrameError::Truncated)?,
        light_level: rest[0],
        out_pin: rest[1] != 0,
    })
}

fn gate_count(max_gate: u8) -> Result<usize, FrameError> {
    let count = max_gate as usize + 1;
    if count > GATE_COUNT {
        return Err(FrameError::BadGateCount(max_gate));
    }
    Ok(count)
}

fn parse_ack(payload: &[u8]) -> Result<Ack, FrameError> {
    if payload.len() < 4 {
        return Err(FrameError::Truncated);
    }
    let word = u16::from_le_bytes([payload[0], payload[1]]);
    if word & ACK_FLAG == 0 {
        return Err(FrameError::NotAnAck);
    }
    Ok(Ack {
        command: word & !ACK_FLAG,
        status: u16::from_le_bytes([payload[2], payload[3]]),
        data: Vec::from_slice(&payload[4..]).map_err(|_| FrameError::BadLength(payload.len()))?,
    })
}

/// Encode a command frame.
pub fn encode_command(command: u16, value: &[u8]) -> Result<Vec<u8, MAX_FRAME_LEN>, FrameError> {
    let payload_len = 2 + value.len();
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(FrameError::BadLength(payload_len));
    }

    let mut frame = Vec::new();
    let overflow = |_| FrameError::BadLength(payload_len);
    frame.extend_from_slice(&CMD_HEADER).map_err(overflow)?;
    frame
        .extend_from_slice(&(payload_len as u16).to_le_bytes())
        .map_err(overflow)?;
    frame
        .extend_from_slice(&command.to_le_bytes())
        .map_err(overflow)?;
    frame.extend_from_slice(value).map_err(overflow)?;
    frame.extend_from_slice(&CMD_FOOTER).map_err(overflow)?;
    Ok(frame)
}

/// Value for the max-gates-and-duration command.
pub fn gates_and_duration_value(
    max_moving_gate: u8,
    max_stationary_gate: u8,
    no_one_duration: u16,
) -> [u8; 18] {
    let mut value = [0u8; 18];
    for (i, (word, param)) in [
        (0x0000u16, max_moving_gate as u32),
        (0x0001, max_stationary_gate as u32),
        (0x0002, no_one_duration as u32),
    ]
    .into_iter()
    .enumerate()
    {
        let at = i * 6;
        value[at..at + 2].copy_from_slice(&word.to_le_bytes());
        value[at + 2..at + 6].copy_from_slice(&param.to_le_bytes());
    }
    value
}

/// Firmware version reported by the read-firmware command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub build: u32,
}

impl FirmwareVersion {
    pub fn parse(data: &[u8]) -> Option<Self> {
        let [_, _, minor, major, b0, b1, b2, b3, ..] = *data else {
            return None;
        };
        Some(Self {
            major,
            minor,
            build: u32::from_le_bytes([b0, b1, b2, b3]),
        })
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}.{:02}.{:08X}", self.major, self.minor, self.build)
    }
}

/// Subset of the read-parameters reply the bridge cares about.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SensorParameters {
    pub max_moving_gate: u8,
    pub max_stationary_gate: u8,
    /// Seconds without a target before "no one" is reported
    pub no_one_duration: u16,
}

impl SensorParameters {
    pub fn parse(data: &[u8]) -> Option<Self> {
        // 0xAA, max gate N, max moving gate, max stationary gate,
        // N+1 moving sensitivities, N+1 stationary sensitivities, duration
        let [0xAA, max_gate, max_moving_gate, max_stationary_gate, ..] = *data else {
            return None;
        };
        let at = 4 + 2 * (max_gate as usize + 1);
        let duration = data.get(at..at + 2)?;
        Some(Self {
            max_moving_gate,
            max_stationary_gate,
            no_one_duration: u16::from_le_bytes([duration[0], duration[1]]),
        })
    }
}
