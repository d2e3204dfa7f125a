use thiserror::Error as ThisError;

/// Errors raised by the serial link to the presence radar.
#[derive(ThisError, Debug)]
pub enum LinkError {
    /// The sensor did not answer the capability probe. Fatal: the bridge has
    /// no other way to sense presence.
    #[error("Sensor handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Sensor did not acknowledge command 0x{command:04X} in time")]
    Timeout { command: u16 },

    #[error("Sensor rejected command 0x{command:04X} with status {status}")]
    CommandRejected { command: u16, status: u16 },

    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

impl LinkError {
    /// Whether this error must halt the bridge.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::HandshakeFailed(_))
    }
}

/// Errors reported by an attribute sink.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Attribute sink has not begun")]
    NotStarted,

    #[error("Invalid endpoint id: {0}")]
    InvalidEndpoint(u16),

    #[error("Endpoint {0} is already bound")]
    AlreadyBound(u16),

    #[error("Attribute write rejected: {0}")]
    Rejected(String),
}

/// Attribute names used in bridge errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Attribute {
    #[strum(serialize = "occupancy")]
    Occupancy,
    #[strum(serialize = "illuminance")]
    Illuminance,
}

/// Errors surfaced by the reconcile step.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Attribute sink is not ready")]
    SinkNotReady,

    #[error("Failed to write {attribute} attribute: {source}")]
    WriteFailed {
        attribute: Attribute,
        #[source]
        source: SinkError,
    },
}

/// Errors raised while waiting for the network join.
#[derive(ThisError, Debug)]
pub enum JoinError {
    #[error("Unknown device role: {0}")]
    UnknownRole(String),

    #[error("Role probe command failed: {0}")]
    ProbeFailed(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
