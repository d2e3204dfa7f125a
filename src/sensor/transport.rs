//! Byte transport between the bridge and the radar.
//!
//! The link only needs two things from a transport: a read that never blocks
//! and a write for short command frames. The serial implementation sits on
//! the `serialport` crate, which also handles non-standard rates such as the
//! LD2410's 256000 baud default.

use crate::error::LinkError;
use log::debug;
use serde::{Deserialize, Serialize};
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;
use strum::{Display, EnumString};

/// Character framing of the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
pub enum Framing {
    #[default]
    #[strum(serialize = "8N1")]
    EightNoneOne,
    #[strum(serialize = "8E1")]
    EightEvenOne,
    #[strum(serialize = "8O1")]
    EightOddOne,
    #[strum(serialize = "8N2")]
    EightNoneTwo,
}

impl Framing {
    pub fn data_bits(&self) -> DataBits {
        DataBits::Eight
    }

    pub fn parity(&self) -> Parity {
        match self {
            Framing::EightEvenOne => Parity::Even,
            Framing::EightOddOne => Parity::Odd,
            Framing::EightNoneOne | Framing::EightNoneTwo => Parity::None,
        }
    }

    pub fn stop_bits(&self) -> StopBits {
        match self {
            Framing::EightNoneTwo => StopBits::Two,
            _ => StopBits::One,
        }
    }
}

/// Line settings applied when the link is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub framing: Framing,
}

/// A byte stream to the sensor.
pub trait SerialTransport {
    /// Read whatever bytes are already buffered. Returns `Ok(0)` when nothing
    /// is available; must never wait for data.
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write a complete command frame.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Apply line settings. In-memory transports have nothing to configure.
    fn configure(&mut self, _settings: &LineSettings) -> Result<(), LinkError> {
        Ok(())
    }
}

/// Serial port transport (e.g. `/dev/ttyUSB0`).
pub struct SerialPortTransport {
    port: Box<dyn SerialPort>,
}

impl SerialPortTransport {
    /// Open `path` at `baud_rate`, 8N1. [`SerialTransport::configure`]
    /// applies the final settings.
    pub fn open(path: impl AsRef<Path>, baud_rate: u32) -> Result<Self, LinkError> {
        if baud_rate == 0 {
            return Err(LinkError::UnsupportedBaudRate(baud_rate));
        }
        let port = serialport::new(path.as_ref().to_string_lossy(), baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(Duration::ZERO)
            .open()?;
        Ok(Self::new(port))
    }

    /// Wrap an already opened port.
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }

    pub fn baud_rate(&self) -> Result<u32, LinkError> {
        Ok(self.port.baud_rate()?)
    }
}

impl SerialTransport for SerialPortTransport {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.port.bytes_to_read().map_err(io::Error::from)? as usize;
        if available == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = available.min(buf.len());
        match self.port.read(&mut buf[..want]) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn configure(&mut self, settings: &LineSettings) -> Result<(), LinkError> {
        if settings.baud_rate == 0 {
            return Err(LinkError::UnsupportedBaudRate(settings.baud_rate));
        }

        self.port.set_baud_rate(settings.baud_rate)?;
        self.port.set_data_bits(settings.framing.data_bits())?;
        self.port.set_parity(settings.framing.parity())?;
        self.port.set_stop_bits(settings.framing.stop_bits())?;
        self.port.clear(ClearBuffer::All)?;
        debug!(
            "Serial line configured: {} baud, {}",
            settings.baud_rate, settings.framing
        );
        Ok(())
    }
}
