//! Driver trait definitions
//!
//! A chipset driver is picked once per open by the prober and never
//! re-probed afterwards. The driver hands out [`UsbSerialPort`]s; the session
//! owns exactly one of them for its whole lifetime.
//!
//! Port methods take `&self` so that the read loop and the caller-facing
//! `send` can use the same port concurrently. Implementations serialise
//! internally where their backend requires it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::device::DeviceDescriptor;
use crate::error::TransportError;
use crate::line::LineConfig;

/// Family of chipset a driver speaks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    /// USB CDC ACM (Arduino, most microcontroller firmware)
    CdcAcm,
    /// WCH CH340/CH341
    Ch34x,
    /// Silicon Labs CP210x
    Cp21xx,
    /// FTDI FT232/FT2232/FT4232 family
    Ftdi,
    /// Prolific PL2303
    Prolific,
}

impl DriverKind {
    /// Short identifier
    pub const fn name(&self) -> &'static str {
        match self {
            DriverKind::CdcAcm => "cdc_acm",
            DriverKind::Ch34x => "ch34x",
            DriverKind::Cp21xx => "cp21xx",
            DriverKind::Ftdi => "ftdi",
            DriverKind::Prolific => "prolific",
        }
    }

    /// Human-readable description
    pub const fn description(&self) -> &'static str {
        match self {
            DriverKind::CdcAcm => "USB CDC ACM",
            DriverKind::Ch34x => "WCH CH340/CH341",
            DriverKind::Cp21xx => "Silicon Labs CP210x",
            DriverKind::Ftdi => "FTDI FT232/FT2232/FT4232",
            DriverKind::Prolific => "Prolific PL2303",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw connection to a device, handed out by the permission gate
///
/// Holding the connection keeps the host-level claim on the device. The port
/// takes ownership of it on `open` and releases it on `close`.
pub trait Connection: Send {
    /// The device this connection belongs to
    fn device(&self) -> &DeviceDescriptor;
}

/// Byte-level port of a chipset driver
pub trait UsbSerialPort: Send + Sync {
    /// Open the port on top of a granted connection
    fn open(&self, connection: Box<dyn Connection>) -> Result<(), TransportError>;

    /// Apply line parameters
    fn set_parameters(&self, config: &LineConfig) -> Result<(), TransportError>;

    /// Read up to `buf.len()` bytes, waiting at most `timeout`
    ///
    /// Returns 0 when the timeout elapsed without data. That is not an error.
    fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Write all of `data`, waiting at most `timeout`
    fn write(&self, data: &[u8], timeout: Duration) -> Result<(), TransportError>;

    /// Close the port and release the connection
    fn close(&self) -> Result<(), TransportError>;
}

/// A probed driver for one device
pub trait SerialDriver: Send {
    /// Chipset family of this driver
    fn kind(&self) -> DriverKind;

    /// The device the driver was probed for
    fn device(&self) -> &DeviceDescriptor;

    /// Number of communication ports the device exposes
    fn port_count(&self) -> usize;

    /// Take ownership of port `index`
    ///
    /// Returns `None` if the index is out of range or the port was already
    /// taken.
    fn take_port(&mut self, index: usize) -> Option<Arc<dyn UsbSerialPort>>;
}

/// Constructs drivers once the prober has decided on a [`DriverKind`]
pub trait DriverFactory: Send + Sync {
    /// Build the driver of `kind` for `device`
    fn create(&self, kind: DriverKind, device: &DeviceDescriptor) -> Box<dyn SerialDriver>;
}
