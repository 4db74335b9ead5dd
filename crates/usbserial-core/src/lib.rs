//! usbserial-core - Core types for USB serial sessions
//!
//! This crate holds everything the session manager and the backends have to
//! agree on: the device snapshot, line parameters, the error taxonomy with its
//! stable error codes, the event model, and the traits behind which the host
//! and the chipset drivers live.
//!
//! # Architecture
//!
//! ```text
//!   UsbHost ──list──▶ DeviceDescriptor ──probe──▶ SerialDriver
//!                                                     │ take_port
//!   PermissionGate ──open_connection──▶ Connection ───┤
//!                                                     ▼
//!                                              UsbSerialPort
//!                                   (open, set_parameters, read, write, close)
//! ```
//!
//! Concrete implementations live in `usbserial-host` (real hardware) and
//! `usbserial-dummy` (in-memory, for tests).

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod device;
pub mod driver;
pub mod error;
pub mod event;
pub mod host;
pub mod line;

pub use device::{DeviceDescriptor, DeviceId};
pub use driver::{Connection, DriverFactory, DriverKind, SerialDriver, UsbSerialPort};
pub use error::{ErrorCode, HostError, LineConfigError, SessionError, TransportError};
pub use event::{EventHub, EventSink, SerialEvent, Subscription};
pub use host::{PermissionCallback, PermissionGate, PermissionStatus, UsbHost};
pub use line::{LineConfig, Parity, StopBits};
