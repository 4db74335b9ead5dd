//! usbserial-host - Host backend for usbserial
//!
//! Enumerates USB devices with `nusb` and talks to them through the serial
//! nodes the kernel creates for them, using the `serialport` crate. The
//! kernel's chipset drivers do the USB side, so every [`DriverKind`] maps to
//! the same tty-backed port.
//!
//! [`DriverKind`]: usbserial_core::DriverKind

#![warn(missing_docs)]

mod enumerate;
mod error;
mod permission;
mod tty;

pub use enumerate::NusbHost;
pub use permission::{HostConnection, HostPermissionGate};
pub use tty::{find_nodes, HostDriverFactory, TtyDriver, TtyPort};
