//! Error types for USB serial sessions
//!
//! Every failure a caller can observe maps to one of the stable error codes
//! in [`ErrorCode`]. The string forms are part of the bridge contract and
//! must never change.

use std::fmt;

use thiserror::Error;

use crate::device::DeviceId;

/// Stable error codes exposed on the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No attached device has the requested id
    DeviceNotFound,
    /// Neither the custom table nor the default prober recognised the device
    DriverNotFound,
    /// The driver was found but exposes no port
    NotEnoughPorts,
    /// The host refused access to the device
    PermissionDenied,
    /// Opening or configuring the port failed
    OpenFailed,
    /// No open session for the device
    DeviceNotOpen,
    /// Writing to the port failed
    SendFailed,
    /// Closing the port failed
    DeviceNotOpenOrClosed,
}

impl ErrorCode {
    /// All codes, in declaration order
    pub const ALL: [ErrorCode; 8] = [
        ErrorCode::DeviceNotFound,
        ErrorCode::DriverNotFound,
        ErrorCode::NotEnoughPorts,
        ErrorCode::PermissionDenied,
        ErrorCode::OpenFailed,
        ErrorCode::DeviceNotOpen,
        ErrorCode::SendFailed,
        ErrorCode::DeviceNotOpenOrClosed,
    ];

    /// Wire representation of the code
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DeviceNotFound => "device_not_found",
            ErrorCode::DriverNotFound => "driver_not_found",
            ErrorCode::NotEnoughPorts => "not_enough_ports",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::OpenFailed => "open_failed",
            ErrorCode::DeviceNotOpen => "device_not_open",
            ErrorCode::SendFailed => "send_failed",
            ErrorCode::DeviceNotOpenOrClosed => "device_not_open_or_closed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a transport driver
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error on the underlying connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The port has not been opened, or was already closed
    #[error("port not open")]
    NotOpen,

    /// The port is already open
    #[error("port already open")]
    AlreadyOpen,

    /// The driver cannot express the requested line setting
    #[error("unsupported setting: {0}")]
    Unsupported(String),

    /// Operation timed out
    #[error("operation timed out")]
    Timeout,

    /// Driver-specific failure
    #[error("{0}")]
    Driver(String),
}

/// Errors raised by a host backend
#[derive(Debug, Error)]
pub enum HostError {
    /// Device enumeration failed
    #[error("device enumeration failed: {0}")]
    Enumeration(String),
}

/// Invalid line parameters
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineConfigError {
    /// Baud rate must be positive
    #[error("invalid baud rate: {0}")]
    BaudRate(u32),

    /// Data bits must be within 5-8
    #[error("invalid data bits: {0} (expected 5-8)")]
    DataBits(u8),

    /// Unknown stop bits value
    #[error("invalid stop bits: {0}")]
    StopBits(String),

    /// Unknown parity value
    #[error("invalid parity: {0}")]
    Parity(String),
}

/// Errors returned by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// No attached device has this id
    #[error("device {0} not found")]
    DeviceNotFound(DeviceId),

    /// No driver for the device
    #[error("no driver for device {vendor_id:04x}:{product_id:04x}")]
    DriverNotFound {
        /// USB vendor ID of the device
        vendor_id: u16,
        /// USB product ID of the device
        product_id: u16,
    },

    /// Driver recognised the device but exposes no port
    #[error("not enough ports at device {0}")]
    NotEnoughPorts(DeviceId),

    /// Host refused access to the device
    #[error("connection to device {0} failed: permission denied")]
    PermissionDenied(DeviceId),

    /// Line parameters rejected before touching the device
    #[error("connection failed: {0}")]
    InvalidLineConfig(#[from] LineConfigError),

    /// Connection or port setup failed
    #[error("connection to device {device_id} failed: {reason}")]
    OpenFailed {
        /// Device that failed to open
        device_id: DeviceId,
        /// What went wrong
        reason: String,
    },

    /// No open session for the device
    #[error("device {0} not open")]
    DeviceNotOpen(DeviceId),

    /// Payload could not be decoded from its wire encoding
    #[error("send failed: invalid payload: {0}")]
    InvalidPayload(String),

    /// Write to the port failed
    #[error("send failed: {0}")]
    SendFailed(#[source] TransportError),

    /// Close of the port failed; the session is gone regardless
    #[error("close failed: {0}")]
    CloseFailed(#[source] TransportError),
}

impl SessionError {
    /// Stable code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::DeviceNotFound(_) => ErrorCode::DeviceNotFound,
            SessionError::DriverNotFound { .. } => ErrorCode::DriverNotFound,
            SessionError::NotEnoughPorts(_) => ErrorCode::NotEnoughPorts,
            SessionError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            SessionError::InvalidLineConfig(_) | SessionError::OpenFailed { .. } => {
                ErrorCode::OpenFailed
            }
            SessionError::DeviceNotOpen(_) => ErrorCode::DeviceNotOpen,
            SessionError::InvalidPayload(_) | SessionError::SendFailed(_) => ErrorCode::SendFailed,
            SessionError::CloseFailed(_) => ErrorCode::DeviceNotOpenOrClosed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_strings() {
        let codes: Vec<&str> = ErrorCode::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(
            codes,
            [
                "device_not_found",
                "driver_not_found",
                "not_enough_ports",
                "permission_denied",
                "open_failed",
                "device_not_open",
                "send_failed",
                "device_not_open_or_closed",
            ]
        );
    }

    #[test]
    fn test_session_error_codes() {
        let err = SessionError::InvalidPayload("bad base64".into());
        assert_eq!(err.code(), ErrorCode::SendFailed);

        let err = SessionError::CloseFailed(TransportError::NotOpen);
        assert_eq!(err.code(), ErrorCode::DeviceNotOpenOrClosed);

        let err = SessionError::from(LineConfigError::DataBits(9));
        assert_eq!(err.code(), ErrorCode::OpenFailed);
    }

    #[test]
    fn test_driver_not_found_message() {
        let err = SessionError::DriverNotFound {
            vendor_id: 0x1234,
            product_id: 0xabcd,
        };
        assert_eq!(err.to_string(), "no driver for device 1234:abcd");
    }
}
