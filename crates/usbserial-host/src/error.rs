//! Mapping of serial port errors onto the transport taxonomy

use std::io;

use usbserial_core::TransportError;

/// Convert a `serialport` error into a [`TransportError`]
pub(crate) fn transport_error(e: serialport::Error) -> TransportError {
    match e.kind() {
        serialport::ErrorKind::NoDevice => {
            TransportError::Io(io::Error::new(io::ErrorKind::NotFound, e.description))
        }
        serialport::ErrorKind::InvalidInput => TransportError::Unsupported(e.description),
        serialport::ErrorKind::Io(kind) => TransportError::Io(io::Error::new(kind, e.description)),
        _ => TransportError::Driver(e.description),
    }
}

/// Convert an I/O error of a read or write, folding timeouts
pub(crate) fn io_error(e: io::Error) -> TransportError {
    if e.kind() == io::ErrorKind::TimedOut {
        TransportError::Timeout
    } else {
        TransportError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_is_unsupported() {
        let err = transport_error(serialport::Error::new(
            serialport::ErrorKind::InvalidInput,
            "bad baud",
        ));
        assert!(matches!(err, TransportError::Unsupported(msg) if msg == "bad baud"));
    }

    #[test]
    fn test_io_kind_is_kept() {
        let err = transport_error(serialport::Error::new(
            serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied),
            "denied",
        ));
        match err {
            TransportError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_timeout_folding() {
        let err = io_error(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert!(matches!(err, TransportError::Timeout));
        let err = io_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(matches!(err, TransportError::Io(_)));
    }
}
