//! Open session state machine
//!
//! ```text
//! Closed ─open─▶ Probing ─▶ AwaitingPermission ─▶ Opening ─▶ Reading
//!   ▲                │                │               │          │ close
//!   └────────────────┴────── error ───┴───────────────┘          ▼
//!   └──────────────────────────────────────────────────────── Closing
//! ```
//!
//! The phases before `Reading` are tracked by the registry while the open
//! runs; a [`Session`] only exists from `Reading` on. A failed open never
//! produces one.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use usbserial_core::{
    DeviceDescriptor, DeviceId, DriverKind, EventSink, LineConfig, SessionError, TransportError,
    UsbSerialPort,
};

use crate::config::SessionConfig;
use crate::read_loop::{LoopHealth, ReadLoop, ReadLoopParams};

/// Lifecycle state of a device's session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session
    Closed,
    /// Selecting a driver
    Probing,
    /// Acquiring a connection from the permission gate
    AwaitingPermission,
    /// Opening and configuring the port
    Opening,
    /// Open, read loop running (or dead after a read error)
    Reading,
    /// Close in progress
    Closing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Closed => "closed",
            SessionState::Probing => "probing",
            SessionState::AwaitingPermission => "awaiting permission",
            SessionState::Opening => "opening",
            SessionState::Reading => "reading",
            SessionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Result of a successful `open`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedSession {
    /// Device the session belongs to
    pub device_id: DeviceId,
    /// Product name of the device, empty if it has none
    pub product_name: String,
    /// Driver the session uses
    pub driver: DriverKind,
}

/// One open device: its port, its read loop, and its state
pub struct Session {
    device: DeviceDescriptor,
    driver: DriverKind,
    line: LineConfig,
    port: Arc<dyn UsbSerialPort>,
    state: Mutex<SessionState>,
    // Held across each write; close takes it to wait out in-flight sends
    io: Mutex<()>,
    reader: Mutex<Option<ReadLoop>>,
    health: Arc<LoopHealth>,
    write_timeout: Duration,
    close_grace: Duration,
}

impl Session {
    /// Wrap an opened, configured port and start its read loop
    ///
    /// On failure the port is closed again.
    pub(crate) fn start(
        device: DeviceDescriptor,
        driver: DriverKind,
        line: LineConfig,
        port: Arc<dyn UsbSerialPort>,
        sink: Arc<dyn EventSink>,
        config: &SessionConfig,
    ) -> Result<Arc<Self>, SessionError> {
        let health = Arc::new(LoopHealth::default());
        let reader = ReadLoop::spawn(ReadLoopParams {
            device_id: device.device_id,
            port: port.clone(),
            sink,
            read_timeout: config.read_timeout,
            buffer_size: config.read_buffer_size,
            health: health.clone(),
        });

        let reader = match reader {
            Ok(reader) => reader,
            Err(e) => {
                close_quietly(port.as_ref(), device.device_id, "read loop start failed");
                return Err(SessionError::OpenFailed {
                    device_id: device.device_id,
                    reason: format!("failed to start read loop: {}", e),
                });
            }
        };

        Ok(Arc::new(Self {
            device,
            driver,
            line,
            port,
            state: Mutex::new(SessionState::Reading),
            io: Mutex::new(()),
            reader: Mutex::new(Some(reader)),
            health,
            write_timeout: config.write_timeout,
            close_grace: config.close_grace,
        }))
    }

    /// Device id of this session
    pub fn device_id(&self) -> DeviceId {
        self.device.device_id
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Error that stopped the read loop, if it stopped on its own
    pub fn read_failure(&self) -> Option<String> {
        self.health.failure()
    }

    /// Identity reported back to the caller of `open`
    pub fn summary(&self) -> OpenedSession {
        OpenedSession {
            device_id: self.device.device_id,
            product_name: self.device.product_name_or_empty().to_string(),
            driver: self.driver,
        }
    }

    /// Write `data` to the port
    ///
    /// A failed write leaves the session open. Once the read loop has died,
    /// writes fail without touching the port.
    pub fn send(&self, data: &[u8]) -> Result<(), SessionError> {
        let _io = self.io.lock();
        if self.state() != SessionState::Reading {
            return Err(SessionError::DeviceNotOpen(self.device_id()));
        }
        if let Some(failure) = self.health.failure() {
            return Err(SessionError::SendFailed(TransportError::Driver(format!(
                "read loop stopped: {}",
                failure
            ))));
        }

        self.port
            .write(data, self.write_timeout)
            .map_err(SessionError::SendFailed)?;
        log::trace!("device {}: sent {} bytes", self.device_id(), data.len());
        Ok(())
    }

    /// Stop the read loop and close the port
    ///
    /// Closing twice is a no-op. A failing port close is reported, but the
    /// session ends up closed either way.
    pub fn close(&self) -> Result<(), SessionError> {
        {
            let mut state = self.state.lock();
            if matches!(*state, SessionState::Closing | SessionState::Closed) {
                return Ok(());
            }
            *state = SessionState::Closing;
        }

        let _io = self.io.lock();
        if let Some(reader) = self.reader.lock().take() {
            if reader.is_finished() {
                log::debug!("device {}: read loop already exited", self.device_id());
            }
            reader.stop(self.close_grace);
        }
        let result = self.port.close();
        *self.state.lock() = SessionState::Closed;

        match result {
            Ok(()) => {
                log::info!("Closed {}", self.device);
                Ok(())
            }
            Err(e) => {
                log::warn!("Closing {} failed: {}", self.device, e);
                Err(SessionError::CloseFailed(e))
            }
        }
    }
}

/// Best-effort close of a port that never became a session
///
/// The close error is only logged; the open failure is what gets reported.
pub(crate) fn close_quietly(port: &dyn UsbSerialPort, device_id: DeviceId, context: &str) {
    if let Err(e) = port.close() {
        log::debug!("device {}: close after {}: {}", device_id, context, e);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state() != SessionState::Closed {
            log::debug!("device {}: closing on drop", self.device_id());
            let _ = self.close();
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("device_id", &self.device.device_id)
            .field("driver", &self.driver)
            .field("line", &self.line)
            .field("state", &self.state())
            .finish()
    }
}
