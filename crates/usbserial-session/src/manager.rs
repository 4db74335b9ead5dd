//! Session manager
//!
//! The caller-facing operations: list devices, query and request
//! permission, open, send, and close. Every operation is keyed by device id
//! and may be called from any thread.

use std::sync::Arc;

use base64::Engine;
use usbserial_core::{
    Connection, DeviceDescriptor, DeviceId, DriverFactory, DriverKind, EventSink, HostError,
    LineConfig, PermissionGate, PermissionStatus, SerialEvent, SessionError, TransportError,
    UsbHost, UsbSerialPort,
};

use crate::config::SessionConfig;
use crate::probe::DriverRegistry;
use crate::registry::{OpenTicket, Reservation, SessionRegistry};
use crate::session::{close_quietly, OpenedSession, Session, SessionState};

/// Owner of every open session
///
/// Dropping the manager closes all sessions.
pub struct SessionManager {
    host: Arc<dyn UsbHost>,
    gate: Arc<dyn PermissionGate>,
    drivers: DriverRegistry,
    sink: Arc<dyn EventSink>,
    registry: SessionRegistry,
    config: SessionConfig,
}

impl SessionManager {
    /// Manager using the built-in probe tables
    pub fn new(
        host: Arc<dyn UsbHost>,
        gate: Arc<dyn PermissionGate>,
        factory: Arc<dyn DriverFactory>,
        sink: Arc<dyn EventSink>,
        config: SessionConfig,
    ) -> Self {
        Self::with_drivers(host, gate, DriverRegistry::new(factory), sink, config)
    }

    /// Manager using an explicit driver registry
    pub fn with_drivers(
        host: Arc<dyn UsbHost>,
        gate: Arc<dyn PermissionGate>,
        drivers: DriverRegistry,
        sink: Arc<dyn EventSink>,
        config: SessionConfig,
    ) -> Self {
        Self {
            host,
            gate,
            drivers,
            sink,
            registry: SessionRegistry::new(),
            config,
        }
    }

    /// Driver selection tables
    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    /// Session configuration in use
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Snapshot of the attached devices
    pub fn list(&self) -> Result<Vec<DeviceDescriptor>, HostError> {
        self.host.list_devices()
    }

    /// Driver `open` would pick for `device`, if any
    pub fn probe(&self, device: &DeviceDescriptor) -> Option<DriverKind> {
        self.drivers.match_kind(device).map(|(kind, _)| kind)
    }

    fn find_device(&self, device_id: DeviceId) -> Result<DeviceDescriptor, SessionError> {
        let devices = self.host.list_devices().map_err(|e| {
            log::warn!("Device lookup for {} failed: {}", device_id, e);
            SessionError::DeviceNotFound(device_id)
        })?;
        devices
            .into_iter()
            .find(|d| d.device_id == device_id)
            .ok_or(SessionError::DeviceNotFound(device_id))
    }

    /// Whether the host lets this process open `device_id`
    pub fn has_permission(&self, device_id: DeviceId) -> Result<bool, SessionError> {
        let device = self.find_device(device_id)?;
        Ok(self.gate.has_permission(&device))
    }

    /// Ask the host for access to `device_id`
    ///
    /// Returns immediately. When a request had to be sent, its answer
    /// arrives later as a [`SerialEvent::PermissionResult`].
    pub fn request_permission(&self, device_id: DeviceId) -> Result<PermissionStatus, SessionError> {
        let device = self.find_device(device_id)?;
        if self.gate.has_permission(&device) {
            return Ok(PermissionStatus::AlreadyGranted);
        }

        log::info!("Requesting permission for {}", device);
        let sink = self.sink.clone();
        self.gate.request_permission(
            &device,
            Box::new(move |granted| {
                log::debug!("device {}: permission granted={}", device_id, granted);
                sink.emit(SerialEvent::PermissionResult { device_id, granted });
            }),
        );
        Ok(PermissionStatus::RequestSent)
    }

    /// Open `device_id` with the given line parameters
    ///
    /// Opening a device that already has a session returns that session's
    /// identity without touching the transport again.
    pub fn open(&self, device_id: DeviceId, line: LineConfig) -> Result<OpenedSession, SessionError> {
        let ticket = match self.registry.reserve(device_id) {
            Reservation::Existing(session) => {
                log::debug!("device {}: already open", device_id);
                return Ok(session.summary());
            }
            Reservation::Reserved(ticket) => ticket,
        };

        let session = self.open_reserved(&ticket, line)?;
        let opened = session.summary();
        ticket.commit(session);
        Ok(opened)
    }

    /// [`open`](Self::open) with the integer line encoding of the bridge
    ///
    /// Invalid values are rejected before any device is touched.
    pub fn open_raw(
        &self,
        device_id: DeviceId,
        baud_rate: u32,
        data_bits: u8,
        stop_bits: u8,
        parity: u8,
    ) -> Result<OpenedSession, SessionError> {
        let line = LineConfig::from_raw(baud_rate, data_bits, stop_bits, parity)?;
        self.open(device_id, line)
    }

    fn open_reserved(
        &self,
        ticket: &OpenTicket<'_>,
        line: LineConfig,
    ) -> Result<Arc<Session>, SessionError> {
        let device_id = ticket.device_id();
        let device = self.find_device(device_id)?;

        let mut selected = self.drivers.select_driver(&device)?;
        let kind = selected.driver.kind();

        ticket.set_phase(SessionState::AwaitingPermission);
        let connection = match self.gate.open_connection(&device) {
            Some(connection) => connection,
            None if !self.gate.has_permission(&device) => {
                return Err(SessionError::PermissionDenied(device_id))
            }
            None => {
                return Err(SessionError::OpenFailed {
                    device_id,
                    reason: "host refused the connection".into(),
                })
            }
        };

        ticket.set_phase(SessionState::Opening);
        let port = selected
            .driver
            .take_port(0)
            .ok_or(SessionError::NotEnoughPorts(device_id))?;

        if let Err(e) = open_port(port.as_ref(), connection, &line) {
            log::warn!("Opening {} failed, rolling back: {}", device, e);
            close_quietly(port.as_ref(), device_id, "rollback");
            return Err(SessionError::OpenFailed {
                device_id,
                reason: e.to_string(),
            });
        }

        let session = Session::start(
            device.clone(),
            kind,
            line,
            port,
            self.sink.clone(),
            &self.config,
        )?;
        log::info!("Opened {} with {} driver at {}", device, kind, line);
        Ok(session)
    }

    /// Write raw bytes to an open device
    pub fn send(&self, device_id: DeviceId, data: &[u8]) -> Result<(), SessionError> {
        self.session(device_id)?.send(data)
    }

    /// Write a base64 encoded payload
    ///
    /// A payload that does not decode fails without writing anything.
    pub fn send_base64(&self, device_id: DeviceId, payload: &str) -> Result<(), SessionError> {
        let session = self.session(device_id)?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| SessionError::InvalidPayload(format!("base64: {}", e)))?;
        session.send(&data)
    }

    /// Write a hex encoded payload such as `"48656c6c6f"`
    pub fn send_hex(&self, device_id: DeviceId, payload: &str) -> Result<(), SessionError> {
        let session = self.session(device_id)?;
        let data = hex::decode(payload.trim())
            .map_err(|e| SessionError::InvalidPayload(format!("hex: {}", e)))?;
        session.send(&data)
    }

    /// Write a text command, optionally terminated by a newline
    pub fn send_command(
        &self,
        device_id: DeviceId,
        command: &str,
        add_newline: bool,
    ) -> Result<(), SessionError> {
        let session = self.session(device_id)?;
        let mut data = command.as_bytes().to_vec();
        if add_newline {
            data.push(b'\n');
        }
        session.send(&data)
    }

    fn session(&self, device_id: DeviceId) -> Result<Arc<Session>, SessionError> {
        self.registry
            .get(device_id)
            .ok_or(SessionError::DeviceNotOpen(device_id))
    }

    /// Close the session of `device_id`
    ///
    /// Closing a device that is not open succeeds. The session is
    /// unregistered even when the transport fails to close.
    pub fn close(&self, device_id: DeviceId) -> Result<(), SessionError> {
        match self.registry.remove(device_id) {
            Some(session) => session.close(),
            None => {
                log::debug!("device {}: close on a device that is not open", device_id);
                Ok(())
            }
        }
    }

    /// Close every open session
    ///
    /// Returns the failures, one per session that did not close cleanly.
    pub fn close_all(&self) -> Vec<(DeviceId, SessionError)> {
        self.registry
            .drain()
            .into_iter()
            .filter_map(|session| session.close().err().map(|e| (session.device_id(), e)))
            .collect()
    }

    /// Lifecycle state of `device_id`
    pub fn state(&self, device_id: DeviceId) -> SessionState {
        self.registry.state(device_id)
    }

    /// Ids of the open sessions, sorted
    pub fn open_sessions(&self) -> Vec<DeviceId> {
        self.registry.open_ids()
    }

    /// Error that stopped the read loop of `device_id`, if it stopped
    pub fn read_failure(&self, device_id: DeviceId) -> Option<String> {
        self.registry.get(device_id)?.read_failure()
    }
}

fn open_port(
    port: &dyn UsbSerialPort,
    connection: Box<dyn Connection>,
    line: &LineConfig,
) -> Result<(), TransportError> {
    port.open(connection)?;
    port.set_parameters(line)
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        for (device_id, e) in self.close_all() {
            log::warn!("device {}: {}", device_id, e);
        }
    }
}
