//! Ports backed by kernel serial nodes
//!
//! On the host the chipset protocol (CDC ACM, CH34x, CP210x, FTDI, PL2303)
//! is spoken by the kernel driver, which exposes each port as a tty node.
//! A [`TtyDriver`] therefore only has to find the nodes belonging to a USB
//! device; every driver kind shares the same [`TtyPort`].

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serialport::{SerialPort, SerialPortType};
use usbserial_core::{
    Connection, DeviceDescriptor, DriverFactory, DriverKind, LineConfig, Parity, SerialDriver,
    StopBits, TransportError, UsbSerialPort,
};

use crate::error::{io_error, transport_error};

/// Baud rate a node is opened with before `set_parameters`
const OPEN_BAUD_RATE: u32 = 9600;

/// Find the serial nodes of `device`, sorted by name
///
/// A node matches on vendor and product ID. When both sides report a serial
/// number it has to match too, which tells identical adapters apart.
pub fn find_nodes(device: &DeviceDescriptor) -> Vec<String> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            log::warn!("Failed to list serial ports: {}", e);
            return Vec::new();
        }
    };

    let mut nodes: Vec<String> = ports
        .into_iter()
        .filter(|p| match &p.port_type {
            SerialPortType::UsbPort(usb) => {
                usb.vid == device.vendor_id
                    && usb.pid == device.product_id
                    && match (&usb.serial_number, &device.serial_number) {
                        (Some(a), Some(b)) => a == b,
                        _ => true,
                    }
            }
            _ => false,
        })
        .map(|p| p.port_name)
        .collect();
    nodes.sort();
    nodes.dedup();

    log::debug!("{}: serial nodes {:?}", device, nodes);
    nodes
}

fn data_bits(bits: u8) -> Result<serialport::DataBits, TransportError> {
    match bits {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        other => Err(TransportError::Unsupported(format!("{} data bits", other))),
    }
}

fn stop_bits(bits: StopBits) -> Result<serialport::StopBits, TransportError> {
    match bits {
        StopBits::One => Ok(serialport::StopBits::One),
        StopBits::Two => Ok(serialport::StopBits::Two),
        StopBits::OnePointFive => Err(TransportError::Unsupported(
            "1.5 stop bits on a tty".into(),
        )),
    }
}

fn parity(parity: Parity) -> Result<serialport::Parity, TransportError> {
    match parity {
        Parity::None => Ok(serialport::Parity::None),
        Parity::Odd => Ok(serialport::Parity::Odd),
        Parity::Even => Ok(serialport::Parity::Even),
        Parity::Mark | Parity::Space => Err(TransportError::Unsupported(format!(
            "{} parity on a tty",
            parity
        ))),
    }
}

type Handle = Arc<Mutex<Box<dyn SerialPort>>>;

struct OpenNode {
    // Separate handles so a blocked read never delays a write
    reader: Handle,
    writer: Handle,
    _connection: Box<dyn Connection>,
}

/// One kernel serial node
pub struct TtyPort {
    node: String,
    open: Mutex<Option<OpenNode>>,
}

impl TtyPort {
    /// Port for the node at `node`, not yet opened
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            open: Mutex::new(None),
        }
    }

    /// Path of the node
    pub fn node(&self) -> &str {
        &self.node
    }

    fn handle(&self, pick: fn(&OpenNode) -> &Handle) -> Result<Handle, TransportError> {
        self.open
            .lock()
            .as_ref()
            .map(|node| pick(node).clone())
            .ok_or(TransportError::NotOpen)
    }
}

impl UsbSerialPort for TtyPort {
    fn open(&self, connection: Box<dyn Connection>) -> Result<(), TransportError> {
        let mut open = self.open.lock();
        if open.is_some() {
            return Err(TransportError::AlreadyOpen);
        }

        let reader = serialport::new(&self.node, OPEN_BAUD_RATE)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(transport_error)?;
        let writer = reader.try_clone().map_err(transport_error)?;

        log::info!("Opened {} for {}", self.node, connection.device());
        *open = Some(OpenNode {
            reader: Arc::new(Mutex::new(reader)),
            writer: Arc::new(Mutex::new(writer)),
            _connection: connection,
        });
        Ok(())
    }

    fn set_parameters(&self, config: &LineConfig) -> Result<(), TransportError> {
        let data_bits = data_bits(config.data_bits)?;
        let stop_bits = stop_bits(config.stop_bits)?;
        let parity = parity(config.parity)?;

        // Settings live on the file description, so either handle will do
        let writer = self.handle(|node| &node.writer)?;
        let mut port = writer.lock();
        port.set_baud_rate(config.baud_rate).map_err(transport_error)?;
        port.set_data_bits(data_bits).map_err(transport_error)?;
        port.set_stop_bits(stop_bits).map_err(transport_error)?;
        port.set_parity(parity).map_err(transport_error)?;

        log::debug!("{}: line set to {}", self.node, config);
        Ok(())
    }

    fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let reader = self.handle(|node| &node.reader)?;
        let mut port = reader.lock();

        if port.timeout() != timeout {
            port.set_timeout(timeout).map_err(transport_error)?;
        }
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn write(&self, data: &[u8], timeout: Duration) -> Result<(), TransportError> {
        let writer = self.handle(|node| &node.writer)?;
        let mut port = writer.lock();

        if port.timeout() != timeout {
            port.set_timeout(timeout).map_err(transport_error)?;
        }
        port.write_all(data).map_err(io_error)?;
        port.flush().map_err(io_error)
    }

    fn close(&self) -> Result<(), TransportError> {
        let node = self.open.lock().take().ok_or(TransportError::NotOpen)?;
        drop(node);
        log::debug!("Closed {}", self.node);
        Ok(())
    }
}

/// Driver exposing the serial nodes of one device
pub struct TtyDriver {
    kind: DriverKind,
    device: DeviceDescriptor,
    ports: Vec<Option<TtyPort>>,
}

impl TtyDriver {
    /// Driver over the given nodes
    pub fn new(kind: DriverKind, device: DeviceDescriptor, nodes: Vec<String>) -> Self {
        Self {
            kind,
            device,
            ports: nodes.into_iter().map(|n| Some(TtyPort::new(n))).collect(),
        }
    }
}

impl SerialDriver for TtyDriver {
    fn kind(&self) -> DriverKind {
        self.kind
    }

    fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    fn port_count(&self) -> usize {
        self.ports.len()
    }

    fn take_port(&mut self, index: usize) -> Option<Arc<dyn UsbSerialPort>> {
        let port = self.ports.get_mut(index)?.take()?;
        Some(Arc::new(port))
    }
}

/// Builds [`TtyDriver`]s from the nodes the kernel created for a device
#[derive(Debug, Clone, Copy, Default)]
pub struct HostDriverFactory;

impl HostDriverFactory {
    /// Create a new factory
    pub fn new() -> Self {
        Self
    }
}

impl DriverFactory for HostDriverFactory {
    fn create(&self, kind: DriverKind, device: &DeviceDescriptor) -> Box<dyn SerialDriver> {
        let nodes = find_nodes(device);
        if nodes.is_empty() {
            log::warn!(
                "{} matches the {} driver but has no serial node; is the kernel driver loaded?",
                device,
                kind
            );
        }
        Box::new(TtyDriver::new(kind, device.clone(), nodes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usbserial_core::DeviceId;

    #[test]
    fn test_line_setting_mapping() {
        assert_eq!(data_bits(7).unwrap(), serialport::DataBits::Seven);
        assert!(matches!(data_bits(9), Err(TransportError::Unsupported(_))));
        assert_eq!(stop_bits(StopBits::Two).unwrap(), serialport::StopBits::Two);
        assert!(matches!(
            stop_bits(StopBits::OnePointFive),
            Err(TransportError::Unsupported(_))
        ));
        assert_eq!(parity(Parity::Even).unwrap(), serialport::Parity::Even);
        assert!(matches!(parity(Parity::Mark), Err(TransportError::Unsupported(_))));
        assert!(matches!(parity(Parity::Space), Err(TransportError::Unsupported(_))));
    }

    #[test]
    fn test_unopened_port_rejects_io() {
        let port = TtyPort::new("/dev/ttyUSB-does-not-exist");
        let mut buf = [0u8; 8];
        assert!(matches!(
            port.read(&mut buf, Duration::from_millis(1)),
            Err(TransportError::NotOpen)
        ));
        assert!(matches!(
            port.write(b"x", Duration::from_millis(1)),
            Err(TransportError::NotOpen)
        ));
        assert!(matches!(port.close(), Err(TransportError::NotOpen)));
        assert!(matches!(
            port.set_parameters(&LineConfig::default()),
            Err(TransportError::NotOpen)
        ));
    }

    #[test]
    fn test_driver_ports_are_taken_once() {
        let device = DeviceDescriptor::new(DeviceId(1), 0x0403, 0x6010);
        let mut driver = TtyDriver::new(
            DriverKind::Ftdi,
            device,
            vec!["/dev/ttyUSB0".into(), "/dev/ttyUSB1".into()],
        );
        assert_eq!(driver.port_count(), 2);
        assert!(driver.take_port(1).is_some());
        assert!(driver.take_port(1).is_none());
        assert!(driver.take_port(2).is_none());
    }
}
