//! Scripted ports and the driver factory that hands them out

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use usbserial_core::{
    Connection, DeviceDescriptor, DeviceId, DriverFactory, DriverKind, LineConfig, SerialDriver,
    TransportError, UsbSerialPort,
};

/// One scripted outcome of a `read` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStep {
    /// Return these bytes
    Data(Vec<u8>),
    /// Fail with an I/O error carrying this message
    Error(String),
}

/// How a dummy port behaves
#[derive(Debug, Clone, Default)]
pub struct PortBehavior {
    /// Reads replayed in order; afterwards reads time out with 0 bytes
    pub script: Vec<ReadStep>,
    /// Feed every write back into the read queue
    pub echo: bool,
    /// `open` fails
    pub fail_open: bool,
    /// `set_parameters` fails
    pub fail_set_parameters: bool,
    /// `write` fails
    pub fail_write: bool,
    /// `close` fails (the port still ends up closed)
    pub fail_close: bool,
    /// Every read blocks this long before looking at the port, whatever
    /// timeout it was given
    pub stall_reads: Option<Duration>,
}

impl PortBehavior {
    /// A port that echoes writes back
    pub fn echo() -> Self {
        Self {
            echo: true,
            ..Default::default()
        }
    }

    /// A port that replays `script`
    pub fn scripted(script: Vec<ReadStep>) -> Self {
        Self {
            script,
            ..Default::default()
        }
    }
}

struct PortState {
    open: bool,
    connection: Option<Box<dyn Connection>>,
    config: Option<LineConfig>,
    pending: VecDeque<ReadStep>,
    written: Vec<u8>,
}

/// In-memory port
pub struct DummyPort {
    echo: bool,
    fail_open: bool,
    fail_set_parameters: bool,
    fail_write: AtomicBool,
    fail_close: bool,
    stall_reads: Option<Duration>,
    state: Mutex<PortState>,
    data_ready: Condvar,
    open_calls: AtomicUsize,
    close_calls: AtomicUsize,
    read_calls: AtomicUsize,
    active_readers: AtomicUsize,
    max_concurrent_readers: AtomicUsize,
}

/// Keeps the concurrent reader count accurate on every return path
struct ReaderGuard<'a>(&'a AtomicUsize);

impl Drop for ReaderGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DummyPort {
    /// Create a port with the given behavior
    pub fn new(behavior: PortBehavior) -> Self {
        Self {
            echo: behavior.echo,
            fail_open: behavior.fail_open,
            fail_set_parameters: behavior.fail_set_parameters,
            fail_write: AtomicBool::new(behavior.fail_write),
            fail_close: behavior.fail_close,
            stall_reads: behavior.stall_reads,
            state: Mutex::new(PortState {
                open: false,
                connection: None,
                config: None,
                pending: behavior.script.into(),
                written: Vec::new(),
            }),
            data_ready: Condvar::new(),
            open_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
            active_readers: AtomicUsize::new(0),
            max_concurrent_readers: AtomicUsize::new(0),
        }
    }

    /// Queue bytes for a later read
    pub fn push_data(&self, bytes: &[u8]) {
        self.push(ReadStep::Data(bytes.to_vec()));
    }

    /// Queue a read failure
    pub fn push_error(&self, message: &str) {
        self.push(ReadStep::Error(message.to_string()));
    }

    fn push(&self, step: ReadStep) {
        self.state.lock().pending.push_back(step);
        self.data_ready.notify_all();
    }

    /// Make subsequent writes fail or succeed
    pub fn set_fail_write(&self, fail: bool) {
        self.fail_write.store(fail, Ordering::SeqCst);
    }

    /// Everything written so far
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    /// Whether the port is currently open
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Whether the port still holds its connection
    pub fn holds_connection(&self) -> bool {
        self.state.lock().connection.is_some()
    }

    /// Line parameters applied by the last successful `set_parameters`
    pub fn config(&self) -> Option<LineConfig> {
        self.state.lock().config
    }

    /// Number of `open` calls
    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    /// Number of `close` calls
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Number of `read` calls
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// Highest number of threads ever inside `read` at the same time
    pub fn max_concurrent_readers(&self) -> usize {
        self.max_concurrent_readers.load(Ordering::SeqCst)
    }
}

impl UsbSerialPort for DummyPort {
    fn open(&self, connection: Box<dyn Connection>) -> Result<(), TransportError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::Other,
                "dummy open failure",
            )));
        }

        let mut state = self.state.lock();
        if state.open {
            return Err(TransportError::AlreadyOpen);
        }
        log::debug!("dummy: opening port for {}", connection.device());
        state.open = true;
        state.connection = Some(connection);
        Ok(())
    }

    fn set_parameters(&self, config: &LineConfig) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        if self.fail_set_parameters {
            return Err(TransportError::Unsupported(format!(
                "dummy rejects {}",
                config
            )));
        }
        state.config = Some(*config);
        Ok(())
    }

    fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active_readers.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_readers
            .fetch_max(now_active, Ordering::SeqCst);
        let _guard = ReaderGuard(&self.active_readers);

        if let Some(stall) = self.stall_reads {
            thread::sleep(stall);
        }

        let mut state = self.state.lock();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        if state.pending.is_empty() {
            self.data_ready.wait_for(&mut state, timeout);
        }

        match state.pending.pop_front() {
            Some(ReadStep::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    let rest = data.split_off(n);
                    state.pending.push_front(ReadStep::Data(rest));
                }
                Ok(n)
            }
            Some(ReadStep::Error(message)) => Err(TransportError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                message,
            ))),
            None => Ok(0),
        }
    }

    fn write(&self, data: &[u8], _timeout: Duration) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        if self.fail_write.load(Ordering::SeqCst) {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "dummy write failure",
            )));
        }
        state.written.extend_from_slice(data);
        if self.echo {
            state.pending.push_back(ReadStep::Data(data.to_vec()));
            self.data_ready.notify_all();
        }
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        state.open = false;
        state.connection = None;
        self.data_ready.notify_all();

        if self.fail_close {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::Other,
                "dummy close failure",
            )));
        }
        Ok(())
    }
}

/// Driver wrapping a fixed set of dummy ports
pub struct DummyDriver {
    kind: DriverKind,
    device: DeviceDescriptor,
    ports: Vec<Option<Arc<DummyPort>>>,
}

impl SerialDriver for DummyDriver {
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
        let port: Arc<dyn UsbSerialPort> = self.ports.get_mut(index)?.take()?;
        Some(port)
    }
}

#[derive(Clone)]
struct DevicePlan {
    port_count: usize,
    behavior: PortBehavior,
}

/// Record of one driver the factory built
#[derive(Clone)]
pub struct CreatedDriver {
    /// Device the driver was built for
    pub device_id: DeviceId,
    /// Kind the prober asked for
    pub kind: DriverKind,
    /// Ports handed to the driver
    pub ports: Vec<Arc<DummyPort>>,
}

/// Builds [`DummyDriver`]s and remembers every port it handed out
pub struct DummyDriverFactory {
    default_plan: DevicePlan,
    plans: Mutex<HashMap<DeviceId, DevicePlan>>,
    created: Mutex<Vec<CreatedDriver>>,
}

impl Default for DummyDriverFactory {
    fn default() -> Self {
        Self::new(PortBehavior::default())
    }
}

impl DummyDriverFactory {
    /// Factory whose ports default to `behavior`, one port per device
    pub fn new(behavior: PortBehavior) -> Self {
        Self {
            default_plan: DevicePlan {
                port_count: 1,
                behavior,
            },
            plans: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Override the port behavior for one device
    pub fn set_behavior(&self, device_id: DeviceId, behavior: PortBehavior) {
        let mut plans = self.plans.lock();
        let plan = plans
            .entry(device_id)
            .or_insert_with(|| self.default_plan.clone());
        plan.behavior = behavior;
    }

    /// Override the number of ports one device exposes
    pub fn set_port_count(&self, device_id: DeviceId, port_count: usize) {
        let mut plans = self.plans.lock();
        let plan = plans
            .entry(device_id)
            .or_insert_with(|| self.default_plan.clone());
        plan.port_count = port_count;
    }

    /// Every driver built so far, oldest first
    pub fn created(&self) -> Vec<CreatedDriver> {
        self.created.lock().clone()
    }

    /// Every port built for `device_id`, oldest first
    pub fn ports_for(&self, device_id: DeviceId) -> Vec<Arc<DummyPort>> {
        self.created
            .lock()
            .iter()
            .filter(|d| d.device_id == device_id)
            .flat_map(|d| d.ports.iter().cloned())
            .collect()
    }

    /// Most recently built port for `device_id`
    pub fn last_port(&self, device_id: DeviceId) -> Option<Arc<DummyPort>> {
        self.ports_for(device_id).pop()
    }
}

impl DriverFactory for DummyDriverFactory {
    fn create(&self, kind: DriverKind, device: &DeviceDescriptor) -> Box<dyn SerialDriver> {
        let plan = self
            .plans
            .lock()
            .get(&device.device_id)
            .cloned()
            .unwrap_or_else(|| self.default_plan.clone());

        let ports: Vec<Arc<DummyPort>> = (0..plan.port_count)
            .map(|_| Arc::new(DummyPort::new(plan.behavior.clone())))
            .collect();

        self.created.lock().push(CreatedDriver {
            device_id: device.device_id,
            kind,
            ports: ports.clone(),
        });

        Box::new(DummyDriver {
            kind,
            device: device.clone(),
            ports: ports.into_iter().map(Some).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::DummyConnection;
    use std::time::Instant;

    fn connection() -> Box<dyn Connection> {
        Box::new(DummyConnection::new(DeviceDescriptor::new(
            DeviceId(1),
            0x1a86,
            0x7523,
        )))
    }

    #[test]
    fn test_scripted_reads() {
        let port = DummyPort::new(PortBehavior::scripted(vec![
            ReadStep::Data(vec![1, 2, 3]),
            ReadStep::Error("unplugged".into()),
        ]));
        port.open(connection()).unwrap();

        let mut buf = [0u8; 2];
        assert_eq!(port.read(&mut buf, Duration::from_millis(5)).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(port.read(&mut buf, Duration::from_millis(5)).unwrap(), 1);
        assert_eq!(buf[0], 3);
        assert!(port.read(&mut buf, Duration::from_millis(5)).is_err());
        assert_eq!(port.read(&mut buf, Duration::from_millis(5)).unwrap(), 0);
        assert_eq!(port.read_calls(), 4);
    }

    #[test]
    fn test_echo() {
        let port = DummyPort::new(PortBehavior::echo());
        port.open(connection()).unwrap();
        port.write(b"ping", Duration::from_millis(5)).unwrap();

        let mut buf = [0u8; 16];
        let n = port.read(&mut buf, Duration::from_millis(5)).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(port.written(), b"ping");
    }

    #[test]
    fn test_closed_port_rejects_io() {
        let port = DummyPort::new(PortBehavior::default());
        let mut buf = [0u8; 4];
        assert!(matches!(
            port.read(&mut buf, Duration::from_millis(1)),
            Err(TransportError::NotOpen)
        ));
        assert!(matches!(port.close(), Err(TransportError::NotOpen)));

        port.open(connection()).unwrap();
        assert!(port.holds_connection());
        port.close().unwrap();
        assert!(!port.holds_connection());
        assert!(matches!(
            port.write(b"x", Duration::from_millis(1)),
            Err(TransportError::NotOpen)
        ));
    }

    #[test]
    fn test_failing_close_still_closes() {
        let port = DummyPort::new(PortBehavior {
            fail_close: true,
            ..Default::default()
        });
        port.open(connection()).unwrap();
        assert!(port.close().is_err());
        assert!(!port.is_open());
    }

    #[test]
    fn test_stalled_read_ignores_timeout() {
        let port = DummyPort::new(PortBehavior {
            stall_reads: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        port.open(connection()).unwrap();

        let mut buf = [0u8; 4];
        let started = Instant::now();
        assert_eq!(port.read(&mut buf, Duration::from_millis(1)).unwrap(), 0);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_factory_records_ports() {
        let factory = DummyDriverFactory::default();
        factory.set_port_count(DeviceId(7), 2);

        let device = DeviceDescriptor::new(DeviceId(7), 0x0403, 0x6001);
        let mut driver = factory.create(DriverKind::Ftdi, &device);
        assert_eq!(driver.kind(), DriverKind::Ftdi);
        assert_eq!(driver.port_count(), 2);
        assert!(driver.take_port(0).is_some());
        assert!(driver.take_port(0).is_none());
        assert!(driver.take_port(5).is_none());

        assert_eq!(factory.ports_for(DeviceId(7)).len(), 2);
        assert!(factory.ports_for(DeviceId(8)).is_empty());
    }
}
