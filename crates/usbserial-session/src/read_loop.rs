//! Background read loop of a session
//!
//! One thread per open session. It shares nothing with the caller-facing
//! operations except the port and the [`LoopHealth`] it reports into.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use usbserial_core::{DeviceId, EventSink, SerialEvent, UsbSerialPort};

/// What the read loop last knew about the port
#[derive(Default)]
pub(crate) struct LoopHealth {
    failure: Mutex<Option<String>>,
}

impl LoopHealth {
    /// Error that killed the loop, if it died
    pub(crate) fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    fn mark_broken(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }
}

/// Everything the loop thread needs
pub(crate) struct ReadLoopParams {
    pub device_id: DeviceId,
    pub port: Arc<dyn UsbSerialPort>,
    pub sink: Arc<dyn EventSink>,
    pub read_timeout: Duration,
    pub buffer_size: usize,
    pub health: Arc<LoopHealth>,
}

/// Handle owning a running read loop
pub(crate) struct ReadLoop {
    device_id: DeviceId,
    cancel: Arc<AtomicBool>,
    // Disconnects when the loop thread exits
    done: mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl ReadLoop {
    /// Start the loop on its own thread
    pub(crate) fn spawn(params: ReadLoopParams) -> io::Result<Self> {
        let device_id = params.device_id;
        let cancel = Arc::new(AtomicBool::new(false));
        let (done_tx, done) = mpsc::channel::<()>();

        let thread_cancel = cancel.clone();
        let handle = thread::Builder::new()
            .name(format!("usbserial-read-{}", device_id))
            .spawn(move || {
                let _done = done_tx;
                run(params, &thread_cancel);
            })?;

        log::debug!("device {}: read loop started", device_id);

        Ok(Self {
            device_id,
            cancel,
            done,
            handle: Some(handle),
        })
    }

    /// Whether the loop thread has exited
    pub(crate) fn is_finished(&self) -> bool {
        matches!(self.done.try_recv(), Err(mpsc::TryRecvError::Disconnected))
    }

    /// Ask the loop to stop and wait up to `grace` for it
    ///
    /// Returns false if the loop was still running when the grace period
    /// ran out; its thread is then left detached.
    pub(crate) fn stop(mut self, grace: Duration) -> bool {
        self.cancel.store(true, Ordering::SeqCst);

        if let Err(RecvTimeoutError::Timeout) = self.done.recv_timeout(grace) {
            log::warn!(
                "device {}: read loop did not stop within {:?}",
                self.device_id,
                grace
            );
            return false;
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("device {}: read loop panicked", self.device_id);
            }
        }
        log::debug!("device {}: read loop stopped", self.device_id);
        true
    }
}

fn run(params: ReadLoopParams, cancel: &AtomicBool) {
    let ReadLoopParams {
        device_id,
        port,
        sink,
        read_timeout,
        buffer_size,
        health,
    } = params;
    let mut buf = vec![0u8; buffer_size];

    while !cancel.load(Ordering::SeqCst) {
        match port.read(&mut buf, read_timeout) {
            Ok(0) => continue,
            Ok(n) => {
                log::trace!("device {}: received {} bytes", device_id, n);
                sink.emit(SerialEvent::received(device_id, &buf[..n]));
            }
            Err(e) => {
                if cancel.load(Ordering::SeqCst) {
                    // Close in progress
                    break;
                }
                let message = e.to_string();
                log::warn!("device {}: read loop terminated: {}", device_id, message);
                health.mark_broken(&message);
                sink.emit(SerialEvent::Error { device_id, message });
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use usbserial_core::{Connection, DeviceDescriptor, EventHub};
    use usbserial_dummy::{DummyConnection, DummyPort, PortBehavior, ReadStep};

    fn open_port(behavior: PortBehavior) -> Arc<DummyPort> {
        let port = Arc::new(DummyPort::new(behavior));
        let connection: Box<dyn Connection> = Box::new(DummyConnection::new(
            DeviceDescriptor::new(DeviceId(1), 0x1a86, 0x7523),
        ));
        port.open(connection).unwrap();
        port
    }

    fn spawn(port: &Arc<DummyPort>, hub: &Arc<EventHub>, health: &Arc<LoopHealth>) -> ReadLoop {
        ReadLoop::spawn(ReadLoopParams {
            device_id: DeviceId(1),
            port: port.clone(),
            sink: hub.clone(),
            read_timeout: Duration::from_millis(10),
            buffer_size: 1024,
            health: health.clone(),
        })
        .unwrap()
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_emits_decoded_data_once() {
        let port = open_port(PortBehavior::scripted(vec![ReadStep::Data(vec![0x68, 0x69])]));
        let hub = Arc::new(EventHub::new());
        let events = hub.subscribe();
        let health = Arc::new(LoopHealth::default());
        let reader = spawn(&port, &hub, &health);

        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            event,
            SerialEvent::ReceivedData {
                device_id: DeviceId(1),
                data: "hi".into(),
                bytes: vec![0x68, 0x69],
            }
        );

        // Idle reads keep timing out without producing events
        let reads = port.read_calls();
        wait_until(|| port.read_calls() > reads + 3);
        assert!(events.try_recv().is_none());

        assert!(reader.stop(Duration::from_secs(5)));
        assert!(health.failure().is_none());
    }

    #[test]
    fn test_io_error_stops_loop() {
        let port = open_port(PortBehavior::scripted(vec![ReadStep::Error(
            "device unplugged".into(),
        )]));
        let hub = Arc::new(EventHub::new());
        let events = hub.subscribe();
        let health = Arc::new(LoopHealth::default());
        let reader = spawn(&port, &hub, &health);

        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event.name(), "onError");
        wait_until(|| reader.is_finished());

        // Exactly one error, no read after it
        thread::sleep(Duration::from_millis(50));
        assert!(events.try_recv().is_none());
        assert_eq!(port.read_calls(), 1);
        assert_eq!(health.failure().as_deref(), Some("I/O error: device unplugged"));

        assert!(reader.stop(Duration::from_secs(1)));
    }

    #[test]
    fn test_stop_waits_for_loop_exit() {
        let port = open_port(PortBehavior::default());
        let hub = Arc::new(EventHub::new());
        let health = Arc::new(LoopHealth::default());
        let reader = spawn(&port, &hub, &health);

        wait_until(|| port.read_calls() > 0);
        assert!(reader.stop(Duration::from_secs(5)));

        let reads = port.read_calls();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(port.read_calls(), reads);
    }

    #[test]
    fn test_stop_gives_up_after_grace() {
        let port = open_port(PortBehavior {
            stall_reads: Some(Duration::from_millis(300)),
            ..Default::default()
        });
        let hub = Arc::new(EventHub::new());
        let health = Arc::new(LoopHealth::default());
        let reader = spawn(&port, &hub, &health);

        wait_until(|| port.read_calls() > 0);
        let started = Instant::now();
        assert!(!reader.stop(Duration::from_millis(20)));
        assert!(started.elapsed() < Duration::from_millis(250));

        // Cancelled, so the detached thread stops after its current read
        thread::sleep(Duration::from_millis(400));
        let reads = port.read_calls();
        thread::sleep(Duration::from_millis(350));
        assert_eq!(port.read_calls(), reads);
    }
}
