//! File access based permission gate
//!
//! On a desktop host "permission" to a device means the current user may open
//! its serial nodes, typically by being in the `dialout` or `uucp` group or
//! through a udev rule. There is no dialog to show, so a request just watches
//! the nodes until access shows up or the wait runs out.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use usbserial_core::{Connection, DeviceDescriptor, PermissionCallback, PermissionGate};

use crate::tty::find_nodes;

/// Interval between access checks while a request is pending
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Claim on a device whose serial nodes the user may open
pub struct HostConnection {
    device: DeviceDescriptor,
}

impl Connection for HostConnection {
    fn device(&self) -> &DeviceDescriptor {
        &self.device
    }
}

/// Permission gate backed by serial node access checks
#[derive(Debug, Clone)]
pub struct HostPermissionGate {
    wait: Duration,
}

impl HostPermissionGate {
    /// Gate whose requests keep polling for `wait`
    pub fn new(wait: Duration) -> Self {
        Self { wait }
    }
}

/// Whether the current user may read and write `node`
///
/// Checked against the node's permissions without opening it, so boards
/// that reset on DTR are left alone. Only a permission error counts as a
/// refusal; a node that vanished is left for the open itself to report.
#[cfg(unix)]
fn can_open(node: &str) -> bool {
    use nix::errno::Errno;
    use nix::unistd::{access, AccessFlags};

    match access(node, AccessFlags::R_OK | AccessFlags::W_OK) {
        Ok(()) => true,
        Err(Errno::EACCES) | Err(Errno::EPERM) | Err(Errno::EROFS) => false,
        Err(e) => {
            log::debug!("{}: access check failed: {}", node, e);
            true
        }
    }
}

// COM ports carry no user permissions; the open reports any refusal
#[cfg(not(unix))]
fn can_open(_node: &str) -> bool {
    true
}

fn accessible(device: &DeviceDescriptor) -> bool {
    let nodes = find_nodes(device);
    !nodes.is_empty() && nodes.iter().all(|node| can_open(node))
}

/// Callback shared between a watcher thread and the code that spawned it
type CallbackSlot = Arc<Mutex<Option<PermissionCallback>>>;

fn answer(slot: &CallbackSlot, granted: bool) {
    if let Some(on_result) = slot.lock().take() {
        on_result(granted);
    }
}

/// Deny right away when the watcher never started, so the caller still
/// hears back exactly once
fn deny_if_not_started(spawned: io::Result<JoinHandle<()>>, slot: &CallbackSlot) {
    if let Err(e) = spawned {
        log::warn!("Failed to start permission watcher: {}", e);
        answer(slot, false);
    }
}

impl PermissionGate for HostPermissionGate {
    fn has_permission(&self, device: &DeviceDescriptor) -> bool {
        accessible(device)
    }

    fn request_permission(&self, device: &DeviceDescriptor, on_result: PermissionCallback) {
        let device = device.clone();
        let wait = self.wait;
        log::info!(
            "Waiting up to {:?} for access to {}; add your user to the serial group \
             (dialout/uucp) or install a udev rule",
            wait,
            device
        );

        let slot: CallbackSlot = Arc::new(Mutex::new(Some(on_result)));
        let thread_slot = slot.clone();
        let spawned = thread::Builder::new()
            .name(format!("usbserial-permission-{}", device.device_id))
            .spawn(move || {
                let deadline = Instant::now() + wait;
                let granted = loop {
                    if accessible(&device) {
                        break true;
                    }
                    if Instant::now() >= deadline {
                        break false;
                    }
                    thread::sleep(POLL_INTERVAL);
                };
                log::debug!("device {}: access granted={}", device.device_id, granted);
                answer(&thread_slot, granted);
            });

        deny_if_not_started(spawned, &slot);
    }

    fn open_connection(&self, device: &DeviceDescriptor) -> Option<Box<dyn Connection>> {
        if !accessible(device) {
            return None;
        }
        Some(Box::new(HostConnection {
            device: device.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use usbserial_core::DeviceId;

    fn phantom_device() -> DeviceDescriptor {
        // No adapter uses this pair, so no serial node will ever match
        DeviceDescriptor::new(DeviceId(999_999), 0xfffe, 0xfffe)
    }

    #[test]
    fn test_device_without_nodes_is_not_accessible() {
        let gate = HostPermissionGate::new(Duration::from_millis(10));
        assert!(!gate.has_permission(&phantom_device()));
        assert!(gate.open_connection(&phantom_device()).is_none());
    }

    #[test]
    fn test_request_times_out_with_denial() {
        let gate = HostPermissionGate::new(Duration::from_millis(10));
        let (tx, rx) = mpsc::channel();
        gate.request_permission(
            &phantom_device(),
            Box::new(move |granted| {
                let _ = tx.send(granted);
            }),
        );
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(false));
    }

    #[test]
    fn test_watcher_spawn_failure_denies() {
        let (tx, rx) = mpsc::channel();
        let on_result: PermissionCallback = Box::new(move |granted| {
            let _ = tx.send(granted);
        });
        let slot: CallbackSlot = Arc::new(Mutex::new(Some(on_result)));

        deny_if_not_started(Err(io::Error::other("no threads left")), &slot);
        assert_eq!(rx.try_recv(), Ok(false));

        // Answered once only
        answer(&slot, true);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_started_watcher_answers_itself() {
        let (tx, rx) = mpsc::channel();
        let on_result: PermissionCallback = Box::new(move |granted| {
            let _ = tx.send(granted);
        });
        let slot: CallbackSlot = Arc::new(Mutex::new(Some(on_result)));

        let handle = thread::spawn(|| {});
        deny_if_not_started(Ok(handle), &slot);
        assert!(rx.try_recv().is_err());
        assert!(slot.lock().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_access_check_does_not_need_an_open_port() {
        let path = std::env::temp_dir().join(format!("usbserial-node-{}", std::process::id()));
        std::fs::write(&path, b"").unwrap();
        assert!(can_open(path.to_str().unwrap()));
        std::fs::remove_file(&path).unwrap();

        // Missing nodes are left for the open to report
        assert!(can_open("/dev/usbserial-missing-node"));
    }
}
