//! Fake host with toggleable permissions

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use usbserial_core::{
    Connection, DeviceDescriptor, DeviceId, HostError, PermissionCallback, PermissionGate, UsbHost,
};

/// Connection handed out by [`DummyHost`]
pub struct DummyConnection {
    device: DeviceDescriptor,
}

impl DummyConnection {
    /// Wrap a device
    pub fn new(device: DeviceDescriptor) -> Self {
        Self { device }
    }
}

impl Connection for DummyConnection {
    fn device(&self) -> &DeviceDescriptor {
        &self.device
    }
}

struct DummyDevice {
    descriptor: DeviceDescriptor,
    permitted: bool,
    grant_on_request: bool,
    connection_fails: bool,
}

/// In-memory host
///
/// Devices start out permitted. Permission requests are answered from a
/// background thread, like a real host dialog would be.
#[derive(Clone, Default)]
pub struct DummyHost {
    devices: Arc<Mutex<Vec<DummyDevice>>>,
}

impl DummyHost {
    /// Host with no devices attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Host with a few well-known adapters plus one unknown device
    pub fn with_demo_devices() -> Self {
        let host = Self::new();
        let devices = [
            (1001, 0x2341, 0x0043, "Arduino Uno", "Arduino (www.arduino.cc)", &[0x02, 0x0a][..]),
            (1002, 0x1a86, 0x7523, "USB2.0-Serial", "QinHeng Electronics", &[0xff][..]),
            (1003, 0x10c4, 0xea60, "CP2102 USB to UART Bridge", "Silicon Labs", &[0xff][..]),
            (1004, 0x0403, 0x6001, "FT232R USB UART", "FTDI", &[0xff][..]),
            (1005, 0x046d, 0xc52b, "USB Receiver", "Logitech", &[0x03][..]),
        ];
        for (id, vid, pid, product, manufacturer, classes) in devices {
            let mut descriptor = DeviceDescriptor::new(DeviceId(id), vid, pid)
                .with_product_name(product)
                .with_interface_classes(classes);
            descriptor.manufacturer_name = Some(manufacturer.to_string());
            descriptor.device_name = format!("/dev/bus/usb/001/{:03}", id % 1000);
            descriptor.version = "1.00".to_string();
            host.add_device(descriptor);
        }
        host
    }

    /// Attach a device
    pub fn add_device(&self, descriptor: DeviceDescriptor) {
        self.devices.lock().push(DummyDevice {
            descriptor,
            permitted: true,
            grant_on_request: true,
            connection_fails: false,
        });
    }

    /// Detach a device
    pub fn remove_device(&self, device_id: DeviceId) {
        self.devices
            .lock()
            .retain(|d| d.descriptor.device_id != device_id);
    }

    /// Grant or revoke access
    pub fn set_permission(&self, device_id: DeviceId, permitted: bool) {
        self.with_device(device_id, |d| d.permitted = permitted);
    }

    /// Decide how the next permission request gets answered
    pub fn set_grant_on_request(&self, device_id: DeviceId, grant: bool) {
        self.with_device(device_id, |d| d.grant_on_request = grant);
    }

    /// Make `open_connection` fail even though permission is granted
    pub fn set_connection_fails(&self, device_id: DeviceId, fails: bool) {
        self.with_device(device_id, |d| d.connection_fails = fails);
    }

    fn with_device(&self, device_id: DeviceId, f: impl FnOnce(&mut DummyDevice)) {
        let mut devices = self.devices.lock();
        if let Some(device) = devices
            .iter_mut()
            .find(|d| d.descriptor.device_id == device_id)
        {
            f(device);
        }
    }

    fn permitted(&self, device_id: DeviceId) -> bool {
        self.devices
            .lock()
            .iter()
            .any(|d| d.descriptor.device_id == device_id && d.permitted)
    }
}

impl UsbHost for DummyHost {
    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, HostError> {
        Ok(self
            .devices
            .lock()
            .iter()
            .map(|d| d.descriptor.clone())
            .collect())
    }
}

impl PermissionGate for DummyHost {
    fn has_permission(&self, device: &DeviceDescriptor) -> bool {
        self.permitted(device.device_id)
    }

    fn request_permission(&self, device: &DeviceDescriptor, on_result: PermissionCallback) {
        let host = self.clone();
        let device_id = device.device_id;
        thread::spawn(move || {
            let mut granted = false;
            host.with_device(device_id, |d| {
                d.permitted = d.grant_on_request;
                granted = d.grant_on_request;
            });
            log::debug!("dummy: permission for device {} granted={}", device_id, granted);
            on_result(granted);
        });
    }

    fn open_connection(&self, device: &DeviceDescriptor) -> Option<Box<dyn Connection>> {
        let devices = self.devices.lock();
        let entry = devices
            .iter()
            .find(|d| d.descriptor.device_id == device.device_id)?;
        if !entry.permitted || entry.connection_fails {
            return None;
        }
        Some(Box::new(DummyConnection::new(entry.descriptor.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_demo_devices() {
        let host = DummyHost::with_demo_devices();
        let devices = host.list_devices().unwrap();
        assert_eq!(devices.len(), 5);
        assert!(devices
            .iter()
            .any(|d| d.vendor_id == 0x1a86 && d.product_id == 0x7523));
    }

    #[test]
    fn test_connection_requires_permission() {
        let host = DummyHost::new();
        let device = DeviceDescriptor::new(DeviceId(1), 0x1a86, 0x7523);
        host.add_device(device.clone());

        assert!(host.open_connection(&device).is_some());
        host.set_permission(DeviceId(1), false);
        assert!(!host.has_permission(&device));
        assert!(host.open_connection(&device).is_none());
    }

    #[test]
    fn test_request_permission_answers_asynchronously() {
        let host = DummyHost::new();
        let device = DeviceDescriptor::new(DeviceId(1), 0x1a86, 0x7523);
        host.add_device(device.clone());
        host.set_permission(DeviceId(1), false);

        let (tx, rx) = mpsc::channel();
        host.request_permission(
            &device,
            Box::new(move |granted| {
                let _ = tx.send(granted);
            }),
        );
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(true));
        assert!(host.has_permission(&device));
    }
}
