//! USB device enumeration via nusb

use nusb::MaybeFuture;
use usbserial_core::device::{format_bcd_version, USB_CLASS_CDC};
use usbserial_core::{DeviceDescriptor, DeviceId, HostError, UsbHost};

/// Enumerates the devices attached to this machine
#[derive(Debug, Clone, Copy, Default)]
pub struct NusbHost;

impl NusbHost {
    /// Create a new host
    pub fn new() -> Self {
        Self
    }
}

impl UsbHost for NusbHost {
    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, HostError> {
        let devices: Vec<DeviceDescriptor> = nusb::list_devices()
            .wait()
            .map_err(|e| HostError::Enumeration(e.to_string()))?
            .map(|info| descriptor_from_info(&info))
            .collect();

        log::debug!("Enumerated {} USB devices", devices.len());
        Ok(devices)
    }
}

/// Snapshot one nusb device
pub(crate) fn descriptor_from_info(info: &nusb::DeviceInfo) -> DeviceDescriptor {
    // bus_id() is numeric on Linux; elsewhere fall back to bus 0
    let bus = info.bus_id().parse::<u32>().unwrap_or(0);
    let address = info.device_address();

    let mut interface_classes: Vec<u8> = info.interfaces().map(|i| i.class()).collect();
    if info.class() == USB_CLASS_CDC && !interface_classes.contains(&USB_CLASS_CDC) {
        interface_classes.push(USB_CLASS_CDC);
    }

    let mut descriptor = DeviceDescriptor::new(
        DeviceId::from_bus_address(bus, address),
        info.vendor_id(),
        info.product_id(),
    )
    .with_interface_classes(&interface_classes);

    if let Some(product) = info.product_string() {
        descriptor = descriptor.with_product_name(product);
    }
    descriptor.manufacturer_name = info.manufacturer_string().map(str::to_string);
    descriptor.serial_number = info.serial_number().map(str::to_string);
    descriptor.device_name = device_node(bus, address);
    descriptor.version = format_bcd_version(info.device_version());
    descriptor
}

fn device_node(bus: u32, address: u8) -> String {
    format!("/dev/bus/usb/{:03}/{:03}", bus, address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_node() {
        assert_eq!(device_node(3, 7), "/dev/bus/usb/003/007");
        assert_eq!(device_node(12, 120), "/dev/bus/usb/012/120");
    }
}
