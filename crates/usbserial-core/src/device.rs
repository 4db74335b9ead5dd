//! Attached device snapshot

use std::fmt;

/// Process-local device identifier
///
/// Stable for as long as the device stays attached. Backends derive it from
/// the bus topology, so a re-plugged device usually gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Build an identifier from a bus number and a device address
    ///
    /// Uses the `bus * 1000 + address` scheme, which keeps the id readable
    /// (bus 3 address 7 becomes 3007).
    pub fn from_bus_address(bus: u32, address: u8) -> Self {
        Self(bus * 1000 + address as u32)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DeviceId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// USB interface class code for CDC communication interfaces
pub const USB_CLASS_CDC: u8 = 0x02;

/// Read-only view of one attached USB device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Process-local identifier
    pub device_id: DeviceId,
    /// USB vendor ID
    pub vendor_id: u16,
    /// USB product ID
    pub product_id: u16,
    /// Display name
    pub name: Option<String>,
    /// Product string from the device descriptor
    pub product_name: Option<String>,
    /// Manufacturer string from the device descriptor
    pub manufacturer_name: Option<String>,
    /// Serial number string, used to tell identical adapters apart
    pub serial_number: Option<String>,
    /// Platform path-like identifier (e.g. `/dev/bus/usb/003/007`)
    pub device_name: String,
    /// Device release number (`bcdDevice`) rendered as `major.minor`
    pub version: String,
    /// Class codes of the device's interfaces
    pub interface_classes: Vec<u8>,
}

impl DeviceDescriptor {
    /// Create a descriptor with only the identifying fields filled in
    pub fn new(device_id: DeviceId, vendor_id: u16, product_id: u16) -> Self {
        Self {
            device_id,
            vendor_id,
            product_id,
            name: None,
            product_name: None,
            manufacturer_name: None,
            serial_number: None,
            device_name: String::new(),
            version: String::new(),
            interface_classes: Vec::new(),
        }
    }

    /// Set the product name (also used as the display name)
    pub fn with_product_name(mut self, product: impl Into<String>) -> Self {
        let product = product.into();
        self.name = Some(product.clone());
        self.product_name = Some(product);
        self
    }

    /// Set the interface class codes
    pub fn with_interface_classes(mut self, classes: &[u8]) -> Self {
        self.interface_classes = classes.to_vec();
        self
    }

    /// Whether the device exposes a CDC communication interface
    pub fn has_cdc_interface(&self) -> bool {
        self.interface_classes.contains(&USB_CLASS_CDC)
    }

    /// Product name, or an empty string when the device has none
    pub fn product_name_or_empty(&self) -> &str {
        self.product_name.as_deref().unwrap_or("")
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "device {} ({:04x}:{:04x})",
            self.device_id, self.vendor_id, self.product_id
        )?;
        if let Some(product) = &self.product_name {
            write!(f, " {}", product)?;
        }
        Ok(())
    }
}

/// Render a BCD release number the way USB descriptors are usually shown
pub fn format_bcd_version(bcd: u16) -> String {
    format!("{:x}.{:02x}", bcd >> 8, bcd & 0xff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_from_bus_address() {
        assert_eq!(DeviceId::from_bus_address(3, 7), DeviceId(3007));
        assert_eq!(DeviceId::from_bus_address(0, 255), DeviceId(255));
    }

    #[test]
    fn test_format_bcd_version() {
        assert_eq!(format_bcd_version(0x0264), "2.64");
        assert_eq!(format_bcd_version(0x1000), "10.00");
    }

    #[test]
    fn test_cdc_interface_detection() {
        let plain = DeviceDescriptor::new(DeviceId(1), 0x2341, 0x0043);
        assert!(!plain.has_cdc_interface());

        let cdc = plain.with_interface_classes(&[0x02, 0x0a]);
        assert!(cdc.has_cdc_interface());
    }
}
