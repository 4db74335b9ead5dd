//! Driver selection
//!
//! A device is matched against the custom table first and only falls back
//! to the default prober if no custom entry has its vendor/product pair.
//! The decision is made once per open; the session never re-probes.

use std::fmt;
use std::sync::Arc;

use usbserial_core::{DeviceDescriptor, DriverFactory, DriverKind, SerialDriver, SessionError};

/// Arduino Uno (CDC ACM)
pub const ARDUINO_UNO: (u16, u16) = (0x2341, 0x0043);
/// WCH CH340
pub const CH340: (u16, u16) = (0x1a86, 0x7523);
/// Silicon Labs CP210x
pub const CP210X: (u16, u16) = (0x10c4, 0xea60);
/// FTDI FT232R
pub const FT232R: (u16, u16) = (0x0403, 0x6001);

/// Entries checked before the default prober
const CUSTOM_PRODUCTS: &[(u16, u16, DriverKind)] = &[
    (ARDUINO_UNO.0, ARDUINO_UNO.1, DriverKind::CdcAcm),
    (CH340.0, CH340.1, DriverKind::Ch34x),
    (CP210X.0, CP210X.1, DriverKind::Cp21xx),
    (FT232R.0, FT232R.1, DriverKind::Ftdi),
];

/// Chipsets known to the default prober
const DEFAULT_PRODUCTS: &[(u16, u16, DriverKind)] = &[
    // FTDI
    (0x0403, 0x6001, DriverKind::Ftdi), // FT232R
    (0x0403, 0x6010, DriverKind::Ftdi), // FT2232H
    (0x0403, 0x6011, DriverKind::Ftdi), // FT4232H
    (0x0403, 0x6014, DriverKind::Ftdi), // FT232H
    (0x0403, 0x6015, DriverKind::Ftdi), // FT231X
    // Silicon Labs
    (0x10c4, 0xea60, DriverKind::Cp21xx), // CP2102
    (0x10c4, 0xea70, DriverKind::Cp21xx), // CP2105
    (0x10c4, 0xea71, DriverKind::Cp21xx), // CP2108
    (0x10c4, 0xea80, DriverKind::Cp21xx), // CP2110
    // WCH
    (0x1a86, 0x7523, DriverKind::Ch34x), // CH340
    (0x1a86, 0x5523, DriverKind::Ch34x), // CH341A
    // Prolific
    (0x067b, 0x2303, DriverKind::Prolific), // PL2303
    (0x067b, 0x23a3, DriverKind::Prolific), // PL2303GC
    (0x067b, 0x23b3, DriverKind::Prolific), // PL2303GB
    (0x067b, 0x23c3, DriverKind::Prolific), // PL2303GT
    (0x067b, 0x23d3, DriverKind::Prolific), // PL2303GL
    (0x067b, 0x23e3, DriverKind::Prolific), // PL2303GE
    (0x067b, 0x23f3, DriverKind::Prolific), // PL2303GS
];

/// One (vendor, product) to driver mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeEntry {
    /// USB vendor ID
    pub vendor_id: u16,
    /// USB product ID
    pub product_id: u16,
    /// Driver to use
    pub kind: DriverKind,
}

/// Vendor/product lookup table, keyed uniquely by the ID pair
#[derive(Debug, Clone, Default)]
pub struct ProbeTable {
    entries: Vec<ProbeEntry>,
}

impl ProbeTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table seeded with the well-known adapters
    pub fn custom() -> Self {
        Self::from_products(CUSTOM_PRODUCTS)
    }

    fn from_products(products: &[(u16, u16, DriverKind)]) -> Self {
        let mut table = Self::new();
        for &(vendor_id, product_id, kind) in products {
            table.add_product(vendor_id, product_id, kind);
        }
        table
    }

    /// Map a vendor/product pair to a driver
    ///
    /// An existing entry for the same pair is replaced.
    pub fn add_product(&mut self, vendor_id: u16, product_id: u16, kind: DriverKind) -> &mut Self {
        let entry = ProbeEntry {
            vendor_id,
            product_id,
            kind,
        };
        match self
            .entries
            .iter_mut()
            .find(|e| e.vendor_id == vendor_id && e.product_id == product_id)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self
    }

    /// Look up a vendor/product pair
    pub fn find(&self, vendor_id: u16, product_id: u16) -> Option<DriverKind> {
        self.entries
            .iter()
            .find(|e| e.vendor_id == vendor_id && e.product_id == product_id)
            .map(|e| e.kind)
    }

    /// All entries, in insertion order
    pub fn entries(&self) -> &[ProbeEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Generic prober covering the broader set of serial-over-USB chipsets
///
/// Besides its product table it recognises any device exposing a CDC
/// communication interface as CDC ACM.
#[derive(Debug, Clone)]
pub struct DefaultProber {
    table: ProbeTable,
    cdc_fallback: bool,
}

impl Default for DefaultProber {
    fn default() -> Self {
        Self {
            table: ProbeTable::from_products(DEFAULT_PRODUCTS),
            cdc_fallback: true,
        }
    }
}

impl DefaultProber {
    /// Prober with the built-in chipset table and CDC detection
    pub fn new() -> Self {
        Self::default()
    }

    /// Prober backed by an arbitrary table
    pub fn with_table(table: ProbeTable, cdc_fallback: bool) -> Self {
        Self {
            table,
            cdc_fallback,
        }
    }

    /// The product table
    pub fn table(&self) -> &ProbeTable {
        &self.table
    }

    /// Pick a driver for `device`, if any
    pub fn probe(&self, device: &DeviceDescriptor) -> Option<DriverKind> {
        if let Some(kind) = self.table.find(device.vendor_id, device.product_id) {
            return Some(kind);
        }
        if self.cdc_fallback && device.has_cdc_interface() {
            return Some(DriverKind::CdcAcm);
        }
        None
    }
}

/// Which stage of probing matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeSource {
    /// Matched by the custom table
    CustomTable,
    /// Matched by the default prober
    DefaultProber,
}

impl fmt::Display for ProbeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeSource::CustomTable => write!(f, "custom table"),
            ProbeSource::DefaultProber => write!(f, "default prober"),
        }
    }
}

/// A driver chosen for a device, with at least one port
pub struct SelectedDriver {
    /// The driver
    pub driver: Box<dyn SerialDriver>,
    /// How it was matched
    pub source: ProbeSource,
}

/// Selects the driver for a device
pub struct DriverRegistry {
    custom: ProbeTable,
    fallback: DefaultProber,
    factory: Arc<dyn DriverFactory>,
}

impl DriverRegistry {
    /// Registry with the built-in custom table and default prober
    pub fn new(factory: Arc<dyn DriverFactory>) -> Self {
        Self::with_tables(ProbeTable::custom(), DefaultProber::new(), factory)
    }

    /// Registry with explicit tables
    pub fn with_tables(
        custom: ProbeTable,
        fallback: DefaultProber,
        factory: Arc<dyn DriverFactory>,
    ) -> Self {
        Self {
            custom,
            fallback,
            factory,
        }
    }

    /// The custom table
    pub fn custom_table(&self) -> &ProbeTable {
        &self.custom
    }

    /// The default prober
    pub fn default_prober(&self) -> &DefaultProber {
        &self.fallback
    }

    /// Decide which driver kind `device` gets, without building it
    pub fn match_kind(&self, device: &DeviceDescriptor) -> Option<(DriverKind, ProbeSource)> {
        if let Some(kind) = self.custom.find(device.vendor_id, device.product_id) {
            return Some((kind, ProbeSource::CustomTable));
        }
        self.fallback
            .probe(device)
            .map(|kind| (kind, ProbeSource::DefaultProber))
    }

    /// Build the driver for `device`
    ///
    /// Fails with `DriverNotFound` if nothing matches and with
    /// `NotEnoughPorts` if the chosen driver exposes no port.
    pub fn select_driver(&self, device: &DeviceDescriptor) -> Result<SelectedDriver, SessionError> {
        let (kind, source) =
            self.match_kind(device)
                .ok_or(SessionError::DriverNotFound {
                    vendor_id: device.vendor_id,
                    product_id: device.product_id,
                })?;

        log::debug!("{}: selected {} driver via {}", device, kind, source);

        let driver = self.factory.create(kind, device);
        if driver.port_count() == 0 {
            return Err(SessionError::NotEnoughPorts(device.device_id));
        }

        Ok(SelectedDriver { driver, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usbserial_core::{DeviceId, ErrorCode};
    use usbserial_dummy::DummyDriverFactory;

    fn device(vid: u16, pid: u16) -> DeviceDescriptor {
        DeviceDescriptor::new(DeviceId(1), vid, pid)
    }

    #[test]
    fn test_custom_table_contents() {
        let table = ProbeTable::custom();
        assert_eq!(table.len(), 4);
        assert_eq!(table.find(0x2341, 0x0043), Some(DriverKind::CdcAcm));
        assert_eq!(table.find(0x1a86, 0x7523), Some(DriverKind::Ch34x));
        assert_eq!(table.find(0x10c4, 0xea60), Some(DriverKind::Cp21xx));
        assert_eq!(table.find(0x0403, 0x6001), Some(DriverKind::Ftdi));
        assert_eq!(table.find(0x0403, 0x6010), None);
    }

    #[test]
    fn test_add_product_replaces_existing_pair() {
        let mut table = ProbeTable::new();
        table
            .add_product(0x1234, 0x0001, DriverKind::Ftdi)
            .add_product(0x1234, 0x0001, DriverKind::Prolific);
        assert_eq!(table.len(), 1);
        assert_eq!(table.find(0x1234, 0x0001), Some(DriverKind::Prolific));
    }

    #[test]
    fn test_ch340_selects_ch34x() {
        let registry = DriverRegistry::new(Arc::new(DummyDriverFactory::default()));
        let selected = registry.select_driver(&device(0x1a86, 0x7523)).unwrap();
        assert_eq!(selected.driver.kind(), DriverKind::Ch34x);
        assert_eq!(selected.source, ProbeSource::CustomTable);
    }

    #[test]
    fn test_default_prober_fallback() {
        let registry = DriverRegistry::new(Arc::new(DummyDriverFactory::default()));
        let selected = registry.select_driver(&device(0x067b, 0x2303)).unwrap();
        assert_eq!(selected.driver.kind(), DriverKind::Prolific);
        assert_eq!(selected.source, ProbeSource::DefaultProber);

        let cdc = device(0xcafe, 0x4001).with_interface_classes(&[0x02, 0x0a]);
        let selected = registry.select_driver(&cdc).unwrap();
        assert_eq!(selected.driver.kind(), DriverKind::CdcAcm);
        assert_eq!(selected.source, ProbeSource::DefaultProber);
    }

    #[test]
    fn test_custom_table_wins_over_default_prober() {
        // The default prober would call this device FTDI
        let mut fallback_table = ProbeTable::new();
        fallback_table.add_product(0x1a86, 0x7523, DriverKind::Ftdi);
        let fallback = DefaultProber::with_table(fallback_table, true);

        let factory = Arc::new(DummyDriverFactory::default());
        let registry = DriverRegistry::with_tables(ProbeTable::custom(), fallback, factory.clone());

        let dev = device(0x1a86, 0x7523).with_interface_classes(&[0x02]);
        let selected = registry.select_driver(&dev).unwrap();
        assert_eq!(selected.driver.kind(), DriverKind::Ch34x);
        assert_eq!(selected.source, ProbeSource::CustomTable);

        // Exactly one driver was built, and not the fallback one
        let created = factory.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].kind, DriverKind::Ch34x);
    }

    #[test]
    fn test_driver_not_found() {
        let registry = DriverRegistry::new(Arc::new(DummyDriverFactory::default()));
        let err = registry
            .select_driver(&device(0x046d, 0xc52b).with_interface_classes(&[0x03]))
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::DriverNotFound);
    }

    #[test]
    fn test_not_enough_ports() {
        let factory = Arc::new(DummyDriverFactory::default());
        factory.set_port_count(DeviceId(1), 0);
        let registry = DriverRegistry::new(factory);

        let err = registry
            .select_driver(&device(0x10c4, 0xea60))
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::NotEnoughPorts);
    }
}
