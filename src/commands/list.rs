//! List commands implementation

use usbserial_session::SessionManager;

use crate::error::CliError;

/// List the attached devices
pub fn list_devices(manager: &SessionManager) -> Result<(), CliError> {
    let devices = manager.list()?;
    if devices.is_empty() {
        println!("No USB devices found.");
        return Ok(());
    }

    println!(
        "{:>6}  {:<9}  {:<8}  {:<24}  {}",
        "ID", "VID:PID", "Driver", "Product", "Manufacturer"
    );
    println!("{}", "-".repeat(72));

    for device in &devices {
        let driver = manager
            .probe(device)
            .map(|kind| kind.name())
            .unwrap_or("-");
        println!(
            "{:>6}  {:04x}:{:04x}  {:<8}  {:<24}  {}",
            device.device_id,
            device.vendor_id,
            device.product_id,
            driver,
            device.product_name_or_empty(),
            device.manufacturer_name.as_deref().unwrap_or("")
        );
        log::debug!(
            "  {} version {} serial {:?}",
            device.device_name,
            device.version,
            device.serial_number
        );
    }

    Ok(())
}

/// List the probe tables, custom table first
pub fn list_drivers(manager: &SessionManager) {
    let drivers = manager.drivers();

    println!("Custom table (checked first):");
    for entry in drivers.custom_table().entries() {
        println!(
            "  {:04x}:{:04x}  {:<8}  {}",
            entry.vendor_id,
            entry.product_id,
            entry.kind.name(),
            entry.kind.description()
        );
    }

    println!();
    println!("Default prober:");
    for entry in drivers.default_prober().table().entries() {
        println!(
            "  {:04x}:{:04x}  {:<8}  {}",
            entry.vendor_id,
            entry.product_id,
            entry.kind.name(),
            entry.kind.description()
        );
    }
    println!("  any device with a CDC interface  cdc_acm");
}
