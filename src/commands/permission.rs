//! Permission commands implementation

use std::time::Duration;

use usbserial_core::{DeviceId, EventHub, PermissionStatus, SerialEvent};
use usbserial_session::SessionManager;

use crate::error::CliError;

/// Report whether `device` may be opened
pub fn check_permission(manager: &SessionManager, device: DeviceId) -> Result<(), CliError> {
    if manager.has_permission(device)? {
        println!("Device {}: access granted", device);
    } else {
        println!("Device {}: no access", device);
    }
    Ok(())
}

/// Ask for access to `device`, optionally waiting for the answer
pub fn request_permission(
    manager: &SessionManager,
    hub: &EventHub,
    device: DeviceId,
    wait: bool,
) -> Result<(), CliError> {
    let events = hub.subscribe_device(device);

    match manager.request_permission(device)? {
        PermissionStatus::AlreadyGranted => {
            println!("Device {}: access already granted", device);
            return Ok(());
        }
        PermissionStatus::RequestSent => println!("Device {}: request sent", device),
    }

    if !wait {
        return Ok(());
    }

    let timeout = manager.config().permission_wait + Duration::from_secs(1);
    loop {
        match events.recv_timeout(timeout) {
            Some(SerialEvent::PermissionResult { granted, .. }) => {
                let answer = if granted { "granted" } else { "denied" };
                println!("Device {}: access {}", device, answer);
                return Ok(());
            }
            Some(_) => continue,
            None => return Err(CliError::PermissionTimeout(device)),
        }
    }
}
