//! CLI command implementations
//!
//! Each command works against a [`SessionManager`] built by the selected
//! backend, so the same code drives real hardware and the dummy devices.
//!
//! [`SessionManager`]: usbserial_session::SessionManager

mod list;
mod monitor;
mod permission;
mod send;

pub use list::{list_devices, list_drivers};
pub use monitor::run_monitor;
pub use permission::{check_permission, request_permission};
pub use send::run_send;

use std::io::{self, Write};

use usbserial_core::SerialEvent;

/// Print one event the way every command shows them
fn print_event(event: &SerialEvent) {
    match event {
        SerialEvent::ReceivedData { data, .. } => {
            print!("{}", data);
            let _ = io::stdout().flush();
        }
        SerialEvent::Error { device_id, message } => {
            eprintln!("[device {}] read error: {}", device_id, message);
        }
        SerialEvent::PermissionResult { device_id, granted } => {
            let answer = if *granted { "granted" } else { "denied" };
            eprintln!("[device {}] permission {}", device_id, answer);
        }
    }
}
