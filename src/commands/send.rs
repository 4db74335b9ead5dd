//! One-shot send implementation

use std::time::{Duration, Instant};

use usbserial_core::{DeviceId, EventHub, LineConfig};
use usbserial_session::SessionManager;

use super::print_event;
use crate::cli::PayloadArgs;
use crate::error::CliError;

/// Open `device`, send `payload` and print whatever comes back within `wait`
pub fn run_send(
    manager: &SessionManager,
    hub: &EventHub,
    device: DeviceId,
    line: LineConfig,
    payload: &str,
    encoding: &PayloadArgs,
    wait: Duration,
) -> Result<(), CliError> {
    let events = hub.subscribe_device(device);
    let opened = manager.open(device, line)?;
    log::info!(
        "Opened device {} ({}) with {} driver",
        opened.device_id,
        opened.product_name,
        opened.driver
    );

    let sent = if encoding.base64 {
        manager.send_base64(device, payload)
    } else if encoding.hex {
        manager.send_hex(device, payload)
    } else {
        manager.send_command(device, payload, encoding.newline)
    };

    if sent.is_ok() {
        let deadline = Instant::now() + wait;
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            match events.recv_timeout(remaining) {
                Some(event) => print_event(&event),
                None => break,
            }
        }
        println!();
    }

    let closed = manager.close(device);
    sent?;
    closed?;
    Ok(())
}
