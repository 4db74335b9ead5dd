//! Interactive monitor implementation

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use usbserial_core::{DeviceId, EventHub, LineConfig};
use usbserial_session::SessionManager;

use super::print_event;
use crate::error::CliError;

/// Open `device` and bridge it to the terminal until stdin closes
pub fn run_monitor(
    manager: &SessionManager,
    hub: &EventHub,
    device: DeviceId,
    line: LineConfig,
    raw: bool,
) -> Result<(), CliError> {
    let events = hub.subscribe_device(device);
    let opened = manager.open(device, line)?;
    eprintln!(
        "Connected to device {} ({}, {} driver) at {}. Ctrl-D to quit.",
        opened.device_id,
        opened.product_name,
        opened.driver,
        line
    );

    let stop = Arc::new(AtomicBool::new(false));
    let printer = {
        let stop = stop.clone();
        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                if let Some(event) = events.recv_timeout(Duration::from_millis(100)) {
                    print_event(&event);
                }
            }
        })
    };

    let mut result = Ok(());
    for input in io::stdin().lock().lines() {
        let input = match input {
            Ok(input) => input,
            Err(e) => {
                result = Err(CliError::from(e));
                break;
            }
        };
        if let Err(e) = manager.send_command(device, &input, !raw) {
            // The session stays open after a failed write
            eprintln!("send failed: {}", e);
        }
    }

    let closed = manager.close(device);
    stop.store(true, Ordering::SeqCst);
    let _ = printer.join();

    result?;
    closed?;
    Ok(())
}
