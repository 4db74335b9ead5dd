//! usbserial - USB serial device session manager
//!
//! Command line front end over the session manager. It plays the role of the
//! bridge: it turns commands into session operations and prints the events
//! the sessions produce.
//!
//! # Backends
//!
//! - **host** - devices attached to this machine, opened through the serial
//!   nodes of the kernel's chipset drivers
//! - **dummy** - in-memory demo devices that echo what they receive

mod backends;
mod cli;
mod commands;
mod error;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands};
use usbserial_core::{EventHub, SessionError};
use usbserial_session::SessionConfig;

use crate::error::CliError;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = load_config(&cli)?;
    let hub = Arc::new(EventHub::new());
    let manager = backends::open_backend(&cli.backend, config, hub.clone())?;
    log::debug!("Using {} backend", cli.backend);

    let result = match cli.command {
        Commands::List => commands::list_devices(&manager),
        Commands::Drivers => {
            commands::list_drivers(&manager);
            Ok(())
        }
        Commands::Permission { device } => commands::check_permission(&manager, device),
        Commands::RequestPermission { device, wait } => {
            commands::request_permission(&manager, &hub, device, wait)
        }
        Commands::Monitor { device, line, raw } => {
            let line = line.line_config().map_err(SessionError::from)?;
            commands::run_monitor(&manager, &hub, device, line, raw)
        }
        Commands::Send {
            device,
            payload,
            encoding,
            line,
            wait_ms,
        } => {
            let line = line.line_config().map_err(SessionError::from)?;
            commands::run_send(
                &manager,
                &hub,
                device,
                line,
                &payload,
                &encoding,
                Duration::from_millis(wait_ms),
            )
        }
    };

    result.map_err(Into::into)
}

/// Load the session configuration and apply command line overrides
fn load_config(cli: &Cli) -> Result<SessionConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };

    if let Some(ms) = cli.read_timeout_ms {
        config = config.with_read_timeout(Duration::from_millis(ms));
        config.validate()?;
    }

    Ok(config)
}
