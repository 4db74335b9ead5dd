//! usbserial-session - Session manager for USB serial devices
//!
//! This crate owns the open sessions. It selects a driver for a device,
//! acquires a connection through the host's permission gate, opens and
//! configures the port, and runs one background read loop per session that
//! pushes incoming bytes into an [`EventSink`](usbserial_core::EventSink).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use usbserial_core::{DeviceId, EventHub, LineConfig};
//! use usbserial_session::{SessionConfig, SessionManager};
//!
//! let hub = Arc::new(EventHub::new());
//! let events = hub.subscribe();
//! let manager = SessionManager::new(host, gate, factory, hub, SessionConfig::default());
//!
//! manager.open(DeviceId(1002), LineConfig::default())?;
//! manager.send_command(DeviceId(1002), "AT", true)?;
//! if let Some(event) = events.recv() {
//!     println!("{:?}", event);
//! }
//! manager.close(DeviceId(1002))?;
//! ```

#![warn(missing_docs)]

pub mod config;
mod manager;
pub mod probe;
mod read_loop;
mod registry;
mod session;

pub use config::{ConfigError, SessionConfig};
pub use manager::SessionManager;
pub use probe::{DefaultProber, DriverRegistry, ProbeEntry, ProbeSource, ProbeTable};
pub use session::{OpenedSession, SessionState};
