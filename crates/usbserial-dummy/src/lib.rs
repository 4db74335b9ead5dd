//! usbserial-dummy - In-memory USB serial backend for testing
//!
//! This crate provides a fake host and fake chipset ports that behave like
//! real ones without any hardware. Ports can replay a script of reads, echo
//! writes back, and fail on demand at any step. They also count how many
//! threads are reading concurrently, which is how tests prove a device never
//! gets two read loops.

mod host;
mod port;

pub use host::{DummyConnection, DummyHost};
pub use port::{CreatedDriver, DummyDriver, DummyDriverFactory, DummyPort, PortBehavior, ReadStep};
