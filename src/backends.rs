//! Backend registration and dispatch
//!
//! A backend supplies device enumeration, the permission gate and the driver
//! factory. Which backends exist depends on the enabled features.

use std::sync::Arc;

use usbserial_core::EventSink;
use usbserial_session::{SessionConfig, SessionManager};

use crate::error::CliError;

/// Information about a backend
pub struct BackendInfo {
    /// Name used on the command line
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
}

/// All backends enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "host")]
    backends.push(BackendInfo {
        name: "host",
        description: "USB devices attached to this machine, through their kernel serial nodes",
    });

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        description: "In-memory demo devices that echo whatever is sent to them",
    });

    backends
}

/// Comma separated backend names
pub fn backend_names_short() -> String {
    let names: Vec<&str> = available_backends().iter().map(|b| b.name).collect();
    names.join(", ")
}

/// Build a session manager on top of the backend called `name`
#[allow(unused_variables)]
pub fn open_backend(
    name: &str,
    config: SessionConfig,
    sink: Arc<dyn EventSink>,
) -> Result<SessionManager, CliError> {
    #[cfg(feature = "host")]
    if name == "host" {
        use usbserial_host::{HostDriverFactory, HostPermissionGate, NusbHost};

        let gate = HostPermissionGate::new(config.permission_wait);
        return Ok(SessionManager::new(
            Arc::new(NusbHost::new()),
            Arc::new(gate),
            Arc::new(HostDriverFactory::new()),
            sink,
            config,
        ));
    }

    #[cfg(feature = "dummy")]
    if name == "dummy" {
        use usbserial_dummy::{DummyDriverFactory, DummyHost, PortBehavior};

        let host = DummyHost::with_demo_devices();
        return Ok(SessionManager::new(
            Arc::new(host.clone()),
            Arc::new(host),
            Arc::new(DummyDriverFactory::new(PortBehavior::echo())),
            sink,
            config,
        ));
    }

    Err(CliError::UnknownBackend {
        name: name.to_string(),
        available: backend_names_short(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use usbserial_core::EventHub;

    #[test]
    fn test_unknown_backend() {
        let hub = Arc::new(EventHub::new());
        let err = open_backend("bogus", SessionConfig::default(), hub)
            .err()
            .unwrap();
        assert!(matches!(err, CliError::UnknownBackend { .. }));
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_backend_lists_demo_devices() {
        let hub = Arc::new(EventHub::new());
        let manager = open_backend("dummy", SessionConfig::default(), hub).unwrap();
        assert_eq!(manager.list().unwrap().len(), 5);
        assert!(backend_names_short().contains("dummy"));
    }
}
