//! Errors of the command line front end

use thiserror::Error;
use usbserial_core::{DeviceId, HostError, SessionError};
use usbserial_session::ConfigError;

/// Anything a command can fail with
#[derive(Debug, Error)]
pub enum CliError {
    /// `--backend` names a backend that is not compiled in
    #[error("unknown backend '{name}' (available: {available})")]
    UnknownBackend {
        /// Requested name
        name: String,
        /// Comma separated names of the compiled-in backends
        available: String,
    },

    /// Configuration file problem
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Enumeration failed
    #[error(transparent)]
    Host(#[from] HostError),

    /// A session operation failed
    #[error("{source} [{code}]", code = .source.code())]
    Session {
        /// The failure
        #[from]
        source: SessionError,
    },

    /// No answer to a permission request in time
    #[error("no permission answer for device {0}")]
    PermissionTimeout(DeviceId),

    /// Reading from stdin failed
    #[error("failed to read input: {0}")]
    Input(#[from] std::io::Error),
}
