//! Session configuration
//!
//! Timeouts and buffer sizes can be tuned from a TOML file:
//!
//! ```toml
//! [session]
//! read_timeout_ms = 1000
//! read_buffer_size = 1024
//! write_timeout_ms = 1000
//! close_grace_ms = 2000
//! permission_wait_ms = 30000
//! ```
//!
//! Every key is optional. A missing `close_grace_ms` is derived from the read
//! timeout so a closing session always outlives one blocked read.

use std::fs;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

/// Default bounded read timeout of the read loop
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);
/// Default size of the read loop's buffer
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;
/// Default write timeout for `send`
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(1000);
/// Default time a host permission request keeps waiting for a grant
pub const DEFAULT_PERMISSION_WAIT: Duration = Duration::from_secs(30);

/// Errors loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid TOML or has the wrong shape
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Tunables of the session manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long one read of the read loop may block
    pub read_timeout: Duration,
    /// Size of the read loop's reusable buffer
    pub read_buffer_size: usize,
    /// How long one `send` may block
    pub write_timeout: Duration,
    /// How long `close` waits for the read loop to stop
    pub close_grace: Duration,
    /// How long a host permission request keeps waiting
    pub permission_wait: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            close_grace: grace_for(DEFAULT_READ_TIMEOUT),
            permission_wait: DEFAULT_PERMISSION_WAIT,
        }
    }
}

fn grace_for(read_timeout: Duration) -> Duration {
    read_timeout + Duration::from_millis(1000)
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfigFile {
    #[serde(default)]
    session: TomlSession,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlSession {
    read_timeout_ms: Option<u64>,
    read_buffer_size: Option<usize>,
    write_timeout_ms: Option<u64>,
    close_grace_ms: Option<u64>,
    permission_wait_ms: Option<u64>,
}

impl SessionConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: TomlConfigFile = toml::from_str(content)?;
        let s = file.session;
        let defaults = SessionConfig::default();

        let read_timeout = s
            .read_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.read_timeout);
        let config = SessionConfig {
            read_timeout,
            read_buffer_size: s.read_buffer_size.unwrap_or(defaults.read_buffer_size),
            write_timeout: s
                .write_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.write_timeout),
            close_grace: s
                .close_grace_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| grace_for(read_timeout)),
            permission_wait: s
                .permission_wait_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.permission_wait),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        log::debug!("Loaded session config from {}", path.display());
        Ok(config)
    }

    /// Replace the read timeout, keeping the close grace period ahead of it
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        if self.close_grace < read_timeout {
            self.close_grace = grace_for(read_timeout);
        }
        self
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "read_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "read_buffer_size must be greater than zero".into(),
            ));
        }
        if self.close_grace < self.read_timeout {
            return Err(ConfigError::Invalid(format!(
                "close_grace_ms ({}) must not be shorter than read_timeout_ms ({})",
                self.close_grace.as_millis(),
                self.read_timeout.as_millis()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.read_timeout, Duration::from_millis(1000));
        assert_eq!(config.read_buffer_size, 1024);
        assert_eq!(config.close_grace, Duration::from_millis(2000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = SessionConfig::from_toml_str("").unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_parse_session_table() {
        let config = SessionConfig::from_toml_str(
            r#"
            [session]
            read_timeout_ms = 250
            read_buffer_size = 4096
            write_timeout_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert_eq!(config.read_buffer_size, 4096);
        assert_eq!(config.write_timeout, Duration::from_millis(500));
        // Derived from the read timeout
        assert_eq!(config.close_grace, Duration::from_millis(1250));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            SessionConfig::from_toml_str("[session]\nread_buffer_size = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SessionConfig::from_toml_str("[session]\nread_timeout_ms = 5000\nclose_grace_ms = 10"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SessionConfig::from_toml_str("[session]\nbogus = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_with_read_timeout_extends_grace() {
        let config = SessionConfig::default().with_read_timeout(Duration::from_secs(5));
        assert_eq!(config.close_grace, Duration::from_secs(6));

        let config = SessionConfig::default().with_read_timeout(Duration::from_millis(10));
        assert_eq!(config.close_grace, Duration::from_millis(2000));
    }
}
