//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use usbserial_core::{DeviceId, LineConfig, LineConfigError, Parity, StopBits};

/// Parse a device id as printed by `list`
fn parse_device_id(s: &str) -> Result<DeviceId, String> {
    s.parse::<u32>()
        .map(DeviceId)
        .map_err(|e| format!("Invalid device id: {}", e))
}

#[derive(Parser)]
#[command(name = "usbserial")]
#[command(author, version, about = "USB serial device session manager", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Backend providing the devices (host, dummy)
    #[arg(short, long, global = true, default_value = "host")]
    pub backend: String,

    /// Session configuration file (TOML, [session] table)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the read loop timeout in milliseconds
    #[arg(long, global = true)]
    pub read_timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Line parameters shared by the commands that open a device
#[derive(clap::Args, Debug, Clone)]
pub struct LineArgs {
    /// Baud rate
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,

    /// Data bits (5-8)
    #[arg(long, default_value_t = 8)]
    pub data_bits: u8,

    /// Stop bits (1, 1.5, 2)
    #[arg(long, default_value = "1")]
    pub stop_bits: StopBits,

    /// Parity (none, odd, even, mark, space)
    #[arg(long, default_value = "none")]
    pub parity: Parity,
}

impl LineArgs {
    /// Validated line configuration
    pub fn line_config(&self) -> Result<LineConfig, LineConfigError> {
        LineConfig::new(self.baud, self.data_bits, self.stop_bits, self.parity)
    }
}

/// How the payload of `send` is encoded
#[derive(clap::Args, Debug, Clone, Default)]
#[group(multiple = false)]
pub struct PayloadArgs {
    /// Payload is base64
    #[arg(long)]
    pub base64: bool,

    /// Payload is hex
    #[arg(long)]
    pub hex: bool,

    /// Append a newline to a text payload
    #[arg(short = 'n', long)]
    pub newline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List attached devices and the driver each would get
    List,

    /// List the driver tables used for probing
    Drivers,

    /// Check whether a device may be opened
    Permission {
        /// Device id (see `list`)
        #[arg(value_parser = parse_device_id)]
        device: DeviceId,
    },

    /// Ask the host for access to a device
    RequestPermission {
        /// Device id (see `list`)
        #[arg(value_parser = parse_device_id)]
        device: DeviceId,

        /// Wait for the answer instead of returning right away
        #[arg(short, long)]
        wait: bool,
    },

    /// Open a device, print what it sends and send stdin lines to it
    Monitor {
        /// Device id (see `list`)
        #[arg(value_parser = parse_device_id)]
        device: DeviceId,

        #[command(flatten)]
        line: LineArgs,

        /// Do not append a newline to lines read from stdin
        #[arg(long)]
        raw: bool,
    },

    /// Open a device, send one payload and print the reply
    Send {
        /// Device id (see `list`)
        #[arg(value_parser = parse_device_id)]
        device: DeviceId,

        /// Payload (text unless --base64 or --hex is given)
        payload: String,

        #[command(flatten)]
        encoding: PayloadArgs,

        #[command(flatten)]
        line: LineArgs,

        /// How long to collect the reply, in milliseconds
        #[arg(short, long, default_value_t = 500)]
        wait_ms: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_monitor_line_args() {
        let cli = Cli::parse_from([
            "usbserial",
            "--backend",
            "dummy",
            "monitor",
            "1002",
            "--baud",
            "115200",
            "--stop-bits",
            "1.5",
            "--parity",
            "even",
        ]);
        assert_eq!(cli.backend, "dummy");
        match cli.command {
            Commands::Monitor { device, line, raw } => {
                assert_eq!(device, DeviceId(1002));
                assert!(!raw);
                let config = line.line_config().unwrap();
                assert_eq!(config.baud_rate, 115200);
                assert_eq!(config.stop_bits, StopBits::OnePointFive);
                assert_eq!(config.parity, Parity::Even);
            }
            _ => panic!("expected monitor"),
        }
    }

    #[test]
    fn test_payload_encodings_are_exclusive() {
        let result = Cli::try_parse_from(["usbserial", "send", "1", "aGk=", "--base64", "--hex"]);
        assert!(result.is_err());
    }
}
