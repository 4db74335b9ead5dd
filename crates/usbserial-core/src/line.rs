//! Serial line parameters
//!
//! A [`LineConfig`] is fixed for the lifetime of a session. The integer
//! encodings accepted by [`LineConfig::from_raw`] are the ones used on the
//! bridge: stop bits `1`, `2` and `3` (one and a half), parity `0..=4` for
//! none, odd, even, mark and space.

use std::fmt;
use std::str::FromStr;

use crate::error::LineConfigError;

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    /// One stop bit
    #[default]
    One,
    /// One and a half stop bits
    OnePointFive,
    /// Two stop bits
    Two,
}

impl StopBits {
    /// Decode the bridge's integer encoding
    pub fn from_raw(raw: u8) -> Result<Self, LineConfigError> {
        match raw {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            3 => Ok(StopBits::OnePointFive),
            _ => Err(LineConfigError::StopBits(raw.to_string())),
        }
    }
}

impl FromStr for StopBits {
    type Err = LineConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(StopBits::One),
            "1.5" => Ok(StopBits::OnePointFive),
            "2" => Ok(StopBits::Two),
            _ => Err(LineConfigError::StopBits(s.to_string())),
        }
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopBits::One => write!(f, "1"),
            StopBits::OnePointFive => write!(f, "1.5"),
            StopBits::Two => write!(f, "2"),
        }
    }
}

/// Parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
    /// Parity bit always set
    Mark,
    /// Parity bit always clear
    Space,
}

impl Parity {
    /// Decode the bridge's integer encoding
    pub fn from_raw(raw: u8) -> Result<Self, LineConfigError> {
        match raw {
            0 => Ok(Parity::None),
            1 => Ok(Parity::Odd),
            2 => Ok(Parity::Even),
            3 => Ok(Parity::Mark),
            4 => Ok(Parity::Space),
            _ => Err(LineConfigError::Parity(raw.to_string())),
        }
    }
}

impl FromStr for Parity {
    type Err = LineConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "n" => Ok(Parity::None),
            "odd" | "o" => Ok(Parity::Odd),
            "even" | "e" => Ok(Parity::Even),
            "mark" | "m" => Ok(Parity::Mark),
            "space" | "s" => Ok(Parity::Space),
            _ => Err(LineConfigError::Parity(s.to_string())),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Parity::None => "none",
            Parity::Odd => "odd",
            Parity::Even => "even",
            Parity::Mark => "mark",
            Parity::Space => "space",
        };
        write!(f, "{}", name)
    }
}

/// Line parameters applied when a session is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineConfig {
    /// Baud rate, always positive
    pub baud_rate: u32,
    /// Data bits per character (5-8)
    pub data_bits: u8,
    /// Stop bits
    pub stop_bits: StopBits,
    /// Parity
    pub parity: Parity,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

impl LineConfig {
    /// Create a validated line configuration
    pub fn new(
        baud_rate: u32,
        data_bits: u8,
        stop_bits: StopBits,
        parity: Parity,
    ) -> Result<Self, LineConfigError> {
        if baud_rate == 0 {
            return Err(LineConfigError::BaudRate(baud_rate));
        }
        if !(5..=8).contains(&data_bits) {
            return Err(LineConfigError::DataBits(data_bits));
        }
        Ok(Self {
            baud_rate,
            data_bits,
            stop_bits,
            parity,
        })
    }

    /// Create a line configuration from the bridge's integer encoding
    pub fn from_raw(
        baud_rate: u32,
        data_bits: u8,
        stop_bits: u8,
        parity: u8,
    ) -> Result<Self, LineConfigError> {
        Self::new(
            baud_rate,
            data_bits,
            StopBits::from_raw(stop_bits)?,
            Parity::from_raw(parity)?,
        )
    }
}

impl fmt::Display for LineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 9600 8N1 style
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        };
        write!(
            f,
            "{} {}{}{}",
            self.baud_rate, self.data_bits, parity, self.stop_bits
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw() {
        let cfg = LineConfig::from_raw(9600, 8, 1, 0).unwrap();
        assert_eq!(cfg, LineConfig::default());

        let cfg = LineConfig::from_raw(115200, 7, 3, 2).unwrap();
        assert_eq!(cfg.stop_bits, StopBits::OnePointFive);
        assert_eq!(cfg.parity, Parity::Even);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            LineConfig::from_raw(0, 8, 1, 0),
            Err(LineConfigError::BaudRate(0))
        ));
        assert!(matches!(
            LineConfig::from_raw(9600, 9, 1, 0),
            Err(LineConfigError::DataBits(9))
        ));
        assert!(matches!(
            LineConfig::from_raw(9600, 4, 1, 0),
            Err(LineConfigError::DataBits(4))
        ));
        assert!(LineConfig::from_raw(9600, 8, 0, 0).is_err());
        assert!(LineConfig::from_raw(9600, 8, 1, 5).is_err());
    }

    #[test]
    fn test_parse_text_forms() {
        assert_eq!("1.5".parse::<StopBits>().unwrap(), StopBits::OnePointFive);
        assert_eq!("EVEN".parse::<Parity>().unwrap(), Parity::Even);
        assert_eq!("s".parse::<Parity>().unwrap(), Parity::Space);
        assert!("3".parse::<StopBits>().is_err());
    }

    #[test]
    fn test_display() {
        let cfg = LineConfig::new(115200, 7, StopBits::Two, Parity::Odd).unwrap();
        assert_eq!(cfg.to_string(), "115200 7O2");
    }
}
