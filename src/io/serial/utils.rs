// src/io/serial/utils.rs
//
// Serial link settings and their conversion to serialport crate types.

use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity as SpParity, SerialPort, StopBits};
use std::time::Duration;

use crate::io::IoError;

// ============================================================================
// Types
// ============================================================================

/// Parity setting for serial port configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Gateway link settings (`[serial]` in the config file).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerialSettings {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    /// Timed read granularity; also bounds how fast the reader notices `stop`
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Upper bound on waiting for each worker thread in `stop`
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

fn default_port() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_baud_rate() -> u32 {
    1_000_000
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_read_timeout_ms() -> u64 {
    100
}

fn default_join_timeout_ms() -> u64 {
    1000
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::default(),
            read_timeout_ms: default_read_timeout_ms(),
            join_timeout_ms: default_join_timeout_ms(),
        }
    }
}

impl SerialSettings {
    /// Short `8N1`-style description for log lines.
    pub fn line_format(&self) -> String {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        format!("{}{}{}", self.data_bits, parity, self.stop_bits)
    }

    /// Open the port described by these settings.
    pub fn open(&self) -> Result<Box<dyn SerialPort>, IoError> {
        serialport::new(&self.port, self.baud_rate)
            .data_bits(to_serialport_data_bits(self.data_bits))
            .stop_bits(to_serialport_stop_bits(self.stop_bits))
            .parity(to_serialport_parity(&self.parity))
            .timeout(Duration::from_millis(self.read_timeout_ms.max(1)))
            .open()
            .map_err(|e| IoError::connection(&self.port, e.to_string()))
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert our Parity enum to serialport crate's Parity type
pub fn to_serialport_parity(p: &Parity) -> SpParity {
    match p {
        Parity::None => SpParity::None,
        Parity::Odd => SpParity::Odd,
        Parity::Even => SpParity::Even,
    }
}

/// Convert data bits count to serialport crate's DataBits type
pub fn to_serialport_data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

/// Convert stop bits count to serialport crate's StopBits type
pub fn to_serialport_stop_bits(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let s = SerialSettings::default();
        assert_eq!(s.port, "/dev/ttyACM0");
        assert_eq!(s.baud_rate, 1_000_000);
        assert_eq!(s.read_timeout_ms, 100);
        assert_eq!(s.line_format(), "8N1");
    }

    #[test]
    fn test_settings_partial_toml_uses_defaults() {
        let s: SerialSettings = toml::from_str("port = \"/dev/ttyUSB1\"\nparity = \"even\"").unwrap();
        assert_eq!(s.port, "/dev/ttyUSB1");
        assert_eq!(s.parity, Parity::Even);
        assert_eq!(s.baud_rate, 1_000_000);
        assert_eq!(s.line_format(), "8E1");
    }

    #[test]
    fn test_open_missing_port_is_connection_error() {
        let s = SerialSettings {
            port: "/dev/does-not-exist-cyberdeck".to_string(),
            ..SerialSettings::default()
        };
        assert!(matches!(s.open(), Err(IoError::Connection { .. })));
    }

    #[test]
    fn test_to_serialport_parity() {
        assert!(matches!(to_serialport_parity(&Parity::None), SpParity::None));
        assert!(matches!(to_serialport_parity(&Parity::Odd), SpParity::Odd));
        assert!(matches!(to_serialport_parity(&Parity::Even), SpParity::Even));
    }

    #[test]
    fn test_to_serialport_data_bits() {
        assert!(matches!(to_serialport_data_bits(7), DataBits::Seven));
        assert!(matches!(to_serialport_data_bits(8), DataBits::Eight));
        assert!(matches!(to_serialport_data_bits(9), DataBits::Eight)); // default
    }

    #[test]
    fn test_to_serialport_stop_bits() {
        assert!(matches!(to_serialport_stop_bits(2), StopBits::Two));
        assert!(matches!(to_serialport_stop_bits(0), StopBits::One)); // default
    }
}
