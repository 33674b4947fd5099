// src/io/codec.rs
//
// Shared decoder interface for the two vehicle buses.
//
// Each protocol's decoder lives in its own module:
// - avc/codec.rs - bus-A (audio/climate/display control bus)
// - can/codec.rs - powertrain CAN
//
// Decoders never fail loudly. The bus is noisy, so anything that does not
// parse comes back as `None` and is only counted.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::io::RawMessage;

// ============================================================================
// Decoder Trait
// ============================================================================

/// Trait for payload decoders fed by ingress.
pub trait PayloadDecoder {
    /// The typed message produced on success
    type Message;

    /// Decode one received frame. `None` means the frame was not usable.
    fn decode(&mut self, frame: &RawMessage) -> Option<Self::Message>;

    /// Running decode counters
    fn stats(&self) -> &DecoderStats;
}

/// Counters kept by each decoder.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DecoderStats {
    /// Frames offered to the decoder
    pub total: u64,
    /// Frames decoded into a known message type
    pub decoded: u64,
    /// Frames that parsed but matched no known type
    pub unknown: u64,
    /// Frames rejected as malformed
    pub dropped: u64,
    /// Decoded count per message type name
    pub by_type: BTreeMap<String, u64>,
}

impl DecoderStats {
    pub fn record_total(&mut self) {
        self.total += 1;
    }

    pub fn record_decoded(&mut self, type_name: &str) {
        self.decoded += 1;
        *self.by_type.entry(type_name.to_string()).or_insert(0) += 1;
    }

    pub fn record_unknown(&mut self) {
        self.unknown += 1;
    }

    pub fn record_dropped(&mut self) {
        self.dropped += 1;
    }

    pub fn reset(&mut self) {
        *self = DecoderStats::default();
    }
}

// ============================================================================
// Extracted Values
// ============================================================================

/// One extracted field value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl FieldValue {
    /// Numeric view; integers widen to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

/// Extracted fields keyed by name. A missing key means "not decoded".
pub type FieldMap = BTreeMap<&'static str, FieldValue>;

// ============================================================================
// Hex Helpers
// ============================================================================

/// Parse a hex number, accepting an optional `0x` prefix.
pub fn parse_hex_u32(s: &str) -> Option<u32> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

/// Parse a one- or two-digit hex byte string.
pub fn parse_hex_byte(s: &str) -> Option<u8> {
    let s = s.trim();
    let mut out = [0u8; 1];
    match s.len() {
        2 => hex::decode_to_slice(s, &mut out).ok().map(|_| out[0]),
        1 => hex::decode_to_slice(format!("0{}", s), &mut out)
            .ok()
            .map(|_| out[0]),
        _ => None,
    }
}

/// Render bytes as a list of 2-digit uppercase hex strings.
pub fn format_hex_bytes(data: &[u8]) -> Vec<String> {
    data.iter().map(|b| hex::encode_upper([*b])).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_u32() {
        assert_eq!(parse_hex_u32("0x3CB"), Some(0x3CB));
        assert_eq!(parse_hex_u32("3cb"), Some(0x3CB));
        assert_eq!(parse_hex_u32("0X18DAF110"), Some(0x18DAF110));
        assert_eq!(parse_hex_u32("0x"), None);
        assert_eq!(parse_hex_u32("zz"), None);
    }

    #[test]
    fn test_parse_hex_byte() {
        assert_eq!(parse_hex_byte("2A"), Some(0x2A));
        assert_eq!(parse_hex_byte("ff"), Some(0xFF));
        assert_eq!(parse_hex_byte("7"), Some(0x07));
        assert_eq!(parse_hex_byte("123"), None);
        assert_eq!(parse_hex_byte("G1"), None);
    }

    #[test]
    fn test_format_hex_bytes_uppercase() {
        assert_eq!(format_hex_bytes(&[0x00, 0x0b, 0xAF]), vec!["00", "0B", "AF"]);
    }

    #[test]
    fn test_stats_by_type() {
        let mut stats = DecoderStats::default();
        stats.record_total();
        stats.record_decoded("HV_BATTERY");
        stats.record_total();
        stats.record_decoded("HV_BATTERY");
        stats.record_total();
        stats.record_unknown();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.decoded, 2);
        assert_eq!(stats.unknown, 1);
        assert_eq!(stats.by_type.get("HV_BATTERY"), Some(&2));
        stats.reset();
        assert_eq!(stats, DecoderStats::default());
    }

    #[test]
    fn test_field_value_views() {
        assert_eq!(FieldValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(FieldValue::Float(1.5).as_i64(), None);
        assert_eq!(FieldValue::from(true).as_bool(), Some(true));
        assert_eq!(FieldValue::from("D").as_str(), Some("D"));
    }
}
