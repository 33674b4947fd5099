// src/io/avc/codec.rs
//
// Bus-A frame decoding.
//
// Accepts either the gateway envelope `{"id": 2, "d": {...}, "ts": ms, "seq": N}`
// or the bare payload `{"m": "10C", "s": "310", "c": 0, "d": ["00", ...], "cnt": 1}`.
// Anything else decodes to `None`; the bus is noisy and bad frames are expected.

use serde::Serialize;
use serde_json::Value;

use super::classify::{classify_message, device_name, MessageClass};
use crate::io::codec::{parse_hex_byte, parse_hex_u32, DecoderStats, FieldMap, FieldValue, PayloadDecoder};
use crate::io::{RawMessage, DEVICE_AVC};

/// A/C amplifier address; its broadcasts carry climate status.
pub const AC_AMP_ADDR: u16 = 0x130;

/// Toyota temperature bytes are offset by 40.
const TEMP_OFFSET: i64 = 40;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AvcMessageType {
    Unknown,
    ButtonPress,
    AudioControl,
    ClimateStatus,
}

/// One decoded bus-A message.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AvcMessage {
    /// Seconds; 0.0 when the frame carried no timestamp
    pub timestamp: f64,
    pub sequence: Option<u64>,
    pub master_addr: u16,
    pub slave_addr: u16,
    pub control: u8,
    pub data: Vec<u8>,
    pub count: u32,
    pub master_name: String,
    pub slave_name: String,
    pub classification: MessageClass,
    pub msg_type: AvcMessageType,
    /// Extracted fields. Absent keys were not decoded.
    pub values: FieldMap,
}

impl AvcMessage {
    pub fn is_broadcast(&self) -> bool {
        matches!(self.slave_addr, 0xFFF | 0x1FF)
    }

    /// Space-separated uppercase hex of the data bytes.
    pub fn data_hex(&self) -> String {
        self.data
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn value(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a gateway frame or bare bus-A payload.
pub fn decode_message(raw: &Value) -> Option<AvcMessage> {
    let obj = raw.as_object()?;

    let (payload, timestamp, sequence) = if obj.contains_key("id") {
        if obj.get("id").and_then(Value::as_u64) != Some(u64::from(DEVICE_AVC)) {
            return None;
        }
        let ts = obj.get("ts").and_then(Value::as_f64).map(|ms| ms / 1000.0);
        let seq = obj.get("seq").and_then(Value::as_u64);
        (obj.get("d")?, ts.unwrap_or(0.0), seq)
    } else if obj.contains_key("m") && obj.contains_key("s") {
        (raw, 0.0, None)
    } else {
        return None;
    };

    decode_payload(payload, timestamp, sequence)
}

/// Decode the inner `{m, s, c, d, cnt}` payload.
pub fn decode_payload(payload: &Value, timestamp: f64, sequence: Option<u64>) -> Option<AvcMessage> {
    let fields = payload.as_object().filter(|o| !o.is_empty())?;

    let master_addr = parse_address(fields.get("m"))?;
    let slave_addr = parse_address(fields.get("s"))?;

    let control = match fields.get("c") {
        None => 0,
        Some(c) => u8::try_from(c.as_u64()?).ok()?,
    };

    let data = match fields.get("d") {
        None => Vec::new(),
        Some(d) => d
            .as_array()?
            .iter()
            .map(|b| b.as_str().and_then(parse_hex_byte))
            .collect::<Option<Vec<u8>>>()?,
    };

    let count = match fields.get("cnt") {
        None => 1,
        Some(c) => u32::try_from(c.as_u64()?).ok()?,
    };

    let mut msg = AvcMessage {
        timestamp,
        sequence,
        master_addr,
        slave_addr,
        control,
        classification: classify_message(master_addr, slave_addr, &data),
        data,
        count,
        master_name: device_name(master_addr),
        slave_name: device_name(slave_addr),
        msg_type: AvcMessageType::Unknown,
        values: FieldMap::new(),
    };

    if master_addr == AC_AMP_ADDR {
        decode_climate_status(&mut msg);
    }

    Some(msg)
}

fn parse_address(value: Option<&Value>) -> Option<u16> {
    let addr = parse_hex_u32(value?.as_str()?)?;
    u16::try_from(addr).ok().filter(|a| *a <= 0xFFF)
}

/// A/C amplifier status broadcast.
///
/// Ambient temperature is byte 3 or byte 4 minus 40, accepted only in 0..=50 °C.
/// Byte 1 carries the air mode and the recirculation bit (0x10).
fn decode_climate_status(msg: &mut AvcMessage) {
    if msg.data.is_empty() {
        return;
    }
    msg.msg_type = AvcMessageType::ClimateStatus;

    if msg.data.len() < 5 {
        return;
    }

    let b3 = i64::from(msg.data[3]);
    let b4 = i64::from(msg.data[4]);
    msg.values.insert("raw_byte_3", b3.into());
    msg.values.insert("raw_byte_4", b4.into());

    let plausible = |t: i64| (0..=50).contains(&t);
    if plausible(b3 - TEMP_OFFSET) {
        msg.values.insert("ambient_temp_c", (b3 - TEMP_OFFSET).into());
    } else if plausible(b4 - TEMP_OFFSET) {
        msg.values.insert("ambient_temp_c", (b4 - TEMP_OFFSET).into());
    }

    let status = msg.data[1];
    msg.values.insert("raw_mode_byte", i64::from(status).into());
    msg.values.insert("face", (status & 0x01 != 0).into());
    msg.values.insert("feet", (status & 0x02 != 0).into());
    msg.values.insert("mode_enum", i64::from(status).into());
    msg.values.insert("recirc", (status & 0x10 != 0).into());
}

// ============================================================================
// Decoder
// ============================================================================

/// Stateful wrapper that counts what it sees.
#[derive(Debug, Default)]
pub struct AvcDecoder {
    stats: DecoderStats,
}

impl AvcDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }
}

impl PayloadDecoder for AvcDecoder {
    type Message = AvcMessage;

    fn decode(&mut self, frame: &RawMessage) -> Option<AvcMessage> {
        self.stats.record_total();
        if frame.device_id != DEVICE_AVC {
            self.stats.record_dropped();
            return None;
        }
        match decode_payload(&frame.payload, frame.timestamp, frame.sequence) {
            Some(msg) => {
                if msg.classification == MessageClass::Unknown {
                    self.stats.record_unknown();
                } else {
                    self.stats.record_decoded(msg.classification.as_str());
                }
                Some(msg)
            }
            None => {
                self.stats.record_dropped();
                None
            }
        }
    }

    fn stats(&self) -> &DecoderStats {
        &self.stats
    }
}

// ============================================================================
// Tests
// ============================================================================
