// src/io/can/codec.rs
//
// Powertrain CAN decoder for the Prius Gen 2.
//
// Gateway payload: `{"i": "0x3CB", "d": [0, 0, 0, 128, 50, 0, 0, 0]}`
// where data bytes are integers or 2-digit hex strings.
//
// Layouts were validated against recorded drives. Fields that proved wrong most
// of the time are left out on purpose:
//   - delta SOC on 0x3CB
//   - the status flag byte on 0x038 (engine running comes from RPM only)
//   - 0x4CE, 0x540 and 0x03A, which stay Unknown
// An absent key means "not known" and must not be filled in downstream.

use serde::Serialize;
use serde_json::Value;

use crate::io::codec::{parse_hex_byte, parse_hex_u32, DecoderStats, FieldMap, FieldValue, PayloadDecoder};
use crate::io::RawMessage;

/// Marker for a gear nibble outside the known map.
pub const GEAR_UNKNOWN: &str = "?";

const MAX_STANDARD_ID: u32 = 0x7FF;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CanMessageType {
    Unknown,
    HvBattery,
    HvBatteryPower,
    HvBatteryTemp,
    EngineStatus,
    VehicleSpeed,
    EngineRpm,
    GearPosition,
    SystemStatus,
    PedalPosition,
    FuelLevel,
    EnergyFlow,
    FuelConsumption,
}

impl CanMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanMessageType::Unknown => "UNKNOWN",
            CanMessageType::HvBattery => "HV_BATTERY",
            CanMessageType::HvBatteryPower => "HV_BATTERY_POWER",
            CanMessageType::HvBatteryTemp => "HV_BATTERY_TEMP",
            CanMessageType::EngineStatus => "ENGINE_STATUS",
            CanMessageType::VehicleSpeed => "VEHICLE_SPEED",
            CanMessageType::EngineRpm => "ENGINE_RPM",
            CanMessageType::GearPosition => "GEAR_POSITION",
            CanMessageType::SystemStatus => "SYSTEM_STATUS",
            CanMessageType::PedalPosition => "PEDAL_POSITION",
            CanMessageType::FuelLevel => "FUEL_LEVEL",
            CanMessageType::EnergyFlow => "ENERGY_FLOW",
            CanMessageType::FuelConsumption => "FUEL_CONSUMPTION",
        }
    }
}

/// One decoded CAN frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CanMessage {
    pub can_id: u32,
    pub is_extended: bool,
    pub data: Vec<u8>,
    pub msg_type: CanMessageType,
    pub values: FieldMap,
    pub timestamp: f64,
    pub sequence: Option<u64>,
}

impl CanMessage {
    pub fn new(can_id: u32, data: Vec<u8>) -> Self {
        Self {
            can_id,
            is_extended: can_id > MAX_STANDARD_ID,
            data,
            msg_type: CanMessageType::Unknown,
            values: FieldMap::new(),
            timestamp: 0.0,
            sequence: None,
        }
    }

    pub fn value(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    pub fn f64_value(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(FieldValue::as_f64)
    }

    pub fn bool_value(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(FieldValue::as_bool)
    }

    fn set(&mut self, key: &'static str, value: impl Into<FieldValue>) {
        self.values.insert(key, value.into());
    }
}

/// Map the 0x120 gear nibble. Anything outside 0..=4 is `?`.
pub fn decode_gear(nibble: u8) -> &'static str {
    match nibble {
        0 => "P",
        1 => "R",
        2 => "N",
        3 => "D",
        4 => "B",
        _ => GEAR_UNKNOWN,
    }
}

fn signed_byte(b: u8) -> i64 {
    i64::from(b as i8)
}

// ============================================================================
// Decoder
// ============================================================================

#[derive(Debug, Default)]
pub struct CanDecoder {
    stats: DecoderStats,
}

impl CanDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Decode a `{"i", "d"}` payload. A missing or non-hex id yields `None`;
    /// undecodable data bytes leave the data empty (and the type Unknown).
    pub fn decode_payload(&mut self, payload: &Value, timestamp: f64, sequence: Option<u64>) -> Option<CanMessage> {
        self.stats.record_total();

        let Some(can_id) = payload.get("i").and_then(Value::as_str).and_then(parse_hex_u32) else {
            self.stats.record_dropped();
            return None;
        };

        let data = payload
            .get("d")
            .and_then(Value::as_array)
            .and_then(|items| items.iter().map(data_byte).collect::<Option<Vec<u8>>>())
            .unwrap_or_default();

        let mut msg = CanMessage::new(can_id, data);
        msg.timestamp = timestamp;
        msg.sequence = sequence;

        if !msg.is_extended {
            decode_standard_frame(&mut msg);
        }

        if msg.msg_type == CanMessageType::Unknown {
            self.stats.record_unknown();
        } else {
            self.stats.record_decoded(msg.msg_type.as_str());
        }
        Some(msg)
    }
}

fn data_byte(value: &Value) -> Option<u8> {
    match value {
        Value::String(s) => parse_hex_byte(s),
        Value::Number(n) => n.as_u64().and_then(|v| u8::try_from(v).ok()),
        _ => None,
    }
}

impl PayloadDecoder for CanDecoder {
    type Message = CanMessage;

    fn decode(&mut self, frame: &RawMessage) -> Option<CanMessage> {
        self.decode_payload(&frame.payload, frame.timestamp, frame.sequence)
    }

    fn stats(&self) -> &DecoderStats {
        &self.stats
    }
}

/// Fill in type and values for a known 11-bit id. Short frames stay Unknown.
fn decode_standard_frame(msg: &mut CanMessage) {
    let d = msg.data.clone();
    let len = d.len();

    match msg.can_id {
        0x03B if len >= 5 => {
            msg.msg_type = CanMessageType::HvBattery;
            // 12-bit two's complement, 0.1 A per bit
            let mut raw = (i64::from(d[0] & 0x0F) << 8) | i64::from(d[1]);
            if raw > 0x7FF {
                raw -= 0x1000;
            }
            let current = raw as f64 / 10.0;
            let voltage = i64::from(d[3]);
            msg.set("current", current);
            msg.set("voltage", voltage);
            msg.set("is_charging", current < 0.0);
            msg.set("power_kw", voltage as f64 * current / 1000.0);
        }
        0x3CB if len >= 7 => {
            msg.msg_type = CanMessageType::HvBatteryPower;
            msg.set("cdl", i64::from(d[0]));
            msg.set("ccl", i64::from(d[1]));
            msg.set("soc", (f64::from(d[3]) * 0.5).min(100.0));
            msg.set("soc_raw", i64::from(d[3]));
            msg.set("battery_temp", signed_byte(d[4]));
            msg.set("battery_temp_avg", signed_byte(d[4]));
            msg.set("battery_temp2", signed_byte(d[5]));
            msg.set("battery_temp_max", signed_byte(d[5]));
        }
        0x3B6 if len >= 7 => {
            // Bit meanings are unconfirmed; consumers treat these as raw
            msg.msg_type = CanMessageType::EnergyFlow;
            msg.set("flow_engine_to_wheels", d[5] & 0x01 != 0);
            msg.set("flow_battery_to_motor", d[5] & 0x02 != 0);
            msg.set("flow_byte_5", i64::from(d[5]));
            msg.set("flow_byte_6", i64::from(d[6]));
        }
        0x520 if len >= 2 => {
            msg.msg_type = CanMessageType::FuelConsumption;
            msg.set("injector_time", (i64::from(d[0]) << 8) | i64::from(d[1]));
        }
        0x244 if len >= 7 => {
            msg.msg_type = CanMessageType::PedalPosition;
            msg.set("throttle", i64::from(d[6]));
        }
        0x030 if len >= 5 => {
            msg.msg_type = CanMessageType::PedalPosition;
            msg.set("brake", i64::from(d[4]));
        }
        0x5A4 if len >= 2 => {
            msg.msg_type = CanMessageType::FuelLevel;
            msg.set("fuel_level", i64::from(d[1]));
        }
        0x3C8 if len >= 5 => {
            msg.msg_type = CanMessageType::SystemStatus;
            msg.set("soc_alt", i64::from(d[2]));
        }
        0x3CD if len >= 5 => {
            msg.msg_type = CanMessageType::HvBattery;
            msg.set("fault_code", (i64::from(d[0]) << 8) | i64::from(d[1]));
            msg.set("voltage_raw_3cd", (i64::from(d[3]) << 8) | i64::from(d[4]));
        }
        0x348 if len >= 6 => {
            msg.msg_type = CanMessageType::HvBatteryTemp;
            if d[2] > 0 {
                msg.set("pack_temp", i64::from(d[2]) - 40);
            }
            if d[4] > 0 {
                msg.set("pack_temp2", i64::from(d[4]) - 40);
            }
        }
        0x038 if len >= 7 => {
            msg.msg_type = CanMessageType::EngineStatus;
            let rpm = i64::from(d[1]) * 32;
            msg.set("rpm", rpm);
            msg.set("ice_running", rpm > 0);
        }
        0x039 if len >= 4 => {
            msg.msg_type = CanMessageType::EngineRpm;
            msg.set("coolant_temp", i64::from(d[0]));
        }
        0x0B4 if len >= 8 => {
            msg.msg_type = CanMessageType::VehicleSpeed;
            let speed_raw = (u32::from(d[5]) << 8) | u32::from(d[6]);
            msg.set("speed_kph", f64::from(speed_raw) / 100.0);
            let alt_raw = (u32::from(d[6]) << 8) | u32::from(d[7]);
            if alt_raw > 0 {
                msg.set("speed_kph_alt", f64::from(alt_raw) / 100.0);
            }
        }
        0x120 if len >= 8 => {
            msg.msg_type = CanMessageType::GearPosition;
            let nibble = d[5] & 0x0F;
            msg.set("gear", decode_gear(nibble));
            msg.set("gear_raw", i64::from(nibble));
        }
        _ => {}
    }
}

// ============================================================================
// Tests
// ============================================================================
