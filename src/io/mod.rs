// src/io/mod.rs
//
// Port abstraction and wire model shared by every input source and output sink.
//
// Frames travel as newline-delimited JSON: `{"id": N, "d": {...}, "ts": ms, "seq": N}`
// where `id` selects the device (0 system, 1 CAN, 2 bus-A, 100+ satellites).
// Ports turn those lines into `RawMessage`s for ingress and turn
// `OutgoingCommand`s from egress back into lines.

pub mod avc;
pub mod can;
pub mod codec;
pub mod error;
pub mod mock;
pub mod replay;
pub mod serial;
pub mod udp;

use serde::Serialize;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

pub use error::IoError;

// ============================================================================
// Device IDs
// ============================================================================

/// Gateway control/status
pub const DEVICE_SYSTEM: u32 = 0;
/// Vehicle CAN bus
pub const DEVICE_CAN: u32 = 1;
/// Bus-A (audio/climate/display control bus)
pub const DEVICE_AVC: u32 = 2;
/// First RS485 satellite id
pub const DEVICE_SATELLITE_BASE: u32 = 100;
/// DRL controller (output)
pub const DEVICE_DRL: u32 = 106;
/// Rain/light sensor (input)
pub const DEVICE_LIGHT_SENSOR: u32 = 107;
/// VFD display satellite (output)
pub const DEVICE_VFD: u32 = 110;

/// Current wall-clock time in seconds since the Unix epoch.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ============================================================================
// Messages
// ============================================================================

/// High-level message category, derived from the device id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageCategory {
    System,
    Can,
    BusA,
    Satellite,
    Unknown,
}

impl MessageCategory {
    pub fn from_device_id(device_id: u32) -> Self {
        match device_id {
            DEVICE_SYSTEM => MessageCategory::System,
            DEVICE_CAN => MessageCategory::Can,
            DEVICE_AVC => MessageCategory::BusA,
            id if id >= DEVICE_SATELLITE_BASE => MessageCategory::Satellite,
            _ => MessageCategory::Unknown,
        }
    }
}

/// One frame received from any input source.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RawMessage {
    pub device_id: u32,
    /// Seconds (gateway `ts` is milliseconds)
    pub timestamp: f64,
    /// Protocol-specific payload, always a JSON object
    pub payload: Value,
    pub sequence: Option<u64>,
    pub category: MessageCategory,
}

impl RawMessage {
    pub fn new(device_id: u32, timestamp: f64, payload: Value) -> Self {
        Self {
            device_id,
            timestamp,
            payload,
            sequence: None,
            category: MessageCategory::from_device_id(device_id),
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Build a message from a parsed gateway frame.
    ///
    /// Missing `id` means the system device; a non-object `d` is wrapped as
    /// `{"raw": d}`; a missing `ts` means "now".
    pub fn from_gateway_json(raw: &Value) -> Self {
        let device_id = raw
            .get("id")
            .and_then(Value::as_u64)
            .and_then(|id| u32::try_from(id).ok())
            .unwrap_or(DEVICE_SYSTEM);

        let payload = match raw.get("d") {
            Some(d) if d.is_object() => d.clone(),
            Some(d) => json!({ "raw": d }),
            None => json!({}),
        };

        let timestamp = raw
            .get("ts")
            .and_then(Value::as_f64)
            .map(|ms| ms / 1000.0)
            .unwrap_or_else(now_secs);

        let mut msg = RawMessage::new(device_id, timestamp, payload);
        msg.sequence = raw.get("seq").and_then(Value::as_u64);
        msg
    }

    /// Parse one NDJSON line.
    pub fn from_line(line: &str) -> Result<Self, IoError> {
        let value: Value = serde_json::from_str(line.trim())?;
        if !value.is_object() {
            return Err(IoError::protocol("wire", "frame is not a JSON object"));
        }
        Ok(Self::from_gateway_json(&value))
    }
}

/// A command headed for hardware through an output port.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutgoingCommand {
    pub device_id: u32,
    pub command_type: String,
    pub payload: Value,
    /// Higher priority is sent first
    pub priority: i32,
    pub timestamp: f64,
}

impl OutgoingCommand {
    pub fn new(device_id: u32, command_type: impl Into<String>, payload: Value) -> Self {
        Self {
            device_id,
            command_type: command_type.into(),
            payload,
            priority: 0,
            timestamp: now_secs(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Gateway wire form: `{"id": N, "cmd": "...", "d": {...}}`
    pub fn to_gateway_json(&self) -> Value {
        json!({
            "id": self.device_id,
            "cmd": self.command_type,
            "d": self.payload,
        })
    }
}

// ============================================================================
// Port Traits
// ============================================================================

/// A source of `RawMessage`s. `poll` never blocks.
pub trait InputPort {
    /// Open the source. Returns false when it cannot be started.
    fn start(&mut self) -> bool;

    /// Close the source. Safe to call more than once.
    fn stop(&mut self);

    /// Next available message, or `None` when nothing is ready.
    fn poll(&mut self) -> Option<RawMessage>;

    fn is_connected(&self) -> bool;

    fn name(&self) -> String {
        "InputPort".to_string()
    }
}

/// A sink for `OutgoingCommand`s.
pub trait OutputPort {
    /// Queue or send a command. Returns false on failure.
    fn send(&mut self, command: &OutgoingCommand) -> bool;

    fn is_connected(&self) -> bool;

    fn name(&self) -> String {
        "OutputPort".to_string()
    }
}

// A shared port can be handed to ingress and egress at the same time.
impl<P: InputPort + ?Sized> InputPort for Rc<RefCell<P>> {
    fn start(&mut self) -> bool {
        self.borrow_mut().start()
    }

    fn stop(&mut self) {
        self.borrow_mut().stop()
    }

    fn poll(&mut self) -> Option<RawMessage> {
        self.borrow_mut().poll()
    }

    fn is_connected(&self) -> bool {
        self.borrow().is_connected()
    }

    fn name(&self) -> String {
        self.borrow().name()
    }
}

impl<P: OutputPort + ?Sized> OutputPort for Rc<RefCell<P>> {
    fn send(&mut self, command: &OutgoingCommand) -> bool {
        self.borrow_mut().send(command)
    }

    fn is_connected(&self) -> bool {
        self.borrow().is_connected()
    }

    fn name(&self) -> String {
        self.borrow().name()
    }
}

impl<P: InputPort + ?Sized> InputPort for Box<P> {
    fn start(&mut self) -> bool {
        (**self).start()
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn poll(&mut self) -> Option<RawMessage> {
        (**self).poll()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

impl<P: OutputPort + ?Sized> OutputPort for Box<P> {
    fn send(&mut self, command: &OutgoingCommand) -> bool {
        (**self).send(command)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

// ============================================================================
// Tests
// ============================================================================
