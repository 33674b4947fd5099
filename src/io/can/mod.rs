// src/io/can/mod.rs
//
// Powertrain CAN support. Only the decoder lives here; nothing is ever
// transmitted on this bus.

pub mod codec;

pub use codec::{decode_gear, CanDecoder, CanMessage, CanMessageType, GEAR_UNKNOWN};
