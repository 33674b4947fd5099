// src/io/avc/mod.rs
//
// Bus-A (IEBus-derived audio/climate/display control bus) support.
//
// - codec.rs: gateway payload -> AvcMessage, climate status extraction
// - classify.rs: address-pair classification, device and button names
// - events.rs: button, touch and audio parameter parsers
// - commands.rs: typed command encoders and their decode mirror
// - queue.rs: priority-ordered, rate-limited outgoing command queue

pub mod classify;
pub mod codec;
pub mod commands;
pub mod events;
pub mod queue;

pub use classify::{classify_message, device_name, MessageClass};
pub use codec::{decode_message, AvcDecoder, AvcMessage, AvcMessageType};
pub use commands::{decode_command, AvcCommand, CommandIntent};
pub use events::{
    parse_audio_status, parse_button_event, parse_climate_state, parse_touch_event,
    parse_volume_status, AudioParam, AudioParamStatus, ButtonEvent, ClimateStateFrame,
    TouchConfidence, TouchEvent, TouchKind,
};
pub use queue::CommandQueue;
