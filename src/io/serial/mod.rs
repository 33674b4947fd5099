// src/io/serial/mod.rs
//
// Serial link to the bus gateway.
//
// - framer.rs: newline framing of the NDJSON byte stream
// - transport.rs: reader/writer threads behind InputPort + OutputPort
// - utils.rs: link settings and serialport conversions

pub mod framer;
pub mod transport;
pub mod utils;

pub use framer::{LineFrame, LineFramer};
pub use transport::{SerialStats, SerialTransport};
pub use utils::{Parity, SerialSettings};
