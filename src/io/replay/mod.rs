// src/io/replay/mod.rs
//
// Playback of recorded gateway sessions.

mod control;
mod file;

pub use control::{PlaybackControl, PlaybackState};
pub use file::{FileReplayPort, LogEntry};
