// src/lib.rs
//
// Vehicle data plane for the cyberdeck head unit.
//
// Gateway frames (bus-A and CAN) are decoded into actions, reduced into an
// immutable application state, evaluated by rules, and turned back into
// bus-A and satellite commands.

#[macro_use]
pub mod logging;

pub mod config;
pub mod io;
pub mod rules;
pub mod settings;
pub mod state;
pub mod twin;

pub use config::{ConfigError, ExecutionMode, TwinConfig};
pub use twin::{create_virtual_twin, VirtualTwin};
