// src/twin/mod.rs
//
// The virtual twin: ports, store and rules wired into one data plane.
//
//   InputPort -> IngressController -> Store -> RulesEngine
//                                        |
//                                        +-> EgressController -> OutputPort
//
// - ingress.rs: frame decoding and action mapping
// - egress.rs: UI actions and output handlers to commands
// - vfd_output.rs: VFD satellite output handlers
// - factory.rs: `create_virtual_twin` per execution mode

pub mod egress;
pub mod factory;
pub mod ingress;
pub mod vfd_output;

pub use egress::{action_to_command, satellite_output_handler, EgressController, EgressStats, OutputHandler};
pub use factory::{create_virtual_twin, TestPorts, VirtualTwin};
pub use ingress::{IngressController, IngressStats};
pub use vfd_output::{register_vfd_handlers, vfd_handlers};
