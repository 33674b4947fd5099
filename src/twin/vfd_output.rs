// src/twin/vfd_output.rs
//
// Output handlers feeding the VFD satellite (device 110) from the computed
// `vfd_satellite` slice.
//
// Three message kinds share the device:
//   E  energy   {"t":"E","mg","fl","br","spd","soc","ptr","lpg","ice"}
//   S  state    {"t":"S","fuel","gear","rdy"}
//   C  config   {"t":"C","tb","bri"}

use serde_json::{json, Value};

use super::egress::{EgressController, OutputHandler};
use crate::io::{OutgoingCommand, DEVICE_VFD};
use crate::state::{AppState, StateSlice, VfdSatelliteState};

/// Energy fields closer than this are considered unchanged.
pub const ENERGY_THRESHOLD: f64 = 0.001;

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

pub fn energy_payload(vfd: &VfdSatelliteState) -> Value {
    json!({
        "t": "E",
        "mg": round3(vfd.mg_power),
        "fl": round3(vfd.fuel_flow),
        "br": round3(vfd.brake),
        "spd": round3(vfd.speed),
        "soc": round3(vfd.battery_soc),
        "ptr": vfd.petrol_level,
        "lpg": vfd.lpg_level,
        "ice": vfd.ice_running,
    })
}

pub fn state_payload(vfd: &VfdSatelliteState) -> Value {
    json!({
        "t": "S",
        "fuel": vfd.active_fuel.vfd_code(),
        "gear": vfd.gear.as_str(),
        "rdy": vfd.ready_mode,
    })
}

pub fn config_payload(vfd: &VfdSatelliteState) -> Value {
    json!({
        "t": "C",
        "tb": vfd.time_base,
        "bri": vfd.brightness,
    })
}

pub fn energy_changed(old: &VfdSatelliteState, new: &VfdSatelliteState) -> bool {
    let moved = |a: f64, b: f64| (a - b).abs() > ENERGY_THRESHOLD;
    moved(old.mg_power, new.mg_power)
        || moved(old.fuel_flow, new.fuel_flow)
        || moved(old.brake, new.brake)
        || moved(old.speed, new.speed)
        || moved(old.battery_soc, new.battery_soc)
        || old.petrol_level != new.petrol_level
        || old.lpg_level != new.lpg_level
}

pub fn state_flags_changed(old: &VfdSatelliteState, new: &VfdSatelliteState) -> bool {
    old.ice_running != new.ice_running
        || old.gear != new.gear
        || old.active_fuel != new.active_fuel
        || old.ready_mode != new.ready_mode
}

pub fn config_changed(old: &VfdSatelliteState, new: &VfdSatelliteState) -> bool {
    old.time_base != new.time_base || old.brightness != new.brightness
}

fn vfd_handler(
    name: &str,
    command_type: &'static str,
    changed: fn(&VfdSatelliteState, &VfdSatelliteState) -> bool,
    payload: fn(&VfdSatelliteState) -> Value,
) -> OutputHandler {
    OutputHandler::new(
        name,
        StateSlice::set(&[StateSlice::VfdSatellite]),
        move |old: Option<&AppState>, new: &AppState| match old {
            Some(old) => changed(&old.vfd_satellite, &new.vfd_satellite),
            None => true,
        },
        move |state: &AppState| Ok(OutgoingCommand::new(DEVICE_VFD, command_type, payload(&state.vfd_satellite))),
    )
}

pub fn vfd_handlers() -> Vec<OutputHandler> {
    vec![
        vfd_handler("vfd_energy", "energy", energy_changed, energy_payload),
        vfd_handler("vfd_state", "state", state_flags_changed, state_payload),
        vfd_handler("vfd_config", "config", config_changed, config_payload),
    ]
}

pub fn register_vfd_handlers(egress: &EgressController) {
    for handler in vfd_handlers() {
        egress.register_output_handler(handler);
    }
}
