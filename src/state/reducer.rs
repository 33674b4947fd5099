// src/state/reducer.rs
//
// Pure reducer: (state, action) -> (new state, affected slices).
//
// `target_slice` names the slice for every action kind with no wildcard arm,
// so adding an action without deciding where it lands fails to compile. Each
// slice then has its own reducer that only sees the kinds routed to it.

use std::sync::Arc;

use super::actions::{Action, ActionKind, VfdSatelliteUpdate};
use super::app_state::{
    clamp_balance, clamp_fan_speed, clamp_target_temp, clamp_tone, clamp_volume, AppState, AudioState,
    ClimateState, ConnectionState, DisplayState, EnergyState, GearPosition, InputState, VehicleState,
    VfdSatelliteState, AIR_DEFROST, DEBUG_110_490_LEN, DEBUG_A00_258_LEN, RECENT_BUTTONS, TIME_BASE_OPTIONS,
};
use super::{SliceSet, StateSlice};

/// Apply an action. Batches are reduced in order with their slices unioned.
pub fn reduce(state: &AppState, action: &Action) -> (AppState, SliceSet) {
    let mut next = state.clone();
    let mut affected = SliceSet::new();
    apply(&mut next, action, &mut affected);
    (next, affected)
}

fn apply(state: &mut AppState, action: &Action, affected: &mut SliceSet) {
    let kind = &action.kind;
    let Some(slice) = target_slice(kind) else {
        if let ActionKind::Batch(actions) = kind {
            for sub in actions {
                apply(state, sub, affected);
            }
        }
        return;
    };

    match slice {
        StateSlice::Audio => state.audio = Arc::new(reduce_audio(&state.audio, kind)),
        StateSlice::Climate => state.climate = Arc::new(reduce_climate(&state.climate, kind)),
        StateSlice::Vehicle => state.vehicle = Arc::new(reduce_vehicle(&state.vehicle, kind)),
        StateSlice::Energy => state.energy = Arc::new(reduce_energy(&state.energy, kind)),
        StateSlice::Connection => {
            state.connection = Arc::new(reduce_connection(&state.connection, kind))
        }
        StateSlice::Input => {
            let input = reduce_input(&state.input, kind);
            // Debug bytes for other address pairs are a no-op
            if input == *state.input {
                return;
            }
            state.input = Arc::new(input);
        }
        StateSlice::Display => match kind {
            ActionKind::SetScreenBrightness(b) => state.screen_brightness = (*b).min(100),
            ActionKind::SetAmbientColor(c) => state.ambient = c.clamped(),
            _ => state.display = Arc::new(reduce_display(&state.display, kind)),
        },
        StateSlice::VfdSatellite => {
            state.vfd_satellite = Arc::new(reduce_vfd(&state.vfd_satellite, kind))
        }
        StateSlice::All => return,
    }
    affected.insert(slice);
}

/// Slice an action lands in. `None` only for batches.
fn target_slice(kind: &ActionKind) -> Option<StateSlice> {
    use ActionKind::*;
    let slice = match kind {
        SetVolume(_) | SetBass(_) | SetMid(_) | SetTreble(_) | SetBalance(_) | SetFader(_)
        | SetMute(_) | SetAudioSource(_) => StateSlice::Audio,

        SetTargetTemp(_) | SetFanSpeed(_) | SetAc(_) | SetAutoMode(_) | SetRecirculation(_)
        | SetAirDirection(_) | SetDefrost(_) | SetInsideTemp(_) | SetOutsideTemp(_) => StateSlice::Climate,

        SetReadyMode(_) | SetParkMode(_) | SetGear(_) | SetSpeed(_) | SetIceRunning(_) | SetEvMode(_)
        | SetRpm(_) | SetIceCoolantTemp(_) | SetInverterTemp(_) | SetThrottlePosition(_)
        | SetBrakePressed(_) | SetFuelLevel(_) | SetLpgLevel(_) | SetActiveFuel(_) | SetFuelFlow(_)
        | SetInstantConsumption { .. } => StateSlice::Vehicle,

        SetBatterySoc(_) | SetChargingState { .. } | SetPowerFlow { .. } | SetEnergyFlowFlags(_)
        | SetRegenState(_) | SetBatteryVoltage(_) | SetBatteryCurrent(_) | SetBatteryTemp(_)
        | SetBatteryMaxTemp(_) | SetBatteryDeltaSoc(_) => StateSlice::Energy,

        SetConnectionState { .. } | GatewayDisconnected => StateSlice::Connection,

        AvcButtonPress(_) | AvcTouchEvent(_) | AvcDebugBytes { .. } => StateSlice::Input,

        SetScreenBrightness(_) | SetAmbientColor(_) | SetPowerChartTimeBase(_) => StateSlice::Display,

        UpdateVfdSatellite(_) => StateSlice::VfdSatellite,

        Batch(_) => return None,
    };
    Some(slice)
}

// ============================================================================
// Slice reducers
// ============================================================================

fn reduce_audio(audio: &AudioState, kind: &ActionKind) -> AudioState {
    let mut a = audio.clone();
    match kind {
        ActionKind::SetVolume(v) => a.volume = clamp_volume(*v),
        ActionKind::SetBass(v) => a.bass = clamp_tone(*v),
        ActionKind::SetMid(v) => a.mid = clamp_tone(*v),
        ActionKind::SetTreble(v) => a.treble = clamp_tone(*v),
        ActionKind::SetBalance(v) => a.balance = clamp_balance(*v),
        ActionKind::SetFader(v) => a.fader = clamp_balance(*v),
        ActionKind::SetMute(m) => a.muted = *m,
        ActionKind::SetAudioSource(s) => a.source = *s,
        _ => {}
    }
    a
}

fn reduce_climate(climate: &ClimateState, kind: &ActionKind) -> ClimateState {
    let mut c = climate.clone();
    match kind {
        ActionKind::SetTargetTemp(t) => c.target_temp = clamp_target_temp(*t),
        ActionKind::SetFanSpeed(s) => c.fan_speed = clamp_fan_speed(*s),
        ActionKind::SetAc(on) => c.ac_on = *on,
        ActionKind::SetAutoMode(on) => c.auto_mode = *on,
        ActionKind::SetRecirculation(on) => c.recirculation = *on,
        ActionKind::SetAirDirection(d) => {
            c.air_direction = (*d).min(AIR_DEFROST);
            c.defrost = c.air_direction == AIR_DEFROST;
        }
        ActionKind::SetDefrost(on) => c.defrost = *on,
        ActionKind::SetInsideTemp(t) => c.inside_temp = Some(*t),
        ActionKind::SetOutsideTemp(t) => c.outside_temp = Some(*t),
        _ => {}
    }
    c
}

fn reduce_vehicle(vehicle: &VehicleState, kind: &ActionKind) -> VehicleState {
    let mut v = vehicle.clone();
    match kind {
        ActionKind::SetReadyMode(r) => v.ready_mode = *r,
        ActionKind::SetParkMode(parked) => {
            v.gear = if *parked {
                GearPosition::Park
            } else {
                GearPosition::Drive
            }
        }
        ActionKind::SetGear(g) => v.gear = *g,
        ActionKind::SetSpeed(s) => v.speed_kmh = *s,
        ActionKind::SetIceRunning(r) => v.ice_running = *r,
        ActionKind::SetEvMode(e) => v.ev_mode = *e,
        ActionKind::SetRpm(r) => v.rpm = *r,
        ActionKind::SetIceCoolantTemp(t) => v.ice_coolant_temp = Some(*t),
        ActionKind::SetInverterTemp(t) => v.inverter_temp = Some(*t),
        ActionKind::SetThrottlePosition(p) => v.throttle_position = *p,
        ActionKind::SetBrakePressed(p) => v.brake_pressed = *p,
        ActionKind::SetFuelLevel(l) => v.fuel_level = *l,
        ActionKind::SetLpgLevel(l) => v.lpg_level = *l,
        ActionKind::SetActiveFuel(f) => v.active_fuel = *f,
        ActionKind::SetFuelFlow(f) => v.fuel_flow_rate = *f,
        ActionKind::SetInstantConsumption { value, unit } => {
            v.instant_consumption = *value;
            v.consumption_unit = *unit;
        }
        _ => {}
    }
    v
}

fn reduce_energy(energy: &EnergyState, kind: &ActionKind) -> EnergyState {
    let mut e = energy.clone();
    match kind {
        ActionKind::SetBatterySoc(soc) => e.battery_soc = soc.clamp(0.0, 1.0),
        ActionKind::SetChargingState {
            charging,
            discharging,
        } => {
            e.charging = *charging;
            e.discharging = *discharging;
        }
        ActionKind::SetPowerFlow {
            motor_kw,
            generator_kw,
            ice_kw,
        } => {
            e.motor_power_kw = *motor_kw;
            e.generator_power_kw = *generator_kw;
            e.ice_power_kw = *ice_kw;
        }
        ActionKind::SetEnergyFlowFlags(flags) => e.flow = *flags,
        ActionKind::SetRegenState(r) => e.regen_active = *r,
        ActionKind::SetBatteryVoltage(v) => e.hv_battery_voltage = Some(*v),
        ActionKind::SetBatteryCurrent(i) => e.hv_battery_current = Some(*i),
        ActionKind::SetBatteryTemp(t) => e.battery_temp = Some(*t),
        ActionKind::SetBatteryMaxTemp(t) => e.battery_max_cell_temp = Some(*t),
        ActionKind::SetBatteryDeltaSoc(d) => e.battery_delta_soc = Some(*d),
        _ => {}
    }
    e
}

fn reduce_connection(connection: &ConnectionState, kind: &ActionKind) -> ConnectionState {
    let mut c = connection.clone();
    match kind {
        ActionKind::SetConnectionState {
            connected,
            gateway_version,
        } => {
            c.connected = *connected;
            if gateway_version.is_some() {
                c.gateway_version = gateway_version.clone();
            }
        }
        ActionKind::GatewayDisconnected => c.connected = false,
        _ => {}
    }
    c
}

fn reduce_input(input: &InputState, kind: &ActionKind) -> InputState {
    let mut i = input.clone();
    match kind {
        ActionKind::AvcButtonPress(b) => {
            i.last_button_code = b.code;
            i.last_button_name = b.name.clone();
            i.last_button_time = b.timestamp;
            i.button_press_count += 1;
            i.recent_buttons.insert(0, b.code);
            i.recent_buttons.truncate(RECENT_BUTTONS);
        }
        ActionKind::AvcTouchEvent(t) => {
            i.last_touch_x = t.x;
            i.last_touch_y = t.y;
            i.last_touch_type = t.kind.clone();
            i.last_touch_time = t.timestamp;
            i.touch_event_count += 1;
        }
        ActionKind::AvcDebugBytes {
            master,
            slave,
            data,
        } => match (*master, *slave) {
            (0x110, 0x490) => i.avc_110_490_bytes = window::<DEBUG_110_490_LEN>(data),
            (0xA00, 0x258) => i.avc_a00_258_bytes = window::<DEBUG_A00_258_LEN>(data),
            _ => {}
        },
        _ => {}
    }
    i
}

/// First N bytes, zero-padded.
fn window<const N: usize>(data: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let n = data.len().min(N);
    out[..n].copy_from_slice(&data[..n]);
    out
}

fn reduce_display(display: &DisplayState, kind: &ActionKind) -> DisplayState {
    let mut d = display.clone();
    if let ActionKind::SetPowerChartTimeBase(secs) = kind {
        if TIME_BASE_OPTIONS.contains(secs) {
            d.power_chart_time_base = *secs;
        }
    }
    d
}

fn reduce_vfd(vfd: &VfdSatelliteState, kind: &ActionKind) -> VfdSatelliteState {
    let mut v = vfd.clone();
    if let ActionKind::UpdateVfdSatellite(u) = kind {
        apply_vfd_update(&mut v, u);
    }
    v
}

fn apply_vfd_update(v: &mut VfdSatelliteState, u: &VfdSatelliteUpdate) {
    fn set<T: Copy>(slot: &mut T, value: Option<T>) {
        if let Some(value) = value {
            *slot = value;
        }
    }
    set(&mut v.mg_power, u.mg_power);
    set(&mut v.fuel_flow, u.fuel_flow);
    set(&mut v.brake, u.brake);
    set(&mut v.speed, u.speed);
    set(&mut v.battery_soc, u.battery_soc);
    set(&mut v.petrol_level, u.petrol_level);
    set(&mut v.lpg_level, u.lpg_level);
    set(&mut v.ice_running, u.ice_running);
    set(&mut v.active_fuel, u.active_fuel);
    set(&mut v.gear, u.gear);
    set(&mut v.ready_mode, u.ready_mode);
    set(&mut v.time_base, u.time_base);
    set(&mut v.brightness, u.brightness);
    set(&mut v.last_energy_send_time, u.last_energy_send_time);
    set(&mut v.last_state_send_time, u.last_state_send_time);
}

// ============================================================================
// Tests
// ============================================================================
