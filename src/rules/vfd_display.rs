// src/rules/vfd_display.rs
//
// Computes the VFD satellite slice from vehicle, energy and display state.
//
// Values are normalized to the ranges the satellite draws with:
//   mg_power   -1.0..=1.0  (battery power over +-30 kW)
//   fuel_flow   0.0..=1.0  (over 8 L/h)
//   brake       0.0..=1.0  (over 127)
//   speed       0.0..=1.0  (over 120 km/h)
//
// Energy fields refresh at 20 Hz, state flags on change or at 1 Hz and config
// on a time-base change. The egress output handlers decide what is actually
// worth sending.

use super::{RulePriority, StateRule};
use crate::io::now_secs;
use crate::state::{
    Action, ActionKind, AppState, Dispatcher, FuelType, GearPosition, SliceSet, StateSlice,
    VfdSatelliteUpdate,
};

pub const ENERGY_UPDATE_INTERVAL: f64 = 0.05;
pub const STATE_UPDATE_INTERVAL: f64 = 1.0;

pub const MAX_MG_POWER_KW: f64 = 30.0;
pub const MAX_SPEED_KMH: f64 = 120.0;
pub const MAX_FUEL_FLOW_LH: f64 = 8.0;
pub const MAX_BRAKE_PRESSURE: f64 = 127.0;

pub fn normalize_mg_power(kw: f64) -> f64 {
    (kw / MAX_MG_POWER_KW).clamp(-1.0, 1.0)
}

pub fn normalize_fuel_flow(lh: f64) -> f64 {
    (lh / MAX_FUEL_FLOW_LH).clamp(0.0, 1.0)
}

pub fn normalize_brake(pressure: u8) -> f64 {
    (f64::from(pressure) / MAX_BRAKE_PRESSURE).clamp(0.0, 1.0)
}

pub fn normalize_speed(kmh: f64) -> f64 {
    (kmh / MAX_SPEED_KMH).clamp(0.0, 1.0)
}

type Clock = Box<dyn FnMut() -> f64>;

pub struct VfdDisplayRule {
    clock: Clock,
    last_energy_time: f64,
    last_state_time: f64,
    last_flags: Option<(FuelType, GearPosition, bool)>,
}

impl Default for VfdDisplayRule {
    fn default() -> Self {
        Self::new()
    }
}

impl VfdDisplayRule {
    pub fn new() -> Self {
        Self::with_clock(now_secs)
    }

    /// Use a custom time source (seconds).
    pub fn with_clock(clock: impl FnMut() -> f64 + 'static) -> Self {
        Self {
            clock: Box::new(clock),
            last_energy_time: f64::NEG_INFINITY,
            last_state_time: f64::NEG_INFINITY,
            last_flags: None,
        }
    }

    /// The update due at `now`, if any.
    fn build_update(&mut self, old: Option<&AppState>, new: &AppState, now: f64) -> VfdSatelliteUpdate {
        let vehicle = &new.vehicle;
        let energy = &new.energy;
        let mut update = VfdSatelliteUpdate::default();

        if now - self.last_energy_time >= ENERGY_UPDATE_INTERVAL {
            update.mg_power = Some(normalize_mg_power(energy.battery_power_kw().unwrap_or(0.0)));
            update.fuel_flow = Some(normalize_fuel_flow(vehicle.fuel_flow_rate));
            update.brake = Some(normalize_brake(vehicle.brake_pressed));
            update.speed = Some(normalize_speed(vehicle.speed_kmh));
            update.battery_soc = Some(energy.battery_soc);
            update.petrol_level = Some(vehicle.fuel_level);
            update.lpg_level = Some(vehicle.lpg_level);
            update.ice_running = Some(vehicle.ice_running);
            update.last_energy_send_time = Some(now);
            self.last_energy_time = now;
        }

        let flags = (vehicle.active_fuel, vehicle.gear, vehicle.ready_mode);
        let flags_changed = self.last_flags != Some(flags);
        if flags_changed || now - self.last_state_time >= STATE_UPDATE_INTERVAL {
            update.active_fuel = Some(flags.0);
            update.gear = Some(flags.1);
            update.ready_mode = Some(flags.2);
            update.last_state_send_time = Some(now);
            self.last_state_time = now;
            self.last_flags = Some(flags);
        }

        let time_base = new.display.power_chart_time_base;
        if old.is_some_and(|o| o.display.power_chart_time_base != time_base) {
            update.time_base = Some(time_base);
        }

        update
    }
}

impl StateRule for VfdDisplayRule {
    fn name(&self) -> &str {
        "VfdDisplayRule"
    }

    fn watches(&self) -> SliceSet {
        StateSlice::set(&[StateSlice::Vehicle, StateSlice::Energy, StateSlice::Display])
    }

    fn priority(&self) -> RulePriority {
        RulePriority::Low
    }

    fn evaluate(&mut self, old: Option<&AppState>, new: &AppState, dispatcher: &mut Dispatcher) -> Result<(), String> {
        let now = (self.clock)();
        let update = self.build_update(old, new, now);
        if !update.is_empty() {
            dispatcher.dispatch(Action::internal(ActionKind::UpdateVfdSatellite(update)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DisplayState;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::Arc;

    fn rule_at(time: Rc<Cell<f64>>) -> VfdDisplayRule {
        VfdDisplayRule::with_clock(move || time.get())
    }

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_mg_power(60.0), 1.0);
        assert_eq!(normalize_mg_power(-15.0), -0.5);
        assert_eq!(normalize_fuel_flow(4.0), 0.5);
        assert_eq!(normalize_fuel_flow(-1.0), 0.0);
        assert_eq!(normalize_brake(254), 1.0);
        assert_eq!(normalize_speed(60.0), 0.5);
    }

    #[test]
    fn test_first_evaluation_sends_everything_but_config() {
        let clock = Rc::new(Cell::new(100.0));
        let mut rule = rule_at(clock.clone());
        let u = rule.build_update(None, &AppState::default(), clock.get());
        assert_eq!(u.battery_soc, Some(0.6));
        assert_eq!(u.gear, Some(GearPosition::Park));
        assert_eq!(u.last_energy_send_time, Some(100.0));
        assert_eq!(u.time_base, None);
    }

    #[test]
    fn test_energy_rate_limit() {
        let clock = Rc::new(Cell::new(10.0));
        let mut rule = rule_at(clock.clone());
        let state = AppState::default();
        rule.build_update(None, &state, 10.0);

        // 20 ms later: energy not due, flags unchanged, state not due
        let u = rule.build_update(Some(&state), &state, 10.02);
        assert!(u.is_empty());

        let u = rule.build_update(Some(&state), &state, 10.06);
        assert!(u.mg_power.is_some());
        assert!(u.gear.is_none());

        let u = rule.build_update(Some(&state), &state, 11.1);
        assert!(u.gear.is_some());
    }

    #[test]
    fn test_flag_change_and_config() {
        let mut rule = VfdDisplayRule::with_clock(|| 0.0);
        let state = AppState::default();
        rule.build_update(None, &state, 5.0);

        let mut changed = state.clone();
        changed.vehicle = Arc::new(crate::state::VehicleState {
            gear: GearPosition::Drive,
            ..(*state.vehicle).clone()
        });
        changed.display = Arc::new(DisplayState {
            power_chart_time_base: 300,
        });
        let u = rule.build_update(Some(&state), &changed, 5.01);
        assert_eq!(u.gear, Some(GearPosition::Drive));
        assert_eq!(u.time_base, Some(300));
        assert!(u.mg_power.is_none());
    }

    #[test]
    fn test_evaluate_updates_satellite_slice() {
        let mut engine = crate::rules::RulesEngine::default();
        engine.register(VfdDisplayRule::with_clock(|| 42.0));
        let mut store = crate::state::Store::default();
        store.subscribe(StateSlice::All, Rc::new(std::cell::RefCell::new(engine)));

        store.dispatch(Action::gateway(ActionKind::SetSpeed(60.0)));
        let vfd = &store.state().vfd_satellite;
        assert_eq!(vfd.speed, 0.5);
        assert_eq!(vfd.last_energy_send_time, 42.0);
        assert_eq!(vfd.last_state_send_time, 42.0);
    }
}
