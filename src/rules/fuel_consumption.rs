// src/rules/fuel_consumption.rs
//
// Instant consumption from fuel flow and speed: L/100km while moving,
// L/h when (nearly) stationary.

use super::{RulePriority, StateRule};
use crate::state::{
    Action, ActionKind, AppState, ConsumptionUnit, Dispatcher, SliceSet, StateSlice, VehicleState,
};

/// Flow above this (L/h) counts as consuming.
pub const CONSUMING_FLOW_LH: f64 = 0.05;
/// Above this speed consumption is reported per distance.
pub const MOVING_SPEED_KMH: f64 = 5.0;
pub const MAX_L_PER_100KM: f64 = 99.9;
/// Smaller changes are not worth a dispatch.
const CHANGE_EPSILON: f64 = 0.01;

#[derive(Debug, Default)]
pub struct FuelConsumptionRule;

impl FuelConsumptionRule {
    pub fn compute(vehicle: &VehicleState) -> (f64, ConsumptionUnit) {
        let flow = vehicle.fuel_flow_rate;
        let speed = vehicle.speed_kmh;
        let moving = speed > MOVING_SPEED_KMH;
        let unit = if moving {
            ConsumptionUnit::LitersPer100Km
        } else {
            ConsumptionUnit::LitersPerHour
        };

        if flow <= CONSUMING_FLOW_LH || !vehicle.ice_running {
            return (0.0, unit);
        }
        if moving {
            ((flow / speed * 100.0).min(MAX_L_PER_100KM), unit)
        } else {
            (flow, unit)
        }
    }
}

impl StateRule for FuelConsumptionRule {
    fn name(&self) -> &str {
        "FuelConsumptionRule"
    }

    fn watches(&self) -> SliceSet {
        StateSlice::set(&[StateSlice::Vehicle])
    }

    fn priority(&self) -> RulePriority {
        RulePriority::Normal
    }

    fn evaluate(&mut self, _old: Option<&AppState>, new: &AppState, dispatcher: &mut Dispatcher) -> Result<(), String> {
        let vehicle = &new.vehicle;
        let (value, unit) = Self::compute(vehicle);

        if (vehicle.instant_consumption - value).abs() > CHANGE_EPSILON || vehicle.consumption_unit != unit {
            dispatcher.dispatch(Action::internal(ActionKind::SetInstantConsumption { value, unit }));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle(flow: f64, speed: f64, ice: bool) -> VehicleState {
        VehicleState {
            fuel_flow_rate: flow,
            speed_kmh: speed,
            ice_running: ice,
            ..VehicleState::default()
        }
    }

    #[test]
    fn test_per_distance_when_moving() {
        let (v, unit) = FuelConsumptionRule::compute(&vehicle(3.0, 60.0, true));
        assert!((v - 5.0).abs() < 1e-9);
        assert_eq!(unit, ConsumptionUnit::LitersPer100Km);
    }

    #[test]
    fn test_per_hour_when_stationary() {
        let (v, unit) = FuelConsumptionRule::compute(&vehicle(1.2, 2.0, true));
        assert_eq!(v, 1.2);
        assert_eq!(unit, ConsumptionUnit::LitersPerHour);
    }

    #[test]
    fn test_capped_and_idle_cases() {
        let (v, _) = FuelConsumptionRule::compute(&vehicle(20.0, 6.0, true));
        assert_eq!(v, MAX_L_PER_100KM);

        // Engine off or negligible flow reports zero in the speed's unit
        assert_eq!(
            FuelConsumptionRule::compute(&vehicle(3.0, 60.0, false)),
            (0.0, ConsumptionUnit::LitersPer100Km)
        );
        assert_eq!(
            FuelConsumptionRule::compute(&vehicle(0.01, 0.0, true)),
            (0.0, ConsumptionUnit::LitersPerHour)
        );
    }

    #[test]
    fn test_dispatch_only_on_meaningful_change() {
        let mut rule = FuelConsumptionRule;
        let state = AppState::default();
        let mut dispatcher = Dispatcher::default();
        // Default state already holds 0 L/h
        rule.evaluate(None, &state, &mut dispatcher).unwrap();
        assert_eq!(dispatcher.pending(), 0);

        let mut moving = state.clone();
        moving.vehicle = std::sync::Arc::new(vehicle(3.0, 60.0, true));
        rule.evaluate(None, &moving, &mut dispatcher).unwrap();
        assert_eq!(dispatcher.pending(), 1);
    }
}
