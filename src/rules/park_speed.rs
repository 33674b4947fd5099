// src/rules/park_speed.rs

use super::{RulePriority, StateRule};
use crate::state::{Action, ActionKind, AppState, Dispatcher, GearPosition, SliceSet, StateSlice};

/// Speed is forced to exactly zero while the gear is in Park.
#[derive(Debug, Default)]
pub struct ParkSpeedRule;

impl StateRule for ParkSpeedRule {
    fn name(&self) -> &str {
        "ParkSpeedRule"
    }

    fn watches(&self) -> SliceSet {
        StateSlice::set(&[StateSlice::Vehicle])
    }

    fn priority(&self) -> RulePriority {
        RulePriority::High
    }

    fn evaluate(&mut self, _old: Option<&AppState>, new: &AppState, dispatcher: &mut Dispatcher) -> Result<(), String> {
        if new.vehicle.gear == GearPosition::Park && new.vehicle.speed_kmh != 0.0 {
            dispatcher.dispatch(Action::internal(ActionKind::SetSpeed(0.0)));
        }
        Ok(())
    }
}
