// src/rules/active_fuel.rs
//
// Which fuel the engine is burning.
//
//   engine stopped              -> Off
//   engine just started         -> Petrol (and the LPG signal is cleared)
//   running, LPG signal set     -> Lpg
//   running otherwise           -> Petrol
//
// The LPG signal comes from outside the vehicle state (the LPG controller's
// own satellite), so it is shared through an `LpgSignal` handle.

use std::cell::Cell;
use std::rc::Rc;

use super::{RulePriority, StateRule};
use crate::state::{Action, ActionKind, AppState, Dispatcher, FuelType, SliceSet, StateSlice};

/// Shared flag raised when the LPG system reports it is active.
#[derive(Clone, Debug, Default)]
pub struct LpgSignal(Rc<Cell<bool>>);

impl LpgSignal {
    pub fn set(&self, active: bool) {
        self.0.set(active);
    }

    pub fn get(&self) -> bool {
        self.0.get()
    }
}

#[derive(Debug, Default)]
pub struct ActiveFuelRule {
    lpg: LpgSignal,
}

impl ActiveFuelRule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for whoever receives LPG controller messages.
    pub fn signal(&self) -> LpgSignal {
        self.lpg.clone()
    }
}

impl StateRule for ActiveFuelRule {
    fn name(&self) -> &str {
        "ActiveFuelRule"
    }

    fn watches(&self) -> SliceSet {
        StateSlice::set(&[StateSlice::Vehicle])
    }

    fn priority(&self) -> RulePriority {
        RulePriority::Normal
    }

    fn evaluate(&mut self, old: Option<&AppState>, new: &AppState, dispatcher: &mut Dispatcher) -> Result<(), String> {
        let running = new.vehicle.ice_running;
        let just_started = old.is_some_and(|o| !o.vehicle.ice_running) && running;

        let target = if !running {
            FuelType::Off
        } else if just_started {
            self.lpg.set(false);
            FuelType::Petrol
        } else if self.lpg.get() {
            FuelType::Lpg
        } else {
            FuelType::Petrol
        };

        if new.vehicle.active_fuel != target {
            dispatcher.dispatch(Action::internal(ActionKind::SetActiveFuel(target)));
        }
        Ok(())
    }
}
