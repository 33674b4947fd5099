// src/rules/mod.rs
//
// Reactive rules: small pieces of application logic that watch state slices
// and dispatch `Internal` actions when derived state needs to follow.
//
// Rules never talk to the bus. They only see the previous and current state
// and a `Dispatcher`, so anything they produce goes back through the reducer
// and is never echoed to the vehicle.

pub mod active_fuel;
pub mod engine;
pub mod fuel_consumption;
pub mod park_speed;
pub mod vfd_display;

use serde::Serialize;

use crate::state::{Action, AppState, Dispatcher, SliceSet};

pub use active_fuel::{ActiveFuelRule, LpgSignal};
pub use engine::{RulesEngine, RulesEngineStats, DEFAULT_MAX_CASCADES};
pub use fuel_consumption::FuelConsumptionRule;
pub use park_speed::ParkSpeedRule;
pub use vfd_display::VfdDisplayRule;

/// Execution order. Lower runs first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePriority {
    /// Sensor clean-up and safety clamps
    High = 0,
    Normal = 50,
    /// Aggregations that should see everything else first
    Low = 100,
}

impl RulePriority {
    pub fn value(self) -> u8 {
        self as u8
    }
}

pub trait StateRule {
    fn name(&self) -> &str;

    /// Slices whose change triggers `evaluate`.
    fn watches(&self) -> SliceSet;

    fn priority(&self) -> RulePriority {
        RulePriority::Normal
    }

    fn enabled(&self) -> bool {
        true
    }

    /// `old` is `None` the first time the engine sees a state.
    fn evaluate(
        &mut self,
        old: Option<&AppState>,
        new: &AppState,
        dispatcher: &mut Dispatcher,
    ) -> Result<(), String>;
}

type RuleFn = Box<dyn FnMut(Option<&AppState>, &AppState, &mut Dispatcher) -> Result<(), String>>;

/// A rule backed by a closure.
pub struct FunctionalRule {
    name: String,
    watches: SliceSet,
    priority: RulePriority,
    enabled: bool,
    evaluator: RuleFn,
}

impl FunctionalRule {
    pub fn new<F>(name: impl Into<String>, watches: SliceSet, priority: RulePriority, evaluator: F) -> Self
    where
        F: FnMut(Option<&AppState>, &AppState, &mut Dispatcher) -> Result<(), String> + 'static,
    {
        Self {
            name: name.into(),
            watches,
            priority,
            enabled: true,
            evaluator: Box::new(evaluator),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl StateRule for FunctionalRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn watches(&self) -> SliceSet {
        self.watches.clone()
    }

    fn priority(&self) -> RulePriority {
        self.priority
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn evaluate(
        &mut self,
        old: Option<&AppState>,
        new: &AppState,
        dispatcher: &mut Dispatcher,
    ) -> Result<(), String> {
        (self.evaluator)(old, new, dispatcher)
    }
}

/// Build a rule that recomputes a derived value and dispatches `action` when
/// it differs from what the state currently holds.
pub fn computed_rule<T, C, G, A>(
    name: impl Into<String>,
    watches: SliceSet,
    compute: C,
    get_current: G,
    action: A,
    priority: RulePriority,
) -> FunctionalRule
where
    T: PartialEq,
    C: Fn(&AppState) -> T + 'static,
    G: Fn(&AppState) -> T + 'static,
    A: Fn(T) -> Action + 'static,
{
    FunctionalRule::new(name, watches, priority, move |_old, new, dispatcher| {
        let computed = compute(new);
        if computed != get_current(new) {
            dispatcher.dispatch(action(computed));
        }
        Ok(())
    })
}
