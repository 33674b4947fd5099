// src/state/mod.rs
//
// Single-writer application state: immutable `AppState`, closed `Action` enum,
// a pure reducer and the `Store` that ties them to subscribers and middleware.
//
//   Gateway -> Action -> Store -> subscribers (rules, presentation)
//   UI      -> Action -> Store -> middleware (egress) -> bus

pub mod actions;
pub mod app_state;
pub mod reducer;
pub mod store;

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

pub use actions::{Action, ActionKind, ActionSource, ButtonInput, TouchInput, VfdSatelliteUpdate};
pub use app_state::{
    AmbientColor, AppState, AudioSource, AudioState, ClimateState, ConnectionState, ConsumptionUnit,
    DisplayState, EnergyFlowFlags, EnergyState, FuelType, GearPosition, InputState, VehicleState,
    VfdSatelliteState,
};
pub use reducer::reduce;
pub use store::{subscriber_fn, Dispatcher, Middleware, Store, Subscriber, SubscriberId};

/// Independently replaceable parts of `AppState`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateSlice {
    Audio,
    Climate,
    Vehicle,
    Energy,
    Connection,
    Input,
    /// Display settings, screen brightness and ambient colour
    Display,
    VfdSatellite,
    /// Subscribe to every dispatch
    All,
}

pub type SliceSet = BTreeSet<StateSlice>;

impl StateSlice {
    /// Every concrete slice (excludes `All`).
    pub const CONCRETE: [StateSlice; 8] = [
        StateSlice::Audio,
        StateSlice::Climate,
        StateSlice::Vehicle,
        StateSlice::Energy,
        StateSlice::Connection,
        StateSlice::Input,
        StateSlice::Display,
        StateSlice::VfdSatellite,
    ];

    pub fn set(slices: &[StateSlice]) -> SliceSet {
        slices.iter().copied().collect()
    }
}

fn slice_differs<T: PartialEq>(a: &Arc<T>, b: &Arc<T>) -> bool {
    !Arc::ptr_eq(a, b) && **a != **b
}

/// Slices whose value differs between two states. With no previous state
/// every slice counts as changed.
pub fn changed_slices(old: Option<&AppState>, new: &AppState) -> SliceSet {
    let Some(old) = old else {
        return StateSlice::CONCRETE.iter().copied().collect();
    };

    let mut changed = SliceSet::new();
    if slice_differs(&old.audio, &new.audio) {
        changed.insert(StateSlice::Audio);
    }
    if slice_differs(&old.climate, &new.climate) {
        changed.insert(StateSlice::Climate);
    }
    if slice_differs(&old.vehicle, &new.vehicle) {
        changed.insert(StateSlice::Vehicle);
    }
    if slice_differs(&old.energy, &new.energy) {
        changed.insert(StateSlice::Energy);
    }
    if slice_differs(&old.connection, &new.connection) {
        changed.insert(StateSlice::Connection);
    }
    if slice_differs(&old.input, &new.input) {
        changed.insert(StateSlice::Input);
    }
    if slice_differs(&old.display, &new.display)
        || old.screen_brightness != new.screen_brightness
        || old.ambient != new.ambient
    {
        changed.insert(StateSlice::Display);
    }
    if slice_differs(&old.vfd_satellite, &new.vfd_satellite) {
        changed.insert(StateSlice::VfdSatellite);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_state_changes_everything() {
        let s = AppState::default();
        let changed = changed_slices(None, &s);
        assert_eq!(changed.len(), StateSlice::CONCRETE.len());
        assert!(!changed.contains(&StateSlice::All));
    }

    #[test]
    fn test_structural_comparison() {
        let a = AppState::default();
        let mut b = a.clone();
        // New allocation, same value
        b.audio = Arc::new(AudioState::default());
        assert!(changed_slices(Some(&a), &b).is_empty());

        b.vehicle = Arc::new(VehicleState {
            speed_kmh: 10.0,
            ..VehicleState::default()
        });
        b.screen_brightness = 40;
        assert_eq!(
            changed_slices(Some(&a), &b),
            StateSlice::set(&[StateSlice::Vehicle, StateSlice::Display])
        );
    }
}
