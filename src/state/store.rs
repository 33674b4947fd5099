// src/state/store.rs
//
// The Store owns the current `AppState` and runs every dispatch through
// reduce -> notify -> middleware.
//
// Callbacks never get the Store itself. They get a `Dispatcher` and any action
// they push onto it is queued, then drained FIFO after the current action has
// finished all three stages. Each queued action carries its cascade depth
// (0 for the outer dispatch, +1 per hop) so the rules engine can bound loops.

use serde::Serialize;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;

use super::actions::Action;
use super::app_state::AppState;
use super::reducer::reduce;
use super::{SliceSet, StateSlice};

// ============================================================================
// Dispatcher
// ============================================================================

/// Queue of follow-up actions handed to subscribers and middleware.
#[derive(Debug, Default)]
pub struct Dispatcher {
    queue: VecDeque<(Action, usize)>,
    depth: usize,
}

impl Dispatcher {
    /// Queue an action to run after the current one completes.
    pub fn dispatch(&mut self, action: Action) {
        self.queue.push_back((action, self.depth + 1));
    }

    /// Cascade depth of the action being processed.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

// ============================================================================
// Callbacks
// ============================================================================

/// Notified after the reducer whenever a watched slice was affected.
pub trait Subscriber {
    fn on_state_change(&mut self, state: &Arc<AppState>, dispatcher: &mut Dispatcher) -> Result<(), String>;

    fn name(&self) -> String {
        "subscriber".to_string()
    }
}

/// Runs after subscribers for every dispatched action, in registration order.
pub trait Middleware {
    fn handle(&mut self, action: &Action, state: &Arc<AppState>, dispatcher: &mut Dispatcher) -> Result<(), String>;

    fn name(&self) -> String {
        "middleware".to_string()
    }
}

// Shared components (rules engine, egress) register through an Rc handle.
impl<S: Subscriber + ?Sized> Subscriber for Rc<RefCell<S>> {
    fn on_state_change(&mut self, state: &Arc<AppState>, dispatcher: &mut Dispatcher) -> Result<(), String> {
        self.borrow_mut().on_state_change(state, dispatcher)
    }

    fn name(&self) -> String {
        self.borrow().name()
    }
}

impl<M: Middleware + ?Sized> Middleware for Rc<RefCell<M>> {
    fn handle(&mut self, action: &Action, state: &Arc<AppState>, dispatcher: &mut Dispatcher) -> Result<(), String> {
        self.borrow_mut().handle(action, state, dispatcher)
    }

    fn name(&self) -> String {
        self.borrow().name()
    }
}

/// Closure adapter for `Subscriber`.
pub struct FnSubscriber<F> {
    name: String,
    f: F,
}

impl<F> Subscriber for FnSubscriber<F>
where
    F: FnMut(&Arc<AppState>, &mut Dispatcher) -> Result<(), String>,
{
    fn on_state_change(&mut self, state: &Arc<AppState>, dispatcher: &mut Dispatcher) -> Result<(), String> {
        (self.f)(state, dispatcher)
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

pub fn subscriber_fn<F>(name: impl Into<String>, f: F) -> FnSubscriber<F>
where
    F: FnMut(&Arc<AppState>, &mut Dispatcher) -> Result<(), String>,
{
    FnSubscriber {
        name: name.into(),
        f,
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriberId(u64);

struct SubscriberEntry {
    id: SubscriberId,
    slices: SliceSet,
    subscriber: Box<dyn Subscriber>,
}

impl SubscriberEntry {
    fn wants(&self, affected: &SliceSet) -> bool {
        self.slices.contains(&StateSlice::All) || !self.slices.is_disjoint(affected)
    }
}

// ============================================================================
// Store
// ============================================================================

pub struct Store {
    state: Arc<AppState>,
    subscribers: Vec<SubscriberEntry>,
    middleware: Vec<Box<dyn Middleware>>,
    next_id: u64,
    verbose: bool,
    dispatch_count: u64,
    callback_errors: u64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(AppState::default())
    }
}

impl Store {
    pub fn new(initial: AppState) -> Self {
        Self {
            state: Arc::new(initial),
            subscribers: Vec::new(),
            middleware: Vec::new(),
            next_id: 1,
            verbose: false,
            dispatch_count: 0,
            callback_errors: 0,
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Actions processed so far, including queued follow-ups and batches (as one).
    pub fn dispatch_count(&self) -> u64 {
        self.dispatch_count
    }

    /// Subscriber and middleware failures (errors and panics) caught so far.
    pub fn callback_errors(&self) -> u64 {
        self.callback_errors
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn subscribe(&mut self, slice: StateSlice, subscriber: impl Subscriber + 'static) -> SubscriberId {
        self.subscribe_many(&[slice], subscriber)
    }

    /// Watch several slices with one handle; the subscriber runs at most once
    /// per dispatch however many of its slices were affected.
    pub fn subscribe_many(&mut self, slices: &[StateSlice], subscriber: impl Subscriber + 'static) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.subscribers.push(SubscriberEntry {
            id,
            slices: slices.iter().copied().collect(),
            subscriber: Box::new(subscriber),
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|entry| entry.id != id);
        self.subscribers.len() != before
    }

    pub fn add_middleware(&mut self, middleware: impl Middleware + 'static) {
        self.middleware.push(Box::new(middleware));
    }

    /// Run an action and everything it cascades into.
    pub fn dispatch(&mut self, action: Action) {
        let mut dispatcher = Dispatcher::default();
        dispatcher.queue.push_back((action, 0));

        while let Some((action, depth)) = dispatcher.queue.pop_front() {
            dispatcher.depth = depth;
            self.process(&action, &mut dispatcher);
        }
    }

    fn process(&mut self, action: &Action, dispatcher: &mut Dispatcher) {
        self.dispatch_count += 1;

        let (next, affected) = reduce(&self.state, action);
        let previous = std::mem::replace(&mut self.state, Arc::new(next));

        if self.verbose && !affected.is_empty() {
            log_state_change(action, &previous, &self.state);
        }

        self.notify(&affected, dispatcher);
        self.run_middleware(action, dispatcher);
    }

    fn notify(&mut self, affected: &SliceSet, dispatcher: &mut Dispatcher) {
        let state = Arc::clone(&self.state);
        for entry in self.subscribers.iter_mut() {
            if !entry.wants(affected) {
                continue;
            }
            let result = catch_unwind(AssertUnwindSafe(|| {
                entry.subscriber.on_state_change(&state, dispatcher)
            }));
            if let Some(message) = failure_message(result) {
                self.callback_errors += 1;
                tlog!("[store] Subscriber '{}' error: {}", entry.subscriber.name(), message);
            }
        }
    }

    fn run_middleware(&mut self, action: &Action, dispatcher: &mut Dispatcher) {
        let state = Arc::clone(&self.state);
        for middleware in self.middleware.iter_mut() {
            let result = catch_unwind(AssertUnwindSafe(|| middleware.handle(action, &state, dispatcher)));
            if let Some(message) = failure_message(result) {
                self.callback_errors += 1;
                tlog!("[store] Middleware '{}' error: {}", middleware.name(), message);
            }
        }
    }
}

fn failure_message(result: std::thread::Result<Result<(), String>>) -> Option<String> {
    match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(panic) => Some(
            panic
                .downcast_ref::<&str>()
                .map(|s| format!("panic: {}", s))
                .or_else(|| panic.downcast_ref::<String>().map(|s| format!("panic: {}", s)))
                .unwrap_or_else(|| "panic".to_string()),
        ),
    }
}

// ============================================================================
// Verbose logging
// ============================================================================

fn push_change<T: PartialEq + std::fmt::Debug>(changes: &mut Vec<String>, label: &str, old: &T, new: &T) {
    if old != new {
        changes.push(format!("{}: {:?} -> {:?}", label, old, new));
    }
}

/// One-line summary of the fields an action changed.
pub fn describe_changes(old: &AppState, new: &AppState) -> Vec<String> {
    let mut changes = Vec::new();

    let (v0, v1) = (&old.vehicle, &new.vehicle);
    push_change(&mut changes, "speed", &v0.speed_kmh, &v1.speed_kmh);
    push_change(&mut changes, "rpm", &v0.rpm, &v1.rpm);
    push_change(&mut changes, "ready", &v0.ready_mode, &v1.ready_mode);
    push_change(&mut changes, "gear", &v0.gear, &v1.gear);
    push_change(&mut changes, "ice_running", &v0.ice_running, &v1.ice_running);
    push_change(&mut changes, "ice_temp", &v0.ice_coolant_temp, &v1.ice_coolant_temp);
    push_change(&mut changes, "active_fuel", &v0.active_fuel, &v1.active_fuel);
    push_change(&mut changes, "consumption", &v0.instant_consumption, &v1.instant_consumption);

    let (e0, e1) = (&old.energy, &new.energy);
    push_change(&mut changes, "soc", &e0.battery_soc, &e1.battery_soc);
    push_change(&mut changes, "voltage", &e0.hv_battery_voltage, &e1.hv_battery_voltage);
    push_change(&mut changes, "current", &e0.hv_battery_current, &e1.hv_battery_current);
    push_change(&mut changes, "batt_temp", &e0.battery_temp, &e1.battery_temp);
    push_change(&mut changes, "charging", &e0.charging, &e1.charging);

    push_change(&mut changes, "volume", &old.audio.volume, &new.audio.volume);
    push_change(&mut changes, "muted", &old.audio.muted, &new.audio.muted);

    let (c0, c1) = (&old.climate, &new.climate);
    push_change(&mut changes, "target_temp", &c0.target_temp, &c1.target_temp);
    push_change(&mut changes, "fan", &c0.fan_speed, &c1.fan_speed);
    push_change(&mut changes, "ac", &c0.ac_on, &c1.ac_on);

    push_change(
        &mut changes,
        "connected",
        &old.connection.connected,
        &new.connection.connected,
    );
    changes
}

fn log_state_change(action: &Action, old: &AppState, new: &AppState) {
    let changes = describe_changes(old, new);
    if !changes.is_empty() {
        tlog!(
            "[store] {} ({:?}): {}",
            action.name(),
            action.source,
            changes.join(", ")
        );
    }
}

// ============================================================================
// Tests
// ============================================================================
