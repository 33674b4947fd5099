// src/twin/egress.rs
//
// Egress: Store -> OutgoingCommand -> OutputPort.
//
// Two independent paths feed the output port:
//   - middleware: `Ui` actions become bus-A commands and are sent at once.
//     Gateway and Internal actions are never translated, which is what keeps
//     vehicle data from being echoed back onto the bus.
//   - output handlers: a state-diff watcher evaluates each handler when one of
//     its watched slices changed, for computed telemetry such as the VFD
//     satellite feed.
//
// A paced queue is also available for ad-hoc bus-A commands (beeps, touch
// injection) that must respect the minimum inter-frame gap.

use serde::Serialize;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;

use crate::io::avc::{commands, AvcCommand, CommandQueue};
use crate::io::{now_secs, OutgoingCommand, OutputPort, DEVICE_AVC, DEVICE_SATELLITE_BASE};
use crate::state::{
    changed_slices, Action, ActionKind, ActionSource, AppState, Dispatcher, Middleware, SliceSet,
    StateSlice, Store, Subscriber,
};

// ============================================================================
// Output handlers
// ============================================================================

type ShouldSendFn = Box<dyn FnMut(Option<&AppState>, &AppState) -> bool>;
type BuildCommandFn = Box<dyn Fn(&AppState) -> Result<OutgoingCommand, String>>;

/// Sends a command when a computed part of the state changes enough.
pub struct OutputHandler {
    pub name: String,
    pub watched: SliceSet,
    should_send: ShouldSendFn,
    build_command: BuildCommandFn,
}

impl OutputHandler {
    pub fn new<S, B>(name: impl Into<String>, watched: SliceSet, should_send: S, build_command: B) -> Self
    where
        S: FnMut(Option<&AppState>, &AppState) -> bool + 'static,
        B: Fn(&AppState) -> Result<OutgoingCommand, String> + 'static,
    {
        Self {
            name: name.into(),
            watched,
            should_send: Box::new(should_send),
            build_command: Box::new(build_command),
        }
    }

    pub fn should_send(&mut self, old: Option<&AppState>, new: &AppState) -> bool {
        (self.should_send)(old, new)
    }

    pub fn build_command(&self, state: &AppState) -> Result<OutgoingCommand, String> {
        (self.build_command)(state)
    }
}

/// Handler that sends `{key: value}` to a satellite whenever `getter` changes.
pub fn satellite_output_handler<T, G>(
    name: impl Into<String>,
    device_id: u32,
    command_type: impl Into<String>,
    payload_key: impl Into<String>,
    watched: SliceSet,
    getter: G,
) -> OutputHandler
where
    T: PartialEq + Serialize,
    G: Fn(&AppState) -> T + Clone + 'static,
{
    let command_type = command_type.into();
    let payload_key = payload_key.into();
    let changed = getter.clone();

    OutputHandler::new(
        name,
        watched,
        move |old, new| old.map_or(true, |o| changed(o) != changed(new)),
        move |state| {
            let value = serde_json::to_value(getter(state)).map_err(|e| e.to_string())?;
            let mut payload = serde_json::Map::new();
            payload.insert(payload_key.clone(), value);
            Ok(OutgoingCommand::new(device_id, command_type.clone(), Value::Object(payload)))
        },
    )
}

// ============================================================================
// UI action mapping
// ============================================================================

/// Bus-A command for a user action, if it has one.
pub fn avc_command_for(kind: &ActionKind) -> Option<AvcCommand> {
    use ActionKind::*;
    let cmd = match kind {
        SetVolume(v) => commands::set_volume(*v),
        SetBass(v) => commands::set_bass(*v),
        SetMid(v) => commands::set_mid(*v),
        SetTreble(v) => commands::set_treble(*v),
        SetBalance(v) => commands::set_balance(*v),
        SetFader(v) => commands::set_fader(*v),
        SetMute(_) => commands::mute_toggle(),
        SetTargetTemp(t) => commands::set_target_temp(*t),
        SetFanSpeed(s) => commands::set_fan_speed(*s),
        SetAc(_) => commands::climate_ac_toggle(),
        SetAutoMode(_) => commands::climate_auto_toggle(),
        SetRecirculation(_) => commands::climate_recirc_toggle(),
        SetAirDirection(d) => commands::set_air_direction(i32::from(*d)),
        _ => return None,
    };
    Some(cmd)
}

/// The outgoing command for an action, or `None` for anything not user-sourced.
pub fn action_to_command(action: &Action) -> Option<OutgoingCommand> {
    if action.source != ActionSource::Ui {
        return None;
    }
    let cmd = avc_command_for(&action.kind)?;
    Some(OutgoingCommand::new(DEVICE_AVC, action.name(), cmd.to_payload()))
}

// ============================================================================
// Controller
// ============================================================================

/// Satellite payload transform: (command type, payload) -> wire payload.
pub type SatelliteEncoder = Box<dyn Fn(&str, &Value) -> Value>;
pub type CommandLogFn = Box<dyn FnMut(&OutgoingCommand, &str)>;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EgressStats {
    pub commands_sent: u64,
    pub avc_commands: u64,
    pub satellite_commands: u64,
    pub send_failures: u64,
    pub handler_errors: u64,
    pub last_command_time: f64,
}

pub struct EgressCore {
    output: Box<dyn OutputPort>,
    handlers: Vec<OutputHandler>,
    satellite_encoders: BTreeMap<u32, SatelliteEncoder>,
    command_log: Option<CommandLogFn>,
    prev_state: Option<Arc<AppState>>,
    queue: CommandQueue,
    stats: EgressStats,
}

impl EgressCore {
    fn send_command(&mut self, command: OutgoingCommand) -> bool {
        let command = match self.satellite_encoders.get(&command.device_id) {
            Some(encode) => {
                let payload = encode(&command.command_type, &command.payload);
                OutgoingCommand { payload, ..command }
            }
            None => command,
        };

        if let Some(log) = self.command_log.as_mut() {
            log(&command, "OUT");
        }

        if self.output.send(&command) {
            self.stats.commands_sent += 1;
            self.stats.last_command_time = now_secs();
            if command.device_id == DEVICE_AVC {
                self.stats.avc_commands += 1;
            } else if command.device_id >= DEVICE_SATELLITE_BASE {
                self.stats.satellite_commands += 1;
            }
            true
        } else {
            self.stats.send_failures += 1;
            tlog!(
                "[egress] Failed to send {} to device {} via {}",
                command.command_type,
                command.device_id,
                self.output.name()
            );
            false
        }
    }

    fn run_handler(&mut self, index: usize, old: Option<&AppState>, new: &AppState) -> Result<(), String> {
        let handler = &mut self.handlers[index];
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            if handler.should_send(old, new) {
                handler.build_command(new).map(Some)
            } else {
                Ok(None)
            }
        }))
        .map_err(|_| "panicked".to_string())?;

        if let Some(command) = outcome? {
            self.send_command(command);
        }
        Ok(())
    }
}

impl Middleware for EgressCore {
    fn handle(&mut self, action: &Action, _state: &Arc<AppState>, _dispatcher: &mut Dispatcher) -> Result<(), String> {
        if let Some(command) = action_to_command(action) {
            self.send_command(command);
        }
        Ok(())
    }

    fn name(&self) -> String {
        "egress".to_string()
    }
}

impl Subscriber for EgressCore {
    fn on_state_change(&mut self, state: &Arc<AppState>, _dispatcher: &mut Dispatcher) -> Result<(), String> {
        let prev = self.prev_state.take();
        if !self.handlers.is_empty() {
            let changed = changed_slices(prev.as_deref(), state);
            for i in 0..self.handlers.len() {
                if self.handlers[i].watched.is_disjoint(&changed) {
                    continue;
                }
                if let Err(e) = self.run_handler(i, prev.as_deref(), state) {
                    self.stats.handler_errors += 1;
                    tlog!("[egress] Output handler '{}' error: {}", self.handlers[i].name, e);
                }
            }
        }
        self.prev_state = Some(Arc::clone(state));
        Ok(())
    }

    fn name(&self) -> String {
        "egress".to_string()
    }
}

/// Cheap handle; clones share one core.
#[derive(Clone)]
pub struct EgressController {
    core: Rc<RefCell<EgressCore>>,
}

impl EgressController {
    pub fn new(output: impl OutputPort + 'static) -> Self {
        Self::with_min_interval(output, crate::io::avc::queue::DEFAULT_MIN_INTERVAL_MS)
    }

    pub fn with_min_interval(output: impl OutputPort + 'static, min_interval_ms: u64) -> Self {
        Self {
            core: Rc::new(RefCell::new(EgressCore {
                output: Box::new(output),
                handlers: Vec::new(),
                satellite_encoders: BTreeMap::new(),
                command_log: None,
                prev_state: None,
                queue: CommandQueue::new(min_interval_ms),
                stats: EgressStats::default(),
            })),
        }
    }

    /// Register as middleware (UI actions) and as an every-change subscriber
    /// (output handlers).
    pub fn attach(&self, store: &mut Store) {
        store.add_middleware(Rc::clone(&self.core));
        store.subscribe(StateSlice::All, Rc::clone(&self.core));
    }

    pub fn stats(&self) -> EgressStats {
        self.core.borrow().stats.clone()
    }

    pub fn output_name(&self) -> String {
        self.core.borrow().output.name()
    }

    pub fn is_connected(&self) -> bool {
        self.core.borrow().output.is_connected()
    }

    pub fn set_command_log_callback(&self, callback: impl FnMut(&OutgoingCommand, &str) + 'static) {
        self.core.borrow_mut().command_log = Some(Box::new(callback));
    }

    pub fn register_output_handler(&self, handler: OutputHandler) {
        tlog!("[egress] Registered output handler: {}", handler.name);
        self.core.borrow_mut().handlers.push(handler);
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.core.borrow().handlers.iter().map(|h| h.name.clone()).collect()
    }

    pub fn register_satellite_encoder<F>(&self, device_id: u32, encoder: F) -> Result<(), String>
    where
        F: Fn(&str, &Value) -> Value + 'static,
    {
        if device_id < DEVICE_SATELLITE_BASE {
            return Err(format!(
                "Satellite device id must be >= {}, got {}",
                DEVICE_SATELLITE_BASE, device_id
            ));
        }
        self.core
            .borrow_mut()
            .satellite_encoders
            .insert(device_id, Box::new(encoder));
        tlog!("[egress] Registered satellite encoder for device {}", device_id);
        Ok(())
    }

    /// Send a command directly, bypassing the store.
    pub fn send_command(&self, command: OutgoingCommand) -> bool {
        self.core.borrow_mut().send_command(command)
    }

    /// Queue a raw bus-A command for paced sending.
    pub fn enqueue_avc(&self, command: AvcCommand, priority: i32) {
        self.core.borrow_mut().queue.enqueue(command, priority);
    }

    pub fn queued_count(&self) -> usize {
        self.core.borrow().queue.pending_count()
    }

    /// Send at most one queued bus-A command if the pacing interval allows.
    pub fn pump_queue(&self, now: f64) -> bool {
        let mut core = self.core.borrow_mut();
        match core.queue.get_next(now) {
            Some(cmd) => {
                let command = OutgoingCommand::new(DEVICE_AVC, "avc_command", cmd.to_payload());
                core.send_command(command)
            }
            None => false,
        }
    }
}

/// Wire payload for satellites that expect `{"cmd": type, ...payload}`.
pub fn tagged_satellite_payload(command_type: &str, payload: &Value) -> Value {
    let mut out = json!({ "cmd": command_type });
    if let (Some(obj), Some(fields)) = (out.as_object_mut(), payload.as_object()) {
        for (k, v) in fields {
            obj.insert(k.clone(), v.clone());
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mock::MockOutputPort;

    fn setup() -> (Store, EgressController, Rc<RefCell<MockOutputPort>>) {
        let port = Rc::new(RefCell::new(MockOutputPort::new()));
        let egress = EgressController::new(port.clone());
        let mut store = Store::default();
        egress.attach(&mut store);
        (store, egress, port)
    }

    #[test]
    fn test_ui_actions_become_commands() {
        let (mut store, egress, port) = setup();
        store.dispatch(Action::ui(ActionKind::SetBass(3)));

        let port = port.borrow();
        let cmd = port.last().unwrap();
        assert_eq!(cmd.device_id, DEVICE_AVC);
        assert_eq!(cmd.command_type, "set_bass");
        assert_eq!(cmd.payload, commands::set_bass(3).to_payload());
        assert_eq!(egress.stats().avc_commands, 1);
    }

    #[test]
    fn test_gateway_and_internal_never_echoed() {
        let (mut store, egress, port) = setup();
        store.dispatch(Action::gateway(ActionKind::SetVolume(30)));
        store.dispatch(Action::internal(ActionKind::SetFanSpeed(2)));
        store.dispatch(Action::batch(
            vec![Action::ui(ActionKind::SetVolume(31))],
            ActionSource::Gateway,
        ));
        assert!(port.borrow().commands().is_empty());
        assert_eq!(egress.stats().commands_sent, 0);
    }

    #[test]
    fn test_unmapped_ui_action_sends_nothing() {
        let (mut store, _egress, port) = setup();
        store.dispatch(Action::ui(ActionKind::SetScreenBrightness(40)));
        assert!(port.borrow().commands().is_empty());
    }

    #[test]
    fn test_output_handler_runs_on_watched_change() {
        let (mut store, egress, port) = setup();
        egress.register_output_handler(satellite_output_handler(
            "fuel",
            120,
            "fuel",
            "level",
            StateSlice::set(&[StateSlice::Vehicle]),
            |s: &AppState| s.vehicle.fuel_level,
        ));

        store.dispatch(Action::gateway(ActionKind::SetFuelLevel(20)));
        // First observation sends, then only changes of the value
        store.dispatch(Action::gateway(ActionKind::SetSpeed(10.0)));
        store.dispatch(Action::gateway(ActionKind::SetFuelLevel(21)));

        let port = port.borrow();
        let sent = port.commands_of(120);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].payload, json!({"level": 21}));
        assert_eq!(egress.stats().satellite_commands, 2);
    }

    #[test]
    fn test_failing_handler_is_isolated() {
        let (mut store, egress, port) = setup();
        egress.register_output_handler(OutputHandler::new(
            "broken",
            StateSlice::set(&[StateSlice::Audio]),
            |_, _| true,
            |_| Err("no payload".to_string()),
        ));
        egress.register_output_handler(OutputHandler::new(
            "ok",
            StateSlice::set(&[StateSlice::Audio]),
            |_, _| true,
            |_| Ok(OutgoingCommand::new(130, "ping", json!({}))),
        ));
        store.dispatch(Action::gateway(ActionKind::SetMute(true)));
        assert_eq!(egress.stats().handler_errors, 1);
        assert_eq!(port.borrow().commands_of(130).len(), 1);
    }

    #[test]
    fn test_send_failure_counted() {
        let (mut store, egress, port) = setup();
        port.borrow_mut().set_connected(false);
        store.dispatch(Action::ui(ActionKind::SetAc(true)));
        assert_eq!(egress.stats().send_failures, 1);
        assert_eq!(egress.stats().commands_sent, 0);
    }

    #[test]
    fn test_satellite_encoder_applied() {
        let (_store, egress, port) = setup();
        assert!(egress.register_satellite_encoder(2, tagged_satellite_payload).is_err());
        egress
            .register_satellite_encoder(106, tagged_satellite_payload)
            .unwrap();
        assert!(egress.send_command(OutgoingCommand::new(106, "drl", json!({"on": true}))));
        assert_eq!(
            port.borrow().last().unwrap().payload,
            json!({"cmd": "drl", "on": true})
        );
    }

    #[test]
    fn test_queue_is_paced() {
        let (_store, egress, port) = setup();
        egress.enqueue_avc(commands::beep(1), 0);
        egress.enqueue_avc(commands::mute_toggle(), 5);
        assert!(egress.pump_queue(100.0));
        assert!(!egress.pump_queue(100.01));
        assert!(egress.pump_queue(100.2));
        assert_eq!(egress.queued_count(), 0);

        let port = port.borrow();
        // Higher priority first
        assert_eq!(port.commands()[0].payload, commands::mute_toggle().to_payload());
    }

    #[test]
    fn test_command_log_callback() {
        let (mut store, egress, _port) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        egress.set_command_log_callback(move |cmd, dir| l.borrow_mut().push(format!("{} {}", dir, cmd.command_type)));
        store.dispatch(Action::ui(ActionKind::SetTargetTemp(21.5)));
        assert_eq!(*log.borrow(), vec!["OUT set_target_temp".to_string()]);
    }
}
