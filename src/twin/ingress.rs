// src/twin/ingress.rs
//
// Ingress: InputPort -> codec -> Actions -> Store.
//
// Every action produced here is `Gateway`-sourced, so egress never echoes it
// back to the vehicle. When one frame maps to several actions they are
// dispatched as a single batch to keep one notification per frame.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::io::avc::{parse_button_event, parse_touch_event, AvcDecoder, AvcMessage, AvcMessageType, MessageClass};
use crate::io::can::{CanDecoder, CanMessage, CanMessageType};
use crate::io::codec::{DecoderStats, PayloadDecoder};
use crate::io::{now_secs, InputPort, MessageCategory, RawMessage, DEVICE_SATELLITE_BASE};
use crate::state::{
    Action, ActionKind, ActionSource, ButtonInput, EnergyFlowFlags, GearPosition, Store, TouchInput,
};

pub const DEFAULT_MAX_MESSAGES: usize = 100;

/// Satellite frame payload -> actions.
pub type SatelliteHandler = Box<dyn FnMut(&Value) -> Result<Vec<Action>, String>>;

/// Called with each received frame before it is routed.
pub type MessageLogFn = Box<dyn FnMut(&RawMessage, &str)>;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct IngressStats {
    pub messages_received: u64,
    pub messages_processed: u64,
    pub can_messages: u64,
    pub avc_messages: u64,
    pub system_messages: u64,
    pub satellite_messages: u64,
    /// Frames that failed to decode or whose handler failed
    pub errors: u64,
    pub last_message_time: f64,
}

pub struct IngressController {
    input: Box<dyn InputPort>,
    avc: AvcDecoder,
    can: CanDecoder,
    satellite_handlers: BTreeMap<u32, SatelliteHandler>,
    message_log: Option<MessageLogFn>,
    max_messages: usize,
    stats: IngressStats,
}

impl IngressController {
    pub fn new(input: impl InputPort + 'static) -> Self {
        Self {
            input: Box::new(input),
            avc: AvcDecoder::new(),
            can: CanDecoder::new(),
            satellite_handlers: BTreeMap::new(),
            message_log: None,
            max_messages: DEFAULT_MAX_MESSAGES,
            stats: IngressStats::default(),
        }
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages.max(1);
        self
    }

    pub fn stats(&self) -> &IngressStats {
        &self.stats
    }

    pub fn avc_stats(&self) -> &DecoderStats {
        self.avc.stats()
    }

    pub fn can_stats(&self) -> &DecoderStats {
        self.can.stats()
    }

    pub fn input_name(&self) -> String {
        self.input.name()
    }

    pub fn is_connected(&self) -> bool {
        self.input.is_connected()
    }

    pub fn set_message_log_callback(&mut self, callback: impl FnMut(&RawMessage, &str) + 'static) {
        self.message_log = Some(Box::new(callback));
    }

    pub fn register_satellite_handler<F>(&mut self, device_id: u32, handler: F) -> Result<(), String>
    where
        F: FnMut(&Value) -> Result<Vec<Action>, String> + 'static,
    {
        if device_id < DEVICE_SATELLITE_BASE {
            return Err(format!(
                "Satellite device id must be >= {}, got {}",
                DEVICE_SATELLITE_BASE, device_id
            ));
        }
        self.satellite_handlers.insert(device_id, Box::new(handler));
        tlog!("[ingress] Registered satellite handler for device {}", device_id);
        Ok(())
    }

    /// Start the input port unless it is already connected.
    pub fn start(&mut self) -> bool {
        if !self.input.is_connected() && !self.input.start() {
            tlog!("[ingress] Failed to start input port {}", self.input.name());
            return false;
        }
        tlog!("[ingress] Started with {}", self.input.name());
        true
    }

    pub fn stop(&mut self) {
        self.input.stop();
        tlog!("[ingress] Stopped");
    }

    /// Drain up to `max_messages` frames into the store.
    pub fn update(&mut self, store: &mut Store) -> usize {
        let mut processed = 0;
        while processed < self.max_messages {
            let Some(msg) = self.input.poll() else {
                break;
            };
            self.process_message(&msg, store);
            processed += 1;
        }
        processed
    }

    pub fn process_message(&mut self, msg: &RawMessage, store: &mut Store) {
        self.stats.messages_received += 1;
        self.stats.last_message_time = now_secs();

        if let Some(log) = self.message_log.as_mut() {
            log(msg, "IN");
        }

        let actions = match msg.category {
            MessageCategory::System => {
                self.stats.system_messages += 1;
                system_actions(&msg.payload)
            }
            MessageCategory::Can => {
                self.stats.can_messages += 1;
                match self.can.decode(msg) {
                    Some(can) => can_actions(&can),
                    None => {
                        self.stats.errors += 1;
                        return;
                    }
                }
            }
            MessageCategory::BusA => {
                self.stats.avc_messages += 1;
                match self.avc.decode(msg) {
                    Some(avc) => avc_actions(&avc),
                    None => {
                        self.stats.errors += 1;
                        return;
                    }
                }
            }
            MessageCategory::Satellite => {
                self.stats.satellite_messages += 1;
                match self.satellite_actions(msg) {
                    Ok(actions) => actions,
                    Err(e) => {
                        self.stats.errors += 1;
                        tlog!("[ingress] Satellite handler error for device {}: {}", msg.device_id, e);
                        return;
                    }
                }
            }
            MessageCategory::Unknown => {
                tlog!("[ingress] Dropping frame from unknown device {}", msg.device_id);
                return;
            }
        };

        dispatch_actions(store, actions);
        self.stats.messages_processed += 1;
    }

    fn satellite_actions(&mut self, msg: &RawMessage) -> Result<Vec<Action>, String> {
        match self.satellite_handlers.get_mut(&msg.device_id) {
            Some(handler) => handler(&msg.payload),
            None => Ok(Vec::new()),
        }
    }
}

/// One action goes out as is, several as one gateway batch.
pub fn dispatch_actions(store: &mut Store, mut actions: Vec<Action>) {
    match actions.len() {
        0 => {}
        1 => {
            if let Some(action) = actions.pop() {
                store.dispatch(action);
            }
        }
        _ => store.dispatch(Action::batch(actions, ActionSource::Gateway)),
    }
}

// ============================================================================
// System
// ============================================================================

pub fn system_actions(payload: &Value) -> Vec<Action> {
    let text = payload.get("msg").and_then(Value::as_str).unwrap_or("");

    if text.contains("GATEWAY_READY") {
        let version = payload
            .get("ver")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let can_ready = payload.get("can").and_then(Value::as_str) == Some("CAN_READY");
        tlog!("[ingress] Gateway ready: v{}, CAN={}", version, can_ready);
        return vec![Action::gateway(ActionKind::SetConnectionState {
            connected: true,
            gateway_version: Some(version),
        })];
    }

    if text.to_lowercase().contains("error") {
        tlog!("[ingress] Gateway error: {}", text);
    }
    Vec::new()
}

// ============================================================================
// CAN
// ============================================================================

const SOC_PLAUSIBLE: std::ops::RangeInclusive<f64> = 10.0..=95.0;
const BATTERY_TEMP_PLAUSIBLE: std::ops::RangeInclusive<f64> = -20.0..=60.0;
const COOLANT_PLAUSIBLE: std::ops::RangeInclusive<f64> = 40.0..=120.0;
const MAX_SPEED_KPH: f64 = 300.0;
const CHARGE_POWER_THRESHOLD_KW: f64 = 0.5;
const INJECTOR_NOISE_FLOOR: f64 = 50.0;
const INJECTOR_LH_PER_UNIT: f64 = 0.008;
const MAX_FUEL_FLOW_LH: f64 = 30.0;

fn clamp_u8(v: f64) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

pub fn fuel_flow_from_injector(injector: f64) -> f64 {
    if injector > INJECTOR_NOISE_FLOOR {
        (injector * INJECTOR_LH_PER_UNIT).clamp(0.0, MAX_FUEL_FLOW_LH)
    } else {
        0.0
    }
}

pub fn can_actions(msg: &CanMessage) -> Vec<Action> {
    use ActionKind::*;

    let mut out = Vec::new();
    let mut push = |kind: ActionKind| out.push(Action::gateway(kind));
    let f = |key: &str| msg.f64_value(key);

    match msg.msg_type {
        CanMessageType::HvBattery => {
            if let Some(soc) = f("soc").filter(|s| SOC_PLAUSIBLE.contains(s)) {
                push(SetBatterySoc(soc / 100.0));
            }
            if let Some(v) = f("voltage") {
                push(SetBatteryVoltage(v));
            }
            if let Some(i) = f("current") {
                push(SetBatteryCurrent(i));
            }
            if let Some(t) = f("battery_temp") {
                push(SetBatteryTemp(t));
            }
        }
        CanMessageType::HvBatteryPower => {
            // The only frame that reliably carries SOC: no plausibility window
            if let Some(soc) = f("soc") {
                push(SetBatterySoc(soc / 100.0));
            }
            let is_charging = msg.bool_value("is_charging").unwrap_or(false);
            let flowing = f("power_kw").unwrap_or(0.0).abs() > CHARGE_POWER_THRESHOLD_KW;
            push(SetChargingState {
                charging: is_charging && flowing,
                discharging: !is_charging && flowing,
            });
            if let Some(t) = f("battery_temp").filter(|t| BATTERY_TEMP_PLAUSIBLE.contains(t)) {
                push(SetBatteryTemp(t));
            }
            if let Some(t) = f("battery_temp_max") {
                push(SetBatteryMaxTemp(t));
            }
        }
        CanMessageType::EnergyFlow => {
            let byte = msg.value("flow_byte_5").and_then(|v| v.as_i64()).unwrap_or(0);
            push(SetEnergyFlowFlags(EnergyFlowFlags::from_byte(byte as u8)));
        }
        CanMessageType::FuelConsumption => {
            push(SetFuelFlow(fuel_flow_from_injector(f("injector_time").unwrap_or(0.0))));
        }
        CanMessageType::VehicleSpeed => {
            if let Some(speed) = f("speed_kph").filter(|s| *s < MAX_SPEED_KPH) {
                push(SetSpeed(speed));
            }
        }
        CanMessageType::EngineRpm => {
            if let Some(t) = f("coolant_temp").filter(|t| COOLANT_PLAUSIBLE.contains(t)) {
                push(SetIceCoolantTemp(t));
            }
        }
        CanMessageType::EngineStatus => {
            if let Some(rpm) = f("rpm") {
                push(SetRpm(rpm.max(0.0) as u32));
            }
            if let Some(running) = msg.bool_value("ice_running") {
                push(SetIceRunning(running));
                push(SetReadyMode(true));
            }
        }
        CanMessageType::PedalPosition => {
            if let Some(t) = f("throttle") {
                push(SetThrottlePosition(clamp_u8(t)));
            }
            if let Some(b) = f("brake") {
                push(SetBrakePressed(clamp_u8(b)));
            }
        }
        CanMessageType::FuelLevel => {
            if let Some(level) = f("fuel_level") {
                push(SetFuelLevel(clamp_u8(level)));
            }
        }
        CanMessageType::GearPosition => {
            // Unknown marker falls back to Park
            if let Some(marker) = msg.value("gear").and_then(|v| v.as_str()) {
                push(SetGear(GearPosition::from_marker(marker).unwrap_or(GearPosition::Park)));
            }
        }
        CanMessageType::HvBatteryTemp | CanMessageType::SystemStatus | CanMessageType::Unknown => {}
    }
    out
}

// ============================================================================
// Bus-A
// ============================================================================

const CLIMATE_MASTER: u16 = 0x10C;
const CLIMATE_SLAVE: u16 = 0x310;
const OUTSIDE_TEMP_MARKER: u8 = 0x90;

/// Address pairs whose raw bytes are kept for manual correlation.
pub const DEBUG_CAPTURE_PAIRS: [(u16, u16); 2] = [(0x110, 0x490), (0xA00, 0x258)];

pub fn avc_actions(msg: &AvcMessage) -> Vec<Action> {
    let mut out = Vec::new();
    let data = &msg.data;

    if msg.msg_type == AvcMessageType::ClimateStatus {
        if let Some(t) = msg.value("ambient_temp_c").and_then(|v| v.as_f64()) {
            out.push(Action::gateway(ActionKind::SetOutsideTemp(t)));
        }
        if let Some(r) = msg.value("recirc").and_then(|v| v.as_bool()) {
            out.push(Action::gateway(ActionKind::SetRecirculation(r)));
        }
    } else if msg.master_addr == CLIMATE_MASTER && msg.slave_addr == CLIMATE_SLAVE {
        if data.len() >= 8 && data[6] == OUTSIDE_TEMP_MARKER && data[4] > 0 {
            let outside = (f64::from(data[4]) - 18.0) / 2.0;
            out.push(Action::gateway(ActionKind::SetOutsideTemp(outside)));
        }
    } else if msg.classification == MessageClass::ButtonPress {
        if let Some(btn) = parse_button_event(data) {
            out.push(Action::gateway(ActionKind::AvcButtonPress(ButtonInput {
                code: btn.code,
                modifier: btn.modifier,
                suffix: btn.suffix,
                is_press: btn.is_press,
                name: btn.name,
                raw: data.clone(),
                timestamp: msg.timestamp,
            })));
        }
    } else if msg.classification == MessageClass::TouchEvent {
        if let Some(touch) = parse_touch_event(data) {
            out.push(Action::gateway(ActionKind::AvcTouchEvent(TouchInput {
                x: touch.x,
                y: touch.y,
                kind: touch.kind.as_str().to_string(),
                raw: touch.raw,
                timestamp: msg.timestamp,
            })));
        }
    }

    if DEBUG_CAPTURE_PAIRS.contains(&(msg.master_addr, msg.slave_addr)) {
        out.push(Action::gateway(ActionKind::AvcDebugBytes {
            master: msg.master_addr,
            slave: msg.slave_addr,
            data: data.clone(),
        }));
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mock::MockInputPort;
    use crate::io::{DEVICE_AVC, DEVICE_CAN};
    use crate::state::{subscriber_fn, AppState, Dispatcher, StateSlice};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    fn can_frame(id: &str, data: &[u8]) -> RawMessage {
        RawMessage::new(DEVICE_CAN, 1.0, json!({"i": id, "d": data}))
    }

    fn avc_frame(master: &str, slave: &str, data: &[&str]) -> RawMessage {
        RawMessage::new(DEVICE_AVC, 2.0, json!({"m": master, "s": slave, "c": 15, "d": data}))
    }

    fn controller_with(frames: Vec<RawMessage>) -> IngressController {
        let mut port = MockInputPort::new();
        port.inject_many(frames);
        let mut ingress = IngressController::new(port);
        assert!(ingress.start());
        ingress
    }

    #[test]
    fn test_gateway_ready_sets_connection() {
        let mut store = Store::default();
        let mut ingress = controller_with(vec![RawMessage::new(
            0,
            0.0,
            json!({"msg": "GATEWAY_READY", "ver": "1.4", "can": "CAN_READY"}),
        )]);
        assert_eq!(ingress.update(&mut store), 1);
        assert!(store.state().connection.connected);
        assert_eq!(store.state().connection.gateway_version.as_deref(), Some("1.4"));
        assert_eq!(ingress.stats().system_messages, 1);
    }

    #[test]
    fn test_battery_frame_dispatches_one_batch() {
        let mut store = Store::default();
        let notified = Rc::new(RefCell::new(0));
        let n = notified.clone();
        store.subscribe(
            StateSlice::Energy,
            subscriber_fn("count", move |_: &Arc<AppState>, _: &mut Dispatcher| {
                *n.borrow_mut() += 1;
                Ok(())
            }),
        );

        let mut ingress = controller_with(vec![can_frame("0x03B", &[0x0F, 0x80, 0x00, 220, 0x00])]);
        ingress.update(&mut store);

        let energy = &store.state().energy;
        assert_eq!(energy.hv_battery_voltage, Some(220.0));
        assert!((energy.hv_battery_current.unwrap() + 12.8).abs() < 1e-9);
        assert_eq!(*notified.borrow(), 1);
    }

    #[test]
    fn test_update_is_bounded() {
        let frames = (0..5).map(|i| can_frame("0x0B4", &[0, 0, 0, 0, 0, 0x10, i, 0])).collect();
        let mut store = Store::default();
        let mut ingress = controller_with(frames).with_max_messages(3);
        assert_eq!(ingress.update(&mut store), 3);
        assert_eq!(ingress.update(&mut store), 2);
        assert_eq!(ingress.update(&mut store), 0);
        assert_eq!(ingress.stats().can_messages, 5);
    }

    #[test]
    fn test_can_mapping_filters_implausible_values() {
        let mut decoder = CanDecoder::new();
        // temp 70 rejected; soc byte 200 clamps to 100 % and is kept
        let msg = decoder
            .decode_payload(&json!({"i": "0x3CB", "d": [0, 0, 0, 200, 70, 30, 0]}), 0.0, None)
            .unwrap();
        let actions = can_actions(&msg);
        let names: Vec<_> = actions.iter().map(Action::name).collect();
        assert_eq!(
            names,
            vec!["set_battery_soc", "set_charging_state", "set_battery_max_temp"]
        );
        assert_eq!(actions[0].kind, ActionKind::SetBatterySoc(1.0));
        assert!(actions.iter().all(|a| a.source == ActionSource::Gateway));
    }

    #[test]
    fn test_soc_outside_mid_range_reaches_state() {
        let mut store = Store::default();
        let mut ingress = controller_with(vec![
            can_frame("0x3CB", &[0, 0, 0, 196, 25, 30, 0]),
            can_frame("0x3CB", &[0, 0, 0, 16, 25, 30, 0]),
        ]);

        assert_eq!(ingress.update(&mut store), 2);
        assert!((store.state().energy.battery_soc - 0.08).abs() < 1e-9);

        let mut ingress = controller_with(vec![can_frame("0x3CB", &[0, 0, 0, 196, 25, 30, 0])]);
        ingress.update(&mut store);
        assert!((store.state().energy.battery_soc - 0.98).abs() < 1e-9);
    }

    #[test]
    fn test_engine_status_asserts_ready() {
        let mut decoder = CanDecoder::new();
        let msg = decoder
            .decode_payload(&json!({"i": "0x038", "d": [0, 40, 0, 0, 0, 0, 0]}), 0.0, None)
            .unwrap();
        let kinds: Vec<_> = can_actions(&msg).into_iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActionKind::SetRpm(1280),
                ActionKind::SetIceRunning(true),
                ActionKind::SetReadyMode(true)
            ]
        );
    }

    #[test]
    fn test_unknown_gear_falls_back_to_park() {
        let mut decoder = CanDecoder::new();
        let unknown = decoder
            .decode_payload(&json!({"i": "0x120", "d": [0, 0, 0, 0, 0, 0x07, 0, 0]}), 0.0, None)
            .unwrap();
        assert_eq!(
            can_actions(&unknown).into_iter().map(|a| a.kind).collect::<Vec<_>>(),
            vec![ActionKind::SetGear(GearPosition::Park)]
        );

        let drive = decoder
            .decode_payload(&json!({"i": "0x120", "d": [0, 0, 0, 0, 0, 0x03, 0, 0]}), 0.0, None)
            .unwrap();
        assert_eq!(
            can_actions(&drive)[0].kind,
            ActionKind::SetGear(GearPosition::Drive)
        );
    }

    #[test]
    fn test_fuel_flow_scaling() {
        assert_eq!(fuel_flow_from_injector(40.0), 0.0);
        assert!((fuel_flow_from_injector(1000.0) - 8.0).abs() < 1e-9);
        assert_eq!(fuel_flow_from_injector(10_000.0), 30.0);
    }

    #[test]
    fn test_outside_temp_from_climate_panel() {
        let mut store = Store::default();
        let mut ingress = controller_with(vec![avc_frame(
            "10C",
            "310",
            &["00", "00", "00", "00", "3C", "00", "90", "00"],
        )]);
        ingress.update(&mut store);
        // (0x3C - 18) / 2
        assert_eq!(store.state().climate.outside_temp, Some(21.0));
    }

    #[test]
    fn test_debug_capture_pairs() {
        let mut store = Store::default();
        let mut ingress = controller_with(vec![avc_frame(
            "110",
            "490",
            &["01", "02", "03", "04", "05", "06", "07", "08"],
        )]);
        ingress.update(&mut store);
        assert_eq!(store.state().input.avc_110_490_bytes, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_malformed_frames_are_counted() {
        let mut store = Store::default();
        let mut ingress = controller_with(vec![
            RawMessage::new(DEVICE_CAN, 0.0, json!({"d": [1, 2]})),
            RawMessage::new(DEVICE_AVC, 0.0, json!({"m": "zz"})),
        ]);
        assert_eq!(ingress.update(&mut store), 2);
        assert_eq!(ingress.stats().errors, 2);
        assert_eq!(ingress.stats().messages_processed, 0);
    }

    #[test]
    fn test_satellite_handlers() {
        let mut store = Store::default();
        let mut ingress = controller_with(vec![RawMessage::new(120, 0.0, json!({"lvl": 33}))]);
        assert!(ingress.register_satellite_handler(5, |_| Ok(vec![])).is_err());
        ingress
            .register_satellite_handler(120, |payload| {
                let level = payload.get("lvl").and_then(Value::as_u64).ok_or("missing lvl")?;
                Ok(vec![Action::gateway(ActionKind::SetLpgLevel(level as u8))])
            })
            .unwrap();
        ingress.update(&mut store);
        assert_eq!(store.state().vehicle.lpg_level, 33);
        assert_eq!(ingress.stats().satellite_messages, 1);
    }

    #[test]
    fn test_message_log_callback() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let mut store = Store::default();
        let mut ingress = controller_with(vec![can_frame("0x5A4", &[0, 25])]);
        ingress.set_message_log_callback(move |msg, dir| {
            s.borrow_mut().push(format!("{} {}", dir, msg.device_id));
        });
        ingress.update(&mut store);
        assert_eq!(*seen.borrow(), vec!["IN 1".to_string()]);
        assert_eq!(store.state().vehicle.fuel_level, 25);
    }
}
