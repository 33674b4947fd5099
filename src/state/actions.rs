// src/state/actions.rs
//
// Actions describe what happened; the reducer turns them into a new state.
//
// The source decides whether an action may leave the process: only `Ui`
// actions are translated into bus commands. `Gateway` actions came from the
// vehicle and `Internal` ones from rules or startup, and echoing either back
// would create a feedback loop.

use serde::Serialize;

use super::app_state::{
    AmbientColor, AudioSource, ConsumptionUnit, EnergyFlowFlags, FuelType, GearPosition,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    /// Decoded from the vehicle; never echoed back
    Gateway,
    /// User intent; the only source that produces bus traffic
    Ui,
    /// Rules, startup settings and other application logic
    Internal,
}

/// A physical button frame from bus-A.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ButtonInput {
    pub code: u16,
    pub modifier: u8,
    pub suffix: u8,
    pub is_press: bool,
    pub name: String,
    pub raw: Vec<u8>,
    /// Frame time, seconds
    pub timestamp: f64,
}

/// A touch frame from bus-A.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TouchInput {
    pub x: u8,
    pub y: u8,
    pub kind: String,
    pub raw: Vec<u8>,
    pub timestamp: f64,
}

/// Partial update of the VFD satellite slice. `None` leaves a field as is.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct VfdSatelliteUpdate {
    pub mg_power: Option<f64>,
    pub fuel_flow: Option<f64>,
    pub brake: Option<f64>,
    pub speed: Option<f64>,
    pub battery_soc: Option<f64>,
    pub petrol_level: Option<u8>,
    pub lpg_level: Option<u8>,
    pub ice_running: Option<bool>,
    pub active_fuel: Option<FuelType>,
    pub gear: Option<GearPosition>,
    pub ready_mode: Option<bool>,
    pub time_base: Option<u32>,
    pub brightness: Option<u8>,
    pub last_energy_send_time: Option<f64>,
    pub last_state_send_time: Option<f64>,
}

impl VfdSatelliteUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ActionKind {
    // Audio
    SetVolume(i32),
    SetBass(i32),
    SetMid(i32),
    SetTreble(i32),
    SetBalance(i32),
    SetFader(i32),
    SetMute(bool),
    SetAudioSource(AudioSource),

    // Climate
    SetTargetTemp(f64),
    SetFanSpeed(i32),
    SetAc(bool),
    SetAutoMode(bool),
    SetRecirculation(bool),
    /// 0 face, 1 face+feet, 2 feet, 3 defrost
    SetAirDirection(u8),
    SetDefrost(bool),
    SetInsideTemp(f64),
    SetOutsideTemp(f64),

    // Vehicle
    SetReadyMode(bool),
    SetParkMode(bool),
    SetGear(GearPosition),
    SetSpeed(f64),
    SetIceRunning(bool),
    SetEvMode(bool),
    SetRpm(u32),
    SetIceCoolantTemp(f64),
    SetInverterTemp(f64),
    SetThrottlePosition(u8),
    SetBrakePressed(u8),
    SetFuelLevel(u8),
    SetLpgLevel(u8),
    SetActiveFuel(FuelType),
    SetFuelFlow(f64),
    SetInstantConsumption { value: f64, unit: ConsumptionUnit },

    // Energy
    SetBatterySoc(f64),
    SetChargingState { charging: bool, discharging: bool },
    SetPowerFlow { motor_kw: f64, generator_kw: f64, ice_kw: f64 },
    SetEnergyFlowFlags(EnergyFlowFlags),
    SetRegenState(bool),
    SetBatteryVoltage(f64),
    SetBatteryCurrent(f64),
    SetBatteryTemp(f64),
    SetBatteryMaxTemp(f64),
    SetBatteryDeltaSoc(f64),

    // Connection
    SetConnectionState { connected: bool, gateway_version: Option<String> },
    GatewayDisconnected,

    // UI
    SetScreenBrightness(u8),
    SetAmbientColor(AmbientColor),

    // Bus-A input
    AvcButtonPress(ButtonInput),
    AvcTouchEvent(TouchInput),
    AvcDebugBytes { master: u16, slave: u16, data: Vec<u8> },

    // Display and satellites
    SetPowerChartTimeBase(u32),
    UpdateVfdSatellite(VfdSatelliteUpdate),

    /// Reduced in order, notified once
    Batch(Vec<Action>),
}

impl ActionKind {
    /// snake_case name, also used as the egress command type.
    pub fn name(&self) -> &'static str {
        use ActionKind::*;
        match self {
            SetVolume(_) => "set_volume",
            SetBass(_) => "set_bass",
            SetMid(_) => "set_mid",
            SetTreble(_) => "set_treble",
            SetBalance(_) => "set_balance",
            SetFader(_) => "set_fader",
            SetMute(_) => "set_mute",
            SetAudioSource(_) => "set_audio_source",
            SetTargetTemp(_) => "set_target_temp",
            SetFanSpeed(_) => "set_fan_speed",
            SetAc(_) => "set_ac",
            SetAutoMode(_) => "set_auto_mode",
            SetRecirculation(_) => "set_recirculation",
            SetAirDirection(_) => "set_air_direction",
            SetDefrost(_) => "set_defrost",
            SetInsideTemp(_) => "set_inside_temp",
            SetOutsideTemp(_) => "set_outside_temp",
            SetReadyMode(_) => "set_ready_mode",
            SetParkMode(_) => "set_park_mode",
            SetGear(_) => "set_gear",
            SetSpeed(_) => "set_speed",
            SetIceRunning(_) => "set_ice_running",
            SetEvMode(_) => "set_ev_mode",
            SetRpm(_) => "set_rpm",
            SetIceCoolantTemp(_) => "set_ice_coolant_temp",
            SetInverterTemp(_) => "set_inverter_temp",
            SetThrottlePosition(_) => "set_throttle_position",
            SetBrakePressed(_) => "set_brake_pressed",
            SetFuelLevel(_) => "set_fuel_level",
            SetLpgLevel(_) => "set_lpg_level",
            SetActiveFuel(_) => "set_active_fuel",
            SetFuelFlow(_) => "set_fuel_flow",
            SetInstantConsumption { .. } => "set_instant_consumption",
            SetBatterySoc(_) => "set_battery_soc",
            SetChargingState { .. } => "set_charging_state",
            SetPowerFlow { .. } => "set_power_flow",
            SetEnergyFlowFlags(_) => "set_energy_flow_flags",
            SetRegenState(_) => "set_regen_state",
            SetBatteryVoltage(_) => "set_battery_voltage",
            SetBatteryCurrent(_) => "set_battery_current",
            SetBatteryTemp(_) => "set_battery_temp",
            SetBatteryMaxTemp(_) => "set_battery_max_temp",
            SetBatteryDeltaSoc(_) => "set_battery_delta_soc",
            SetConnectionState { .. } => "set_connection_state",
            GatewayDisconnected => "gateway_disconnected",
            SetScreenBrightness(_) => "set_screen_brightness",
            SetAmbientColor(_) => "set_ambient_color",
            AvcButtonPress(_) => "avc_button_press",
            AvcTouchEvent(_) => "avc_touch_event",
            AvcDebugBytes { .. } => "avc_debug_bytes",
            SetPowerChartTimeBase(_) => "set_power_chart_time_base",
            UpdateVfdSatellite(_) => "update_vfd_satellite",
            Batch(_) => "batch",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Action {
    pub source: ActionSource,
    pub kind: ActionKind,
}

impl Action {
    pub fn new(kind: ActionKind, source: ActionSource) -> Self {
        Self { source, kind }
    }

    pub fn gateway(kind: ActionKind) -> Self {
        Self::new(kind, ActionSource::Gateway)
    }

    pub fn ui(kind: ActionKind) -> Self {
        Self::new(kind, ActionSource::Ui)
    }

    pub fn internal(kind: ActionKind) -> Self {
        Self::new(kind, ActionSource::Internal)
    }

    pub fn batch(actions: Vec<Action>, source: ActionSource) -> Self {
        Self::new(ActionKind::Batch(actions), source)
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn is_batch(&self) -> bool {
        matches!(self.kind, ActionKind::Batch(_))
    }
}
