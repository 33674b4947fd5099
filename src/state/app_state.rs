// src/state/app_state.rs
//
// The application state tree.
//
// Every slice sits behind an `Arc`; a reducer step clones the tree (cheap
// pointer copies) and swaps in a new value only for the slice it touched, so
// untouched slices stay pointer-equal between versions.

use serde::Serialize;
use std::sync::Arc;

// ============================================================================
// Enums
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSource {
    #[default]
    Unknown,
    Am,
    Fm,
    Cd,
    Aux,
    Bluetooth,
    Usb,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum GearPosition {
    #[default]
    Park,
    Reverse,
    Neutral,
    Drive,
    /// Engine braking
    B,
}

impl GearPosition {
    /// Single-letter marker used on the CAN side and by the VFD satellite.
    pub fn as_str(&self) -> &'static str {
        match self {
            GearPosition::Park => "P",
            GearPosition::Reverse => "R",
            GearPosition::Neutral => "N",
            GearPosition::Drive => "D",
            GearPosition::B => "B",
        }
    }

    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "P" => Some(GearPosition::Park),
            "R" => Some(GearPosition::Reverse),
            "N" => Some(GearPosition::Neutral),
            "D" => Some(GearPosition::Drive),
            "B" => Some(GearPosition::B),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FuelType {
    #[default]
    Off,
    Petrol,
    Lpg,
}

impl FuelType {
    /// Three-letter code sent to the VFD satellite.
    pub fn vfd_code(&self) -> &'static str {
        match self {
            FuelType::Off => "OFF",
            FuelType::Petrol => "PTR",
            FuelType::Lpg => "LPG",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum ConsumptionUnit {
    #[default]
    #[serde(rename = "L/h")]
    LitersPerHour,
    #[serde(rename = "L/100km")]
    LitersPer100Km,
}

impl ConsumptionUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumptionUnit::LitersPerHour => "L/h",
            ConsumptionUnit::LitersPer100Km => "L/100km",
        }
    }
}

/// Air outlet selection. 3 is defrost.
pub const AIR_FACE: u8 = 0;
pub const AIR_FACE_FEET: u8 = 1;
pub const AIR_FEET: u8 = 2;
pub const AIR_DEFROST: u8 = 3;

/// Power chart time bases the display accepts, in seconds.
pub const TIME_BASE_OPTIONS: [u32; 5] = [15, 60, 300, 900, 3600];

// ============================================================================
// Slices
// ============================================================================

/// Audio levels. Tone is -5..=5 and balance/fader -7..=7 (0 is centre).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AudioState {
    pub volume: u8,
    pub muted: bool,
    pub bass: i8,
    pub mid: i8,
    pub treble: i8,
    /// Negative is left
    pub balance: i8,
    /// Negative is rear
    pub fader: i8,
    pub source: AudioSource,
}

impl Default for AudioState {
    fn default() -> Self {
        Self {
            volume: 25,
            muted: false,
            bass: 0,
            mid: 0,
            treble: 0,
            balance: 0,
            fader: 0,
            source: AudioSource::Unknown,
        }
    }
}

pub(crate) fn clamp_volume(v: i32) -> u8 {
    v.clamp(0, 63) as u8
}

pub(crate) fn clamp_tone(v: i32) -> i8 {
    v.clamp(-5, 5) as i8
}

pub(crate) fn clamp_balance(v: i32) -> i8 {
    v.clamp(-7, 7) as i8
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClimateState {
    pub target_temp: f64,
    pub inside_temp: Option<f64>,
    pub outside_temp: Option<f64>,
    pub fan_speed: u8,
    pub ac_on: bool,
    pub auto_mode: bool,
    pub recirculation: bool,
    pub air_direction: u8,
    pub defrost: bool,
}

impl Default for ClimateState {
    fn default() -> Self {
        Self {
            target_temp: 22.0,
            inside_temp: None,
            outside_temp: None,
            fan_speed: 0,
            ac_on: false,
            auto_mode: false,
            recirculation: false,
            air_direction: AIR_FACE,
            defrost: false,
        }
    }
}

pub(crate) fn clamp_target_temp(t: f64) -> f64 {
    t.clamp(18.0, 28.0)
}

pub(crate) fn clamp_fan_speed(s: i32) -> u8 {
    s.clamp(0, 7) as u8
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VehicleState {
    pub ready_mode: bool,
    pub ice_running: bool,
    pub ev_mode: bool,
    pub gear: GearPosition,
    pub speed_kmh: f64,
    pub rpm: u32,
    pub throttle_position: u8,
    /// 0..=127
    pub brake_pressed: u8,
    /// Petrol, litres
    pub fuel_level: u8,
    /// LPG, litres
    pub lpg_level: u8,
    pub active_fuel: FuelType,
    /// L/h
    pub fuel_flow_rate: f64,
    pub instant_consumption: f64,
    pub consumption_unit: ConsumptionUnit,
    pub ice_coolant_temp: Option<f64>,
    pub inverter_temp: Option<f64>,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            ready_mode: false,
            ice_running: false,
            ev_mode: false,
            gear: GearPosition::Park,
            speed_kmh: 0.0,
            rpm: 0,
            throttle_position: 0,
            brake_pressed: 0,
            fuel_level: 30,
            lpg_level: 45,
            active_fuel: FuelType::Off,
            fuel_flow_rate: 0.0,
            instant_consumption: 0.0,
            consumption_unit: ConsumptionUnit::LitersPerHour,
            ice_coolant_temp: None,
            inverter_temp: None,
        }
    }
}

impl VehicleState {
    pub fn is_parked(&self) -> bool {
        self.gear == GearPosition::Park
    }

    pub fn is_driving(&self) -> bool {
        matches!(
            self.gear,
            GearPosition::Drive | GearPosition::Reverse | GearPosition::B
        )
    }
}

/// Energy-flow arrows from CAN 0x3B6. Bit meanings are approximate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EnergyFlowFlags {
    pub engine_to_wheels: bool,
    pub battery_to_motor: bool,
    pub motor_to_battery: bool,
    pub engine_to_battery: bool,
    pub battery_to_wheels: bool,
    /// Source byte as received
    pub raw: u8,
}

impl EnergyFlowFlags {
    /// Split byte 5 of 0x3B6 into flags (bits 0x08..=0x80).
    pub fn from_byte(b: u8) -> Self {
        Self {
            engine_to_wheels: b & 0x08 != 0,
            battery_to_motor: b & 0x10 != 0,
            motor_to_battery: b & 0x20 != 0,
            engine_to_battery: b & 0x40 != 0,
            battery_to_wheels: b & 0x80 != 0,
            raw: b,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnergyState {
    /// 0.0..=1.0
    pub battery_soc: f64,
    pub battery_temp: Option<f64>,
    pub hv_battery_voltage: Option<f64>,
    /// Positive is discharge
    pub hv_battery_current: Option<f64>,
    pub battery_delta_soc: Option<f64>,
    pub battery_max_cell_temp: Option<f64>,
    pub motor_power_kw: f64,
    pub generator_power_kw: f64,
    pub ice_power_kw: f64,
    pub flow: EnergyFlowFlags,
    pub charging: bool,
    pub discharging: bool,
    pub regen_active: bool,
}

impl Default for EnergyState {
    fn default() -> Self {
        Self {
            battery_soc: 0.6,
            battery_temp: None,
            hv_battery_voltage: None,
            hv_battery_current: None,
            battery_delta_soc: None,
            battery_max_cell_temp: None,
            motor_power_kw: 0.0,
            generator_power_kw: 0.0,
            ice_power_kw: 0.0,
            flow: EnergyFlowFlags::default(),
            charging: false,
            discharging: false,
            regen_active: false,
        }
    }
}

impl EnergyState {
    pub fn net_power_kw(&self) -> f64 {
        self.motor_power_kw + self.generator_power_kw
    }

    /// V * I / 1000, when both are known.
    pub fn battery_power_kw(&self) -> Option<f64> {
        match (self.hv_battery_voltage, self.hv_battery_current) {
            (Some(v), Some(i)) => Some(v * i / 1000.0),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ConnectionState {
    pub connected: bool,
    pub gateway_version: Option<String>,
}

pub const RECENT_BUTTONS: usize = 5;
pub const DEBUG_110_490_LEN: usize = 8;
pub const DEBUG_A00_258_LEN: usize = 32;

/// Last bus-A button and touch input, plus raw byte windows kept for
/// correlating unknown frames by hand.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct InputState {
    pub last_button_code: u16,
    pub last_button_name: String,
    pub last_button_time: f64,
    pub button_press_count: u64,
    pub last_touch_x: u8,
    pub last_touch_y: u8,
    pub last_touch_type: String,
    pub last_touch_time: f64,
    pub touch_event_count: u64,
    /// Newest first
    pub recent_buttons: Vec<u16>,
    pub avc_110_490_bytes: [u8; DEBUG_110_490_LEN],
    pub avc_a00_258_bytes: [u8; DEBUG_A00_258_LEN],
}

impl InputState {
    /// A touch arrived within the last 500 ms.
    pub fn touch_active(&self, now: f64) -> bool {
        self.last_touch_time > 0.0 && now - self.last_touch_time < 0.5
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DisplayState {
    /// Seconds per power chart; one of `TIME_BASE_OPTIONS`
    pub power_chart_time_base: u32,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            power_chart_time_base: 60,
        }
    }
}

/// Normalized values for the VFD satellite (device 110).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VfdSatelliteState {
    /// -1.0..=1.0 of ±30 kW
    pub mg_power: f64,
    /// 0.0..=1.0 of 8 L/h
    pub fuel_flow: f64,
    pub brake: f64,
    /// 0.0..=1.0 of 120 km/h
    pub speed: f64,
    pub battery_soc: f64,
    pub petrol_level: u8,
    pub lpg_level: u8,
    pub ice_running: bool,
    pub active_fuel: FuelType,
    pub gear: GearPosition,
    pub ready_mode: bool,
    pub time_base: u32,
    pub brightness: u8,
    pub last_energy_send_time: f64,
    pub last_state_send_time: f64,
}

impl Default for VfdSatelliteState {
    fn default() -> Self {
        Self {
            mg_power: 0.0,
            fuel_flow: 0.0,
            brake: 0.0,
            speed: 0.0,
            battery_soc: 0.6,
            petrol_level: 30,
            lpg_level: 45,
            ice_running: false,
            active_fuel: FuelType::Off,
            gear: GearPosition::Park,
            ready_mode: false,
            time_base: 60,
            brightness: 100,
            last_energy_send_time: 0.0,
            last_state_send_time: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AmbientColor {
    /// 0..=359
    pub hue: u16,
    pub saturation: u8,
    pub brightness: u8,
}

impl Default for AmbientColor {
    fn default() -> Self {
        Self {
            hue: 180,
            saturation: 100,
            brightness: 50,
        }
    }
}

impl AmbientColor {
    pub fn clamped(self) -> Self {
        Self {
            hue: self.hue % 360,
            saturation: self.saturation.min(100),
            brightness: self.brightness.min(100),
        }
    }
}

// ============================================================================
// AppState
// ============================================================================

/// Complete application state. Replaced, never mutated, on each dispatch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppState {
    pub audio: Arc<AudioState>,
    pub climate: Arc<ClimateState>,
    pub vehicle: Arc<VehicleState>,
    pub energy: Arc<EnergyState>,
    pub connection: Arc<ConnectionState>,
    pub input: Arc<InputState>,
    pub display: Arc<DisplayState>,
    pub vfd_satellite: Arc<VfdSatelliteState>,
    pub screen_brightness: u8,
    pub ambient: AmbientColor,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            audio: Arc::default(),
            climate: Arc::default(),
            vehicle: Arc::default(),
            energy: Arc::default(),
            connection: Arc::default(),
            input: Arc::default(),
            display: Arc::default(),
            vfd_satellite: Arc::default(),
            screen_brightness: 100,
            ambient: AmbientColor::default(),
        }
    }
}

impl AppState {
    pub fn volume_percent(&self) -> f64 {
        f64::from(self.audio.volume) / 63.0 * 100.0
    }

    pub fn battery_percent(&self) -> u8 {
        (self.energy.battery_soc * 100.0) as u8
    }

    pub fn can_drive(&self) -> bool {
        self.vehicle.ready_mode && self.connection.connected
    }

    /// "CHARGE", "DISCHARGE" or "IDLE".
    pub fn power_flow_direction(&self) -> &'static str {
        if self.energy.charging || self.energy.regen_active {
            "CHARGE"
        } else if self.energy.discharging {
            "DISCHARGE"
        } else {
            "IDLE"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = AppState::default();
        assert_eq!(s.audio.volume, 25);
        assert_eq!(s.climate.target_temp, 22.0);
        assert_eq!(s.vehicle.gear, GearPosition::Park);
        assert_eq!(s.vehicle.fuel_level, 30);
        assert_eq!(s.vehicle.lpg_level, 45);
        assert_eq!(s.vehicle.consumption_unit.as_str(), "L/h");
        assert_eq!(s.energy.battery_soc, 0.6);
        assert_eq!(s.display.power_chart_time_base, 60);
        assert_eq!(s.screen_brightness, 100);
        assert_eq!(s.ambient.hue, 180);
    }

    #[test]
    fn test_battery_power() {
        let mut e = EnergyState::default();
        assert_eq!(e.battery_power_kw(), None);
        e.hv_battery_voltage = Some(200.0);
        e.hv_battery_current = Some(-10.0);
        assert_eq!(e.battery_power_kw(), Some(-2.0));
    }

    #[test]
    fn test_flow_flags_from_byte() {
        let f = EnergyFlowFlags::from_byte(0x28);
        assert!(f.engine_to_wheels);
        assert!(f.motor_to_battery);
        assert!(!f.battery_to_motor);
        assert_eq!(f.raw, 0x28);
    }

    #[test]
    fn test_gear_markers() {
        for gear in [
            GearPosition::Park,
            GearPosition::Reverse,
            GearPosition::Neutral,
            GearPosition::Drive,
            GearPosition::B,
        ] {
            assert_eq!(GearPosition::from_marker(gear.as_str()), Some(gear));
        }
        assert_eq!(GearPosition::from_marker("?"), None);
    }

    #[test]
    fn test_touch_active_window() {
        let mut input = InputState::default();
        assert!(!input.touch_active(10.0));
        input.last_touch_time = 10.0;
        assert!(input.touch_active(10.4));
        assert!(!input.touch_active(10.6));
    }
}
