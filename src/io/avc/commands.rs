// src/io/avc/commands.rs
//
// Bus-A command encoders.
//
// Frame layout on the bus is <master> <slave> <control> <data...>. Audio
// parameters go from the head unit (0x190) to the DSP amplifier (0x440) as
// `00 25 74 code value`; display levels map onto protocol values around a
// center of 0x10. Climate commands come from the MFD (0x110) or the button
// input address (0x040).
//
// `decode_command` is the inverse: given a decoded frame it recovers the
// typed intent with display-level values.

use serde::Serialize;
use serde_json::{json, Value};

use super::codec::AvcMessage;
use super::events::{AudioParam, AUDIO_CENTER, AUDIO_PARAM_PREFIX};
use crate::io::DEVICE_AVC;

// ============================================================================
// Addresses and Ranges
// ============================================================================

pub const ADDR_BUTTON_INPUT: u16 = 0x040;
pub const ADDR_EMV: u16 = 0x110;
pub const ADDR_AC_AMP: u16 = 0x130;
pub const ADDR_NAVI: u16 = 0x178;
pub const ADDR_AUDIO_HU: u16 = 0x190;
pub const ADDR_CLIMATE: u16 = 0x310;
pub const ADDR_DSP_AMP: u16 = 0x440;

pub const CTRL_REQUEST: u8 = 0x00;
pub const CTRL_COMMAND: u8 = 0x01;
pub const CTRL_DATA_CMD: u8 = 0x0F;

const CODE_SET_VOLUME: u8 = 0x90;
const CODE_VOLUME_UP: u8 = 0x9C;
const CODE_VOLUME_DOWN: u8 = 0x9D;
const CODE_MUTE: u8 = 0x9E;

const TONE_MIN: u8 = 0x0B;
const TONE_MAX: u8 = 0x15;
const BALANCE_MIN: u8 = 0x09;
const BALANCE_MAX: u8 = 0x17;
const VOLUME_MAX: u8 = 63;
const VOLUME_STEP_MIN: u8 = 1;
const VOLUME_STEP_MAX: u8 = 4;

/// Temperature byte for LO (below 18 °C)
const TEMP_LO: u8 = 0x00;
/// Temperature byte for HI (above 30 °C)
const TEMP_HI: u8 = 0x37;
/// Temperature byte for 65 °F; one step per °F
const TEMP_BASE: u8 = 0x22;
const TEMP_BASE_F: f64 = 65.0;
const TEMP_LO_C: f64 = 18.0;
const TEMP_HI_C: f64 = 30.0;

const CLIMATE_BTN_TEMP_UP: u8 = 0x01;
const CLIMATE_BTN_TEMP_DOWN: u8 = 0x02;
const CLIMATE_BTN_AC: u8 = 0x05;
const CLIMATE_BTN_AUTO: u8 = 0x06;
const CLIMATE_BTN_RECIRC: u8 = 0x07;

// ============================================================================
// Command
// ============================================================================

/// One bus-A frame to transmit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AvcCommand {
    pub master: u16,
    pub slave: u16,
    pub control: u8,
    pub data: Vec<u8>,
}

impl AvcCommand {
    pub fn new(master: u16, slave: u16, control: u8, data: Vec<u8>) -> Self {
        Self {
            master,
            slave,
            control,
            data,
        }
    }

    /// Bus-A payload: `{"m": "190", "s": "440", "c": 15, "d": ["00", "25", ...]}`
    pub fn to_payload(&self) -> Value {
        json!({
            "m": format!("{:03X}", self.master),
            "s": format!("{:03X}", self.slave),
            "c": self.control,
            "d": self.data.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>(),
        })
    }

    /// Gateway frame: `{"id": 2, "d": payload}`
    pub fn to_gateway_json(&self) -> Value {
        json!({
            "id": DEVICE_AVC,
            "d": self.to_payload(),
        })
    }
}

fn audio_param(code: u8, value: u8) -> AvcCommand {
    let mut data = AUDIO_PARAM_PREFIX.to_vec();
    data.extend_from_slice(&[code, value]);
    AvcCommand::new(ADDR_AUDIO_HU, ADDR_DSP_AMP, CTRL_DATA_CMD, data)
}

fn centered(level: i32, min: u8, max: u8) -> u8 {
    (i32::from(AUDIO_CENTER) + level).clamp(i32::from(min), i32::from(max)) as u8
}

fn climate_button(master: u16, button: u8) -> AvcCommand {
    AvcCommand::new(
        master,
        ADDR_CLIMATE,
        CTRL_COMMAND,
        vec![0x28, 0x00, 0x10, button, 0x62],
    )
}

// ============================================================================
// Audio
// ============================================================================

/// Direct volume set, 0..=63. Not every amplifier honours it.
pub fn set_volume(level: i32) -> AvcCommand {
    audio_param(CODE_SET_VOLUME, level.clamp(0, i32::from(VOLUME_MAX)) as u8)
}

/// Volume up by 1..=4 steps.
pub fn volume_up(step: i32) -> AvcCommand {
    let step = step.clamp(i32::from(VOLUME_STEP_MIN), i32::from(VOLUME_STEP_MAX)) as u8;
    audio_param(CODE_VOLUME_UP, step)
}

/// Volume down by 1..=4 steps.
pub fn volume_down(step: i32) -> AvcCommand {
    let step = step.clamp(i32::from(VOLUME_STEP_MIN), i32::from(VOLUME_STEP_MAX)) as u8;
    audio_param(CODE_VOLUME_DOWN, step)
}

pub fn mute_toggle() -> AvcCommand {
    audio_param(CODE_MUTE, 0x01)
}

/// Bass -5..=5 (0x0B..=0x15)
pub fn set_bass(level: i32) -> AvcCommand {
    audio_param(AudioParam::Bass.code(), centered(level, TONE_MIN, TONE_MAX))
}

/// Mid -5..=5 (0x0B..=0x15)
pub fn set_mid(level: i32) -> AvcCommand {
    audio_param(AudioParam::Mid.code(), centered(level, TONE_MIN, TONE_MAX))
}

/// Treble -5..=5 (0x0B..=0x15)
pub fn set_treble(level: i32) -> AvcCommand {
    audio_param(AudioParam::Treble.code(), centered(level, TONE_MIN, TONE_MAX))
}

/// Balance -7 (left) ..= 7 (right)
pub fn set_balance(level: i32) -> AvcCommand {
    audio_param(AudioParam::Balance.code(), centered(level, BALANCE_MIN, BALANCE_MAX))
}

/// Fader -7 (front) ..= 7 (rear)
pub fn set_fader(level: i32) -> AvcCommand {
    audio_param(AudioParam::Fade.code(), centered(level, BALANCE_MIN, BALANCE_MAX))
}

/// Speaker beep, 1..=4
pub fn beep(duration: i32) -> AvcCommand {
    AvcCommand::new(
        ADDR_EMV,
        ADDR_DSP_AMP,
        CTRL_DATA_CMD,
        vec![0x00, 0x5E, 0x29, 0x60, duration.clamp(1, 4) as u8],
    )
}

// ============================================================================
// Climate
// ============================================================================

/// Encode a target temperature as the A/C amplifier's °F-stepped byte.
pub fn encode_temperature(temp_c: f64) -> u8 {
    if temp_c < TEMP_LO_C {
        return TEMP_LO;
    }
    if temp_c > TEMP_HI_C {
        return TEMP_HI;
    }
    let delta_f = (temp_c * 1.8 + 32.0 - TEMP_BASE_F).round_ties_even() as i32;
    (i32::from(TEMP_BASE) + delta_f).clamp(0x10, 0x36) as u8
}

/// Inverse of `encode_temperature`, rounded to the nearest 0.5 °C.
pub fn decode_temperature(value: u8) -> f64 {
    match value {
        TEMP_LO => TEMP_LO_C,
        TEMP_HI => TEMP_HI_C,
        v => {
            let temp_f = f64::from(v) - f64::from(TEMP_BASE) + TEMP_BASE_F;
            ((temp_f - 32.0) / 1.8 * 2.0).round() / 2.0
        }
    }
}

pub fn set_target_temp(temp_c: f64) -> AvcCommand {
    AvcCommand::new(
        ADDR_EMV,
        ADDR_AC_AMP,
        CTRL_REQUEST,
        vec![0x03, encode_temperature(temp_c)],
    )
}

/// Fan speed 0..=7
pub fn set_fan_speed(speed: i32) -> AvcCommand {
    AvcCommand::new(
        ADDR_EMV,
        ADDR_CLIMATE,
        CTRL_COMMAND,
        vec![0x22, speed.clamp(0, 7) as u8],
    )
}

/// 0 face, 1 face+feet, 2 feet, 3 defrost
pub fn set_air_direction(direction: i32) -> AvcCommand {
    AvcCommand::new(
        ADDR_EMV,
        ADDR_CLIMATE,
        CTRL_COMMAND,
        vec![0x23, direction.clamp(0, 3) as u8],
    )
}

pub fn climate_temp_up() -> AvcCommand {
    climate_button(ADDR_EMV, CLIMATE_BTN_TEMP_UP)
}

pub fn climate_temp_down() -> AvcCommand {
    climate_button(ADDR_EMV, CLIMATE_BTN_TEMP_DOWN)
}

pub fn climate_ac_toggle() -> AvcCommand {
    climate_button(ADDR_BUTTON_INPUT, CLIMATE_BTN_AC)
}

pub fn climate_auto_toggle() -> AvcCommand {
    climate_button(ADDR_BUTTON_INPUT, CLIMATE_BTN_AUTO)
}

pub fn climate_recirc_toggle() -> AvcCommand {
    climate_button(ADDR_BUTTON_INPUT, CLIMATE_BTN_RECIRC)
}

// ============================================================================
// Touch
// ============================================================================

/// Inject a touch at (x, y), both 0..=255.
pub fn touch_press(x: i32, y: i32) -> AvcCommand {
    let x = x.clamp(0, 255) as u8;
    let y = y.clamp(0, 255) as u8;
    AvcCommand::new(
        ADDR_EMV,
        ADDR_NAVI,
        CTRL_DATA_CMD,
        vec![0x00, 0x21, 0x24, 0x78, x, y, x, y],
    )
}

// ============================================================================
// Decode Mirror
// ============================================================================

/// A command recovered from a frame, in display units.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "intent", content = "value", rename_all = "snake_case")]
pub enum CommandIntent {
    SetVolume(u8),
    VolumeUp(u8),
    VolumeDown(u8),
    MuteToggle,
    SetBass(i32),
    SetMid(i32),
    SetTreble(i32),
    SetBalance(i32),
    SetFader(i32),
    Beep(u8),
    SetTargetTemp(f64),
    SetFanSpeed(u8),
    SetAirDirection(u8),
    TempUp,
    TempDown,
    AcToggle,
    AutoToggle,
    RecircToggle,
    TouchPress { x: u8, y: u8 },
}

/// Recover the typed command carried by a frame, if it is one we encode.
pub fn decode_command(msg: &AvcMessage) -> Option<CommandIntent> {
    let d = msg.data.as_slice();
    match (msg.master_addr, msg.slave_addr) {
        (ADDR_AUDIO_HU, ADDR_DSP_AMP) => decode_audio_param(d),
        (ADDR_EMV, ADDR_DSP_AMP) => match d {
            [0x00, 0x5E, 0x29, 0x60, n] => Some(CommandIntent::Beep(*n)),
            _ => None,
        },
        (ADDR_EMV, ADDR_AC_AMP) => match d {
            [0x03, v] => Some(CommandIntent::SetTargetTemp(decode_temperature(*v))),
            _ => None,
        },
        (ADDR_EMV, ADDR_CLIMATE) => match d {
            [0x22, s] => Some(CommandIntent::SetFanSpeed(*s)),
            [0x23, dir] => Some(CommandIntent::SetAirDirection(*dir)),
            [0x28, 0x00, 0x10, CLIMATE_BTN_TEMP_UP, 0x62] => Some(CommandIntent::TempUp),
            [0x28, 0x00, 0x10, CLIMATE_BTN_TEMP_DOWN, 0x62] => Some(CommandIntent::TempDown),
            _ => None,
        },
        (ADDR_BUTTON_INPUT, ADDR_CLIMATE) => match d {
            [0x28, 0x00, 0x10, CLIMATE_BTN_AC, 0x62] => Some(CommandIntent::AcToggle),
            [0x28, 0x00, 0x10, CLIMATE_BTN_AUTO, 0x62] => Some(CommandIntent::AutoToggle),
            [0x28, 0x00, 0x10, CLIMATE_BTN_RECIRC, 0x62] => Some(CommandIntent::RecircToggle),
            _ => None,
        },
        (ADDR_EMV, ADDR_NAVI) => match d {
            [0x00, 0x21, 0x24, 0x78, x, y, ..] => Some(CommandIntent::TouchPress { x: *x, y: *y }),
            _ => None,
        },
        _ => None,
    }
}

fn decode_audio_param(d: &[u8]) -> Option<CommandIntent> {
    if d.len() != 5 || d[..3] != AUDIO_PARAM_PREFIX {
        return None;
    }
    let (code, value) = (d[3], d[4]);
    let level = i32::from(value) - i32::from(AUDIO_CENTER);
    let intent = match code {
        CODE_SET_VOLUME => CommandIntent::SetVolume(value),
        CODE_VOLUME_UP => CommandIntent::VolumeUp(value),
        CODE_VOLUME_DOWN => CommandIntent::VolumeDown(value),
        CODE_MUTE => CommandIntent::MuteToggle,
        _ => match AudioParam::from_code(code)? {
            AudioParam::Bass => CommandIntent::SetBass(level),
            AudioParam::Mid => CommandIntent::SetMid(level),
            AudioParam::Treble => CommandIntent::SetTreble(level),
            AudioParam::Balance => CommandIntent::SetBalance(level),
            AudioParam::Fade => CommandIntent::SetFader(level),
        },
    };
    Some(intent)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::avc::codec::decode_message;

    fn round_trip(cmd: &AvcCommand) -> Option<CommandIntent> {
        let msg = decode_message(&cmd.to_gateway_json())?;
        decode_command(&msg)
    }

    #[test]
    fn test_wire_format() {
        let wire = set_bass(3).to_gateway_json();
        assert_eq!(
            wire,
            json!({"id": 2, "d": {"m": "190", "s": "440", "c": 15, "d": ["00", "25", "74", "93", "13"]}})
        );
        assert_eq!(set_fan_speed(2).to_payload()["m"], "110");
        assert_eq!(climate_ac_toggle().to_payload()["m"], "040");
    }

    #[test]
    fn test_tone_clamps() {
        assert_eq!(set_bass(-5).data[4], 0x0B);
        assert_eq!(set_treble(5).data[4], 0x15);
        assert_eq!(set_mid(10).data[4], 0x15);
        assert_eq!(set_balance(-9).data[4], 0x09);
        assert_eq!(set_fader(7).data[4], 0x17);
        assert_eq!(volume_up(9).data[4], 4);
        assert_eq!(volume_down(0).data[4], 1);
        assert_eq!(set_volume(99).data[4], 63);
    }

    #[test]
    fn test_round_trip_audio() {
        assert_eq!(round_trip(&set_bass(3)), Some(CommandIntent::SetBass(3)));
        assert_eq!(round_trip(&set_bass(10)), Some(CommandIntent::SetBass(5)));
        assert_eq!(round_trip(&set_mid(-2)), Some(CommandIntent::SetMid(-2)));
        assert_eq!(round_trip(&set_treble(-8)), Some(CommandIntent::SetTreble(-5)));
        assert_eq!(round_trip(&set_balance(-7)), Some(CommandIntent::SetBalance(-7)));
        assert_eq!(round_trip(&set_fader(12)), Some(CommandIntent::SetFader(7)));
        assert_eq!(round_trip(&set_volume(30)), Some(CommandIntent::SetVolume(30)));
        assert_eq!(round_trip(&volume_up(2)), Some(CommandIntent::VolumeUp(2)));
        assert_eq!(round_trip(&volume_down(3)), Some(CommandIntent::VolumeDown(3)));
        assert_eq!(round_trip(&mute_toggle()), Some(CommandIntent::MuteToggle));
        assert_eq!(round_trip(&beep(7)), Some(CommandIntent::Beep(4)));
    }

    #[test]
    fn test_round_trip_climate() {
        for temp in [18.0, 20.0, 22.0, 25.0, 28.0] {
            assert_eq!(round_trip(&set_target_temp(temp)), Some(CommandIntent::SetTargetTemp(temp)));
        }
        assert_eq!(round_trip(&set_target_temp(10.0)), Some(CommandIntent::SetTargetTemp(18.0)));
        assert_eq!(round_trip(&set_target_temp(35.0)), Some(CommandIntent::SetTargetTemp(30.0)));
        assert_eq!(round_trip(&set_fan_speed(9)), Some(CommandIntent::SetFanSpeed(7)));
        assert_eq!(round_trip(&set_air_direction(3)), Some(CommandIntent::SetAirDirection(3)));
        assert_eq!(round_trip(&climate_temp_up()), Some(CommandIntent::TempUp));
        assert_eq!(round_trip(&climate_temp_down()), Some(CommandIntent::TempDown));
        assert_eq!(round_trip(&climate_ac_toggle()), Some(CommandIntent::AcToggle));
        assert_eq!(round_trip(&climate_auto_toggle()), Some(CommandIntent::AutoToggle));
        assert_eq!(round_trip(&climate_recirc_toggle()), Some(CommandIntent::RecircToggle));
    }

    #[test]
    fn test_temperature_encoding() {
        assert_eq!(encode_temperature(17.9), 0x00);
        assert_eq!(encode_temperature(30.1), 0x37);
        assert_eq!(encode_temperature(22.0), 0x29);
    }

    #[test]
    fn test_round_trip_touch() {
        assert_eq!(
            round_trip(&touch_press(300, -4)),
            Some(CommandIntent::TouchPress { x: 255, y: 0 })
        );
    }

    #[test]
    fn test_unrelated_frame_is_not_a_command() {
        let msg = decode_message(&json!({"m": "190", "s": "440", "d": ["01", "02"]})).unwrap();
        assert_eq!(decode_command(&msg), None);
    }
}
