// src/io/avc/events.rs
//
// Payload parsers for bus-A input and status frames.
//
// Button frames (040 -> 200) use a fixed 5-byte layout:
//   [type] [modifier] [code hi] [code lo] [suffix]
// where type 0x28 is a press and 0x2A a release.
//
// Touch frames come in several lengths. The only fully confirmed layout is the
// 8-byte `00 21 24 78 x y x y` coordinate frame; everything else is matched by
// length with a lower confidence tag, and downstream code relies on those tags.

use serde::Serialize;

use super::classify::button_name;

/// Audio parameter frames carry `00 25 74 code value`.
pub const AUDIO_PARAM_PREFIX: [u8; 3] = [0x00, 0x25, 0x74];
/// Protocol value that maps to a display level of zero.
pub const AUDIO_CENTER: u8 = 0x10;

// ============================================================================
// Buttons
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ButtonEvent {
    pub is_press: bool,
    pub modifier: u8,
    pub code: u16,
    pub suffix: u8,
    pub name: String,
}

/// Parse a button frame. Returns `None` unless the type byte is press or release.
pub fn parse_button_event(data: &[u8]) -> Option<ButtonEvent> {
    if data.len() < 5 {
        return None;
    }
    let is_press = match data[0] {
        0x28 => true,
        0x2A => false,
        _ => return None,
    };
    let code = u16::from_be_bytes([data[2], data[3]]);
    Some(ButtonEvent {
        is_press,
        modifier: data[1],
        code,
        suffix: data[4],
        name: button_name(code),
    })
}

// ============================================================================
// Touch
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TouchKind {
    Press,
    Status,
    Tap,
    Unknown,
}

impl TouchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TouchKind::Press => "press",
            TouchKind::Status => "status",
            TouchKind::Tap => "tap",
            TouchKind::Unknown => "unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TouchConfidence {
    High,
    Medium,
    Low,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TouchEvent {
    pub kind: TouchKind,
    pub x: u8,
    pub y: u8,
    pub confidence: TouchConfidence,
    pub raw: Vec<u8>,
}

impl TouchEvent {
    fn new(kind: TouchKind, x: u8, y: u8, confidence: TouchConfidence, data: &[u8]) -> Self {
        Self {
            kind,
            x,
            y,
            confidence,
            raw: data.to_vec(),
        }
    }

    /// X as 0.0..=1.0
    pub fn normalized_x(&self) -> f64 {
        f64::from(self.x) / 255.0
    }

    /// Y as 0.0..=1.0
    pub fn normalized_y(&self) -> f64 {
        f64::from(self.y) / 255.0
    }
}

const TOUCH_COORD_PREFIX: [u8; 4] = [0x00, 0x21, 0x24, 0x78];

/// Parse a touch frame. Matchers run from the confirmed layout down to the
/// length-only fallbacks; the first match wins.
pub fn parse_touch_event(data: &[u8]) -> Option<TouchEvent> {
    use TouchConfidence::*;
    use TouchKind::*;

    if data.is_empty() {
        return None;
    }

    // Confirmed coordinate frame
    if data.len() >= 8 && data[..4] == TOUCH_COORD_PREFIX {
        return Some(TouchEvent::new(Press, data[4], data[5], High, data));
    }

    let event = match data.len() {
        13 if data[5] == 0x01 && data[6] == 0x21 => {
            TouchEvent::new(Press, data[7], data[9], Medium, data)
        }
        13 if data[5] == 0x11 && data[6] == 0x24 => TouchEvent::new(Status, 0, 0, Low, data),
        9 if data[5] == 0x11 && data[6] == 0x24 => TouchEvent::new(Status, 0, 0, Low, data),
        9 => TouchEvent::new(Unknown, data[0], data[1], Low, data),
        8 => {
            let x = if data[5] != 0 { data[5] } else { data[0] };
            TouchEvent::new(Press, x, data[6], Low, data)
        }
        5 => TouchEvent::new(Press, data[0], data[1], Low, data),
        4 | 3 => TouchEvent::new(Unknown, data[0], data[1], Low, data),
        2 => TouchEvent::new(Tap, data[0], data[1], Medium, data),
        _ => TouchEvent::new(Unknown, data[0], 0, Low, data),
    };
    Some(event)
}

// ============================================================================
// Audio Status
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioParam {
    Balance,
    Fade,
    Bass,
    Mid,
    Treble,
}

impl AudioParam {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x91 => Some(AudioParam::Balance),
            0x92 => Some(AudioParam::Fade),
            0x93 => Some(AudioParam::Bass),
            0x94 => Some(AudioParam::Mid),
            0x95 => Some(AudioParam::Treble),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            AudioParam::Balance => 0x91,
            AudioParam::Fade => 0x92,
            AudioParam::Bass => 0x93,
            AudioParam::Mid => 0x94,
            AudioParam::Treble => 0x95,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AudioParamStatus {
    pub param: AudioParam,
    pub raw_value: u8,
    /// raw - 0x10: -5..=5 for tone, -7..=7 for balance/fade
    pub display_value: i32,
}

/// Find the first `00 25 74 code value` run with a known parameter code.
pub fn parse_audio_status(data: &[u8]) -> Option<AudioParamStatus> {
    data.windows(5)
        .filter(|w| w[..3] == AUDIO_PARAM_PREFIX)
        .find_map(|w| {
            AudioParam::from_code(w[3]).map(|param| AudioParamStatus {
                param,
                raw_value: w[4],
                display_value: i32::from(w[4]) - i32::from(AUDIO_CENTER),
            })
        })
}

/// Volume level: the byte following the first 0x90.
pub fn parse_volume_status(data: &[u8]) -> Option<u8> {
    data.windows(2).find(|w| w[0] == 0x90).map(|w| w[1])
}

// ============================================================================
// Climate Panel State
// ============================================================================

/// Raw 10C -> 310 climate panel frame. Individual bytes are not yet understood.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClimateStateFrame {
    pub raw: Vec<u8>,
    pub byte4: u8,
    pub byte5: u8,
    pub byte6: u8,
    pub byte7: u8,
}

pub fn parse_climate_state(data: &[u8]) -> Option<ClimateStateFrame> {
    if data.len() < 8 {
        return None;
    }
    Some(ClimateStateFrame {
        raw: data.to_vec(),
        byte4: data[4],
        byte5: data[5],
        byte6: data[6],
        byte7: data[7],
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_press_and_release() {
        let press = parse_button_event(&[0x28, 0x00, 0x60, 0x44, 0x62]).unwrap();
        assert!(press.is_press);
        assert_eq!(press.code, 0x6044);
        assert_eq!(press.suffix, 0x62);
        assert_eq!(press.name, "STATUS");

        let release = parse_button_event(&[0x2A, 0x01, 0xC1, 0x04, 0x62]).unwrap();
        assert!(!release.is_press);
        assert_eq!(release.modifier, 0x01);
        assert_eq!(release.name, "AUDIO_2");
    }

    #[test]
    fn test_button_rejects_bad_frames() {
        assert!(parse_button_event(&[0x28, 0x00, 0x60, 0x44]).is_none());
        assert!(parse_button_event(&[0x11, 0x00, 0x60, 0x44, 0x62]).is_none());
    }

    #[test]
    fn test_touch_confirmed_frame_is_high_confidence() {
        let ev = parse_touch_event(&[0x00, 0x21, 0x24, 0x78, 0x40, 0x80, 0x40, 0x80]).unwrap();
        assert_eq!(ev.kind, TouchKind::Press);
        assert_eq!((ev.x, ev.y), (0x40, 0x80));
        assert_eq!(ev.confidence, TouchConfidence::High);
        assert!((ev.normalized_y() - 128.0 / 255.0).abs() < 1e-9);
    }

    #[test]
    fn test_touch_thirteen_byte_variants() {
        let mut data = [0u8; 13];
        data[5] = 0x01;
        data[6] = 0x21;
        data[7] = 10;
        data[9] = 20;
        let ev = parse_touch_event(&data).unwrap();
        assert_eq!((ev.kind, ev.x, ev.y), (TouchKind::Press, 10, 20));
        assert_eq!(ev.confidence, TouchConfidence::Medium);

        data[5] = 0x11;
        data[6] = 0x24;
        let ev = parse_touch_event(&data).unwrap();
        assert_eq!((ev.kind, ev.x, ev.y), (TouchKind::Status, 0, 0));
        assert_eq!(ev.confidence, TouchConfidence::Low);
    }

    #[test]
    fn test_touch_nine_byte_variants() {
        let status = [0, 0, 0, 0, 0, 0x11, 0x24, 0, 0];
        assert_eq!(parse_touch_event(&status).unwrap().kind, TouchKind::Status);

        let other = [7, 8, 0, 0, 0, 0, 0, 0, 0];
        let ev = parse_touch_event(&other).unwrap();
        assert_eq!((ev.kind, ev.x, ev.y), (TouchKind::Unknown, 7, 8));
    }

    #[test]
    fn test_touch_eight_byte_fallback_uses_byte0_when_x_zero() {
        let ev = parse_touch_event(&[9, 0, 0, 0, 0, 0, 33, 0]).unwrap();
        assert_eq!((ev.kind, ev.x, ev.y), (TouchKind::Press, 9, 33));
        assert_eq!(ev.confidence, TouchConfidence::Low);

        let ev = parse_touch_event(&[9, 0, 0, 0, 0, 44, 33, 0]).unwrap();
        assert_eq!(ev.x, 44);
    }

    #[test]
    fn test_touch_short_lengths() {
        let five = parse_touch_event(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!((five.kind, five.x, five.y), (TouchKind::Press, 1, 2));

        assert_eq!(parse_touch_event(&[1, 2, 3, 4]).unwrap().kind, TouchKind::Unknown);
        assert_eq!(parse_touch_event(&[1, 2, 3]).unwrap().kind, TouchKind::Unknown);

        let tap = parse_touch_event(&[5, 6]).unwrap();
        assert_eq!(tap.kind, TouchKind::Tap);
        assert_eq!(tap.confidence, TouchConfidence::Medium);

        let one = parse_touch_event(&[42]).unwrap();
        assert_eq!((one.kind, one.x, one.y), (TouchKind::Unknown, 42, 0));

        assert!(parse_touch_event(&[]).is_none());
    }

    #[test]
    fn test_audio_status_scan() {
        let status = parse_audio_status(&[0x74, 0x00, 0x25, 0x74, 0x93, 0x13]).unwrap();
        assert_eq!(status.param, AudioParam::Bass);
        assert_eq!(status.display_value, 3);

        let status = parse_audio_status(&[0x00, 0x25, 0x74, 0x91, 0x09]).unwrap();
        assert_eq!(status.param, AudioParam::Balance);
        assert_eq!(status.display_value, -7);

        assert!(parse_audio_status(&[0x00, 0x25, 0x74, 0x90, 0x20]).is_none());
        assert!(parse_audio_status(&[0x00, 0x25, 0x74, 0x93]).is_none());
    }

    #[test]
    fn test_volume_status() {
        assert_eq!(parse_volume_status(&[0x74, 0x31, 0xF1, 0x90, 0x1A]), Some(0x1A));
        assert_eq!(parse_volume_status(&[0x74, 0x90]), None);
    }

    #[test]
    fn test_climate_state_needs_eight_bytes() {
        assert!(parse_climate_state(&[0; 7]).is_none());
        let frame = parse_climate_state(&[0, 1, 2, 3, 4, 5, 6, 7]).unwrap();
        assert_eq!(frame.byte6, 6);
    }
}
