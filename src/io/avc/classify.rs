// src/io/avc/classify.rs
//
// Bus-A message classification and address naming.
//
// Classification is an ordered, first-match-wins rule list over
// (master, slave, data). The order matters: several address pairs would match
// more than one rule, e.g. 0x110 -> 0x490 is system-status and never reaches
// the MFD rule further down.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

// ============================================================================
// Classification
// ============================================================================

/// Closed set of bus-A message classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageClass {
    PowerStatus,
    ClimateState,
    ButtonPress,
    DisplayControl,
    SystemStatus,
    TouchEvent,
    AudioControl,
    Broadcast,
    Unknown,
}

impl MessageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageClass::PowerStatus => "power_status",
            MessageClass::ClimateState => "climate_state",
            MessageClass::ButtonPress => "button_press",
            MessageClass::DisplayControl => "display_control",
            MessageClass::SystemStatus => "system_status",
            MessageClass::TouchEvent => "touch_event",
            MessageClass::AudioControl => "audio_control",
            MessageClass::Broadcast => "broadcast",
            MessageClass::Unknown => "unknown",
        }
    }
}

/// Classify a bus-A message by its address pair and payload.
pub fn classify_message(master: u16, slave: u16, data: &[u8]) -> MessageClass {
    if master == 0x400 && slave == 0x020 {
        return MessageClass::PowerStatus;
    }
    if master == 0x10C && slave == 0x310 {
        return MessageClass::ClimateState;
    }
    if master == 0x040 && slave == 0x200 && data.len() >= 5 {
        return MessageClass::ButtonPress;
    }
    if slave == 0x660 {
        return MessageClass::DisplayControl;
    }
    if slave == 0x490 {
        return MessageClass::SystemStatus;
    }
    if matches!(master, 0x110 | 0x112) && slave == 0x178 {
        return MessageClass::TouchEvent;
    }
    if master == 0x000 && matches!(slave, 0x114 | 0x178) {
        return MessageClass::TouchEvent;
    }
    if matches!(slave, 0x440 | 0x480) {
        return MessageClass::AudioControl;
    }
    if matches!(slave, 0xFFF | 0x1FF) {
        return MessageClass::Broadcast;
    }
    MessageClass::Unknown
}

// ============================================================================
// Device Table
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Emv,
    AudioHu,
    DspAmp,
    Amp,
    Navi,
    Tuner,
    CdChanger,
    Panel,
    Steering,
    Camera,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub address: u16,
    pub name: &'static str,
    pub device_type: DeviceType,
    pub description: &'static str,
}

/// Known logical devices. 0x190 is the head unit on the Prius, 0x160 on the Corolla.
static DEVICES: Lazy<HashMap<u16, DeviceInfo>> = Lazy::new(|| {
    use DeviceType::*;
    let table: &[(u16, &str, DeviceType, &str)] = &[
        (0x110, "EMV", Emv, "Multi-Function Display (MFD)"),
        (0x112, "EMV2", Emv, "MFD Secondary"),
        (0x120, "AVX", AudioHu, "Audio/Video System"),
        (0x128, "1DIN_TV", Emv, "1-DIN TV"),
        (0x140, "AVN", Navi, "Audio/Video/Navigation"),
        (0x144, "GBOOK", Navi, "G-BOOK"),
        (0x160, "AUDIO_HU", AudioHu, "Audio Head Unit (Corolla)"),
        (0x178, "NAVI", Navi, "Navigation ECU"),
        (0x17C, "MONET", Navi, "MONET"),
        (0x17D, "TEL", Unknown, "Telephone"),
        (0x180, "RR_TV", Emv, "Rear TV"),
        (0x190, "AUDIO_HU", AudioHu, "Audio Head Unit (Prius)"),
        (0x1A0, "DVD_P", CdChanger, "DVD Player"),
        (0x1AC, "CAMERA_C", Camera, "Camera Controller"),
        (0x1C0, "RR_CONT", Panel, "Rear Controller"),
        (0x1C2, "TV_TUNER2", Tuner, "TV Tuner 2"),
        (0x1C4, "PANEL", Panel, "Control Panel"),
        (0x1C6, "GW", Unknown, "Gateway ECU"),
        (0x1C8, "FM_M_LCD", Emv, "FM Multi LCD"),
        (0x1CC, "ST_WHEEL", Steering, "Steering Wheel Controls"),
        (0x1D6, "CLOCK", Unknown, "Clock"),
        (0x1D8, "CONT_SW", Panel, "Control Switch (CONT-SW)"),
        (0x1EC, "BODY", Unknown, "Body ECU"),
        (0x1F0, "TUNER", Tuner, "Radio Tuner"),
        (0x1F1, "XM", Tuner, "XM Radio"),
        (0x1F2, "SIRIUS", Tuner, "Sirius Radio"),
        (0x1F4, "RSA", Unknown, "RSA"),
        (0x1F6, "RSE", Unknown, "RSE"),
        (0x230, "TV_TUNER", Tuner, "TV Tuner"),
        (0x240, "CD_CH2", CdChanger, "CD Changer 2"),
        (0x250, "DVD_CH", CdChanger, "DVD Changer"),
        (0x280, "CAMERA", Camera, "Camera"),
        (0x360, "CD_CH1", CdChanger, "CD Changer 1"),
        (0x3A0, "MD_CH", CdChanger, "MiniDisc Changer"),
        (0x440, "DSP_AMP", DspAmp, "DSP Amplifier (JBL)"),
        (0x480, "AMP", Amp, "Amplifier"),
        (0x530, "ETC", Unknown, "ETC"),
        (0x5C8, "MAYDAY", Unknown, "Mayday System"),
    ];
    table
        .iter()
        .map(|&(address, name, device_type, description)| {
            (
                address,
                DeviceInfo {
                    address,
                    name,
                    device_type,
                    description,
                },
            )
        })
        .collect()
});

/// Functional addresses observed on the Prius Gen 2 that are not logical devices.
static PRIUS_ADDRESSES: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    [
        (0x002, "System Control"),
        (0x010, "Power Control"),
        (0x020, "Power Status"),
        (0x040, "Button Input"),
        (0x080, "Status"),
        (0x088, "Climate Status"),
        (0x092, "System Status"),
        (0x100, "Device Query"),
        (0x10C, "Climate Control"),
        (0x114, "ECU Data"),
        (0x182, "ECU Status"),
        (0x200, "Display/Touch"),
        (0x218, "Audio Control"),
        (0x228, "Audio Processing"),
        (0x258, "System Controller"),
        (0x310, "HVAC"),
        (0x400, "Power/Wake"),
        (0x430, "Climate Buttons"),
        (0x490, "System Status Sink"),
        (0x660, "Display Control"),
        (0x800, "Extended"),
        (0xA00, "Broadcast Source"),
    ]
    .into_iter()
    .collect()
});

pub fn device_info(addr: u16) -> Option<&'static DeviceInfo> {
    DEVICES.get(&addr)
}

/// Human-readable name for an address, falling back to `0xXXX`.
pub fn device_name(addr: u16) -> String {
    if let Some(info) = DEVICES.get(&addr) {
        return info.name.to_string();
    }
    if let Some(name) = PRIUS_ADDRESSES.get(&addr) {
        return (*name).to_string();
    }
    format!("0x{:03X}", addr)
}

// ============================================================================
// Button Names
// ============================================================================

/// Human-readable name for a button code, falling back to `BTN_XXXX`.
pub fn button_name(code: u16) -> String {
    let name = match code {
        0x6044 => "STATUS",
        0x6024 => "STATUS_ALT",
        0x6184 => "AUDIO_1",
        0xC104 => "AUDIO_2",
        0x30A4 => "SEEK",
        0x0005 => "MENU",
        _ => return format!("BTN_{:04X}", code),
    };
    name.to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_fixed_pairs() {
        assert_eq!(classify_message(0x400, 0x020, &[0x01]), MessageClass::PowerStatus);
        assert_eq!(classify_message(0x10C, 0x310, &[0x00]), MessageClass::ClimateState);
        assert_eq!(
            classify_message(0x040, 0x200, &[0x28, 0x00, 0x60, 0x44, 0x62]),
            MessageClass::ButtonPress
        );
        assert_eq!(classify_message(0x190, 0x660, &[0x00]), MessageClass::DisplayControl);
        assert_eq!(classify_message(0x000, 0x114, &[0x00]), MessageClass::TouchEvent);
        assert_eq!(classify_message(0x112, 0x178, &[0x00]), MessageClass::TouchEvent);
        assert_eq!(classify_message(0x190, 0x440, &[0x00]), MessageClass::AudioControl);
        assert_eq!(classify_message(0x190, 0x480, &[0x00]), MessageClass::AudioControl);
        assert_eq!(classify_message(0x190, 0xFFF, &[0x00]), MessageClass::Broadcast);
        assert_eq!(classify_message(0x190, 0x1FF, &[0x00]), MessageClass::Broadcast);
        assert_eq!(classify_message(0x123, 0x456, &[0x00]), MessageClass::Unknown);
    }

    #[test]
    fn test_classify_order_short_button_frame_falls_through() {
        // 040 -> 200 with fewer than 5 bytes is not a button press
        assert_eq!(classify_message(0x040, 0x200, &[0x28, 0x00]), MessageClass::Unknown);
    }

    #[test]
    fn test_classify_order_system_status_wins_over_mfd() {
        assert_eq!(classify_message(0x110, 0x490, &[0x00]), MessageClass::SystemStatus);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let data = [0x00, 0x25, 0x74, 0x93, 0x13];
        let first = classify_message(0x190, 0x440, &data);
        for _ in 0..10 {
            assert_eq!(classify_message(0x190, 0x440, &data), first);
        }
    }

    #[test]
    fn test_device_names() {
        assert_eq!(device_name(0x190), "AUDIO_HU");
        assert_eq!(device_name(0x440), "DSP_AMP");
        assert_eq!(device_name(0x310), "HVAC");
        assert_eq!(device_name(0x7AB), "0x7AB");
        assert_eq!(device_info(0x1CC).unwrap().device_type, DeviceType::Steering);
    }

    #[test]
    fn test_button_names() {
        assert_eq!(button_name(0x6044), "STATUS");
        assert_eq!(button_name(0x0005), "MENU");
        assert_eq!(button_name(0x1234), "BTN_1234");
    }
}
