// src/settings.rs
//
// Persisted user settings (JSON). Read once at startup and replayed into the
// store as `Internal` actions, so restoring them never echoes onto the bus.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::state::{Action, ActionKind, AmbientColor};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AudioSettings {
    #[serde(default = "default_volume")]
    pub volume: i32,
    #[serde(default)]
    pub bass: i32,
    #[serde(default)]
    pub treble: i32,
    #[serde(default)]
    pub balance: i32,
    #[serde(default)]
    pub fader: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClimateSettings {
    #[serde(default = "default_target_temp")]
    pub target_temp: f64,
    #[serde(default)]
    pub fan_speed: i32,
    #[serde(default)]
    pub ac: bool,
    #[serde(default)]
    pub recirculation: bool,
    #[serde(default)]
    pub air_direction: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AmbientSettings {
    #[serde(default = "default_hue")]
    pub hue: u16,
    #[serde(default = "default_saturation")]
    pub saturation: u8,
    #[serde(default = "default_ambient_brightness")]
    pub brightness: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserSettings {
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub climate: ClimateSettings,
    #[serde(default)]
    pub ambient: AmbientSettings,
    #[serde(default = "default_display_brightness")]
    pub display_brightness: u8,
}

fn default_volume() -> i32 {
    25
}
fn default_target_temp() -> f64 {
    22.0
}
fn default_hue() -> u16 {
    180
}
fn default_saturation() -> u8 {
    100
}
fn default_ambient_brightness() -> u8 {
    50
}
fn default_display_brightness() -> u8 {
    100
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            bass: 0,
            treble: 0,
            balance: 0,
            fader: 0,
        }
    }
}

impl Default for ClimateSettings {
    fn default() -> Self {
        Self {
            target_temp: default_target_temp(),
            fan_speed: 0,
            ac: false,
            recirculation: false,
            air_direction: 0,
        }
    }
}

impl Default for AmbientSettings {
    fn default() -> Self {
        Self {
            hue: default_hue(),
            saturation: default_saturation(),
            brightness: default_ambient_brightness(),
        }
    }
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            audio: AudioSettings::default(),
            climate: ClimateSettings::default(),
            ambient: AmbientSettings::default(),
            display_brightness: default_display_brightness(),
        }
    }
}

impl UserSettings {
    /// Actions that restore these settings into a fresh store.
    pub fn startup_actions(&self) -> Vec<Action> {
        let kinds = vec![
            ActionKind::SetVolume(self.audio.volume),
            ActionKind::SetBass(self.audio.bass),
            ActionKind::SetTreble(self.audio.treble),
            ActionKind::SetBalance(self.audio.balance),
            ActionKind::SetFader(self.audio.fader),
            ActionKind::SetTargetTemp(self.climate.target_temp),
            ActionKind::SetFanSpeed(self.climate.fan_speed),
            ActionKind::SetAc(self.climate.ac),
            ActionKind::SetRecirculation(self.climate.recirculation),
            ActionKind::SetAirDirection(self.climate.air_direction),
            ActionKind::SetAmbientColor(AmbientColor {
                hue: self.ambient.hue,
                saturation: self.ambient.saturation,
                brightness: self.ambient.brightness,
            }),
            ActionKind::SetScreenBrightness(self.display_brightness),
        ];
        kinds.into_iter().map(Action::internal).collect()
    }
}

/// Source of persisted settings.
pub trait SettingsLoader {
    fn load(&self) -> Result<UserSettings, String>;
}

/// Reads settings from a JSON file. A missing file yields defaults.
#[derive(Debug, Clone)]
pub struct JsonSettingsLoader {
    path: PathBuf,
}

impl JsonSettingsLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsLoader for JsonSettingsLoader {
    fn load(&self) -> Result<UserSettings, String> {
        if !self.path.exists() {
            tlog!("[settings] {} not found, using defaults", self.path.display());
            return Ok(UserSettings::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| format!("Failed to read settings file: {}", e))?;
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse settings file: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ActionSource, Store};

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = JsonSettingsLoader::new(dir.path().join("settings.json"));
        assert_eq!(loader.load().unwrap(), UserSettings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"audio": {"volume": 40}, "display_brightness": 70}"#).unwrap();

        let settings = JsonSettingsLoader::new(&path).load().unwrap();
        assert_eq!(settings.audio.volume, 40);
        assert_eq!(settings.audio.bass, 0);
        assert_eq!(settings.climate.target_temp, 22.0);
        assert_eq!(settings.display_brightness, 70);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(JsonSettingsLoader::new(&path).load().is_err());
    }

    #[test]
    fn test_startup_actions_restore_state() {
        let mut settings = UserSettings::default();
        settings.audio.volume = 33;
        settings.climate.fan_speed = 4;
        settings.climate.air_direction = 3;
        settings.ambient.hue = 400;

        let actions = settings.startup_actions();
        assert!(actions.iter().all(|a| a.source == ActionSource::Internal));

        let mut store = Store::default();
        for action in actions {
            store.dispatch(action);
        }
        let state = store.state();
        assert_eq!(state.audio.volume, 33);
        assert_eq!(state.climate.fan_speed, 4);
        assert!(state.climate.defrost);
        assert_eq!(state.ambient.hue, 40);
    }
}
