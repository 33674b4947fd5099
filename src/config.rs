// src/config.rs
//
// Runtime configuration for the twin, loaded from TOML. Every field has a
// default so an empty file is a valid development config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::io::serial::SerialSettings;
use crate::io::udp::UdpTarget;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Which ports the factory wires up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Serial gateway in both directions
    Production,
    /// Replay or mock input, logged output mirrored to UDP
    #[default]
    Development,
    /// Mock ports only
    Test,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_replay_speed")]
    pub speed: f64,
    #[serde(default)]
    pub loop_playback: bool,
    #[serde(default = "default_true")]
    pub realtime: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            file: None,
            speed: default_replay_speed(),
            loop_playback: false,
            realtime: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UdpConfig {
    #[serde(default)]
    pub targets: Vec<UdpTarget>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_max_messages")]
    pub max_messages_per_update: usize,
    #[serde(default = "default_max_cascades")]
    pub max_cascades: usize,
    #[serde(default = "default_command_interval")]
    pub command_min_interval_ms: u64,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_true")]
    pub log_commands: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_messages_per_update: default_max_messages(),
            max_cascades: default_max_cascades(),
            command_min_interval_ms: default_command_interval(),
            verbose: false,
            log_commands: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TwinConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default)]
    pub serial: SerialSettings,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub udp: UdpConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Persisted user settings (JSON)
    #[serde(default)]
    pub settings_file: Option<PathBuf>,
    /// Directory for per-run twin logs; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}
fn default_replay_speed() -> f64 {
    1.0
}
fn default_max_messages() -> usize {
    100
}
fn default_max_cascades() -> usize {
    crate::rules::DEFAULT_MAX_CASCADES
}
fn default_command_interval() -> u64 {
    crate::io::avc::queue::DEFAULT_MIN_INTERVAL_MS
}

impl TwinConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tlog!("[config] Loaded {} ({:?} mode)", path.display(), config.mode);
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: TwinConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.replay.speed < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "replay.speed must be >= 0, got {}",
                self.replay.speed
            )));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("serial.baud_rate must be non-zero".to_string()));
        }
        if self.pipeline.max_cascades == 0 {
            return Err(ConfigError::Invalid("pipeline.max_cascades must be non-zero".to_string()));
        }
        if self.pipeline.max_messages_per_update == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_messages_per_update must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TwinConfig::from_toml_str("").unwrap();
        assert_eq!(config.mode, ExecutionMode::Development);
        assert_eq!(config.serial.port, "/dev/ttyACM0");
        assert_eq!(config.serial.baud_rate, 1_000_000);
        assert_eq!(config.replay.speed, 1.0);
        assert!(config.replay.realtime);
        assert_eq!(config.pipeline.max_messages_per_update, 100);
        assert_eq!(config.pipeline.max_cascades, 10);
        assert_eq!(config.pipeline.command_min_interval_ms, 50);
        assert!(config.pipeline.log_commands);
        assert!(config.udp.targets.is_empty());
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_full_config() {
        let text = r#"
            mode = "production"
            settings_file = "/var/lib/cyberdeck/settings.json"
            log_dir = "/var/log/cyberdeck"

            [serial]
            port = "/dev/ttyUSB1"
            baud_rate = 115200

            [replay]
            file = "drive.ndjson"
            speed = 4.0
            loop_playback = true

            [[udp.targets]]
            host = "127.0.0.1"
            port = 5005
            device_ids = [1, 2]

            [pipeline]
            verbose = true
            max_cascades = 4
        "#;
        let config = TwinConfig::from_toml_str(text).unwrap();
        assert_eq!(config.mode, ExecutionMode::Production);
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/cyberdeck")));
        assert_eq!(config.serial.port, "/dev/ttyUSB1");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.data_bits, 8);
        assert_eq!(config.replay.file, Some(PathBuf::from("drive.ndjson")));
        assert!(config.replay.loop_playback);
        assert_eq!(config.udp.targets.len(), 1);
        assert!(config.udp.targets[0].device_ids.contains(&2));
        assert!(config.pipeline.verbose);
        assert_eq!(config.pipeline.max_cascades, 4);
        assert_eq!(config.pipeline.max_messages_per_update, 100);
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            TwinConfig::from_toml_str("[replay]\nspeed = -1.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            TwinConfig::from_toml_str("[pipeline]\nmax_cascades = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            TwinConfig::from_toml_str("[serial]\nbaud_rate = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            TwinConfig::from_toml_str("mode = \"flying\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mode = \"test\"").unwrap();
        let config = TwinConfig::load(file.path()).unwrap();
        assert_eq!(config.mode, ExecutionMode::Test);

        let missing = TwinConfig::load(Path::new("/nonexistent/cyberdeck.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
