//! Configuration management for Midimix GW
//!
//! Handles loading, parsing and validation of the YAML configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::audio::ObjectKind;

/// Directory name under the user config directory
pub const APP_DIR: &str = "midimix-gw";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub midi: MidiConfig,
    #[serde(default)]
    pub pulseaudio: PulseAudioConfig,
}

/// MIDI port configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    pub input_port: String,
    pub output_port: String,
    /// MIDI channel (1-16) the surface talks on
    #[serde(default = "default_channel")]
    pub channel: u8,
    /// Raw value of a control at its maximum position
    #[serde(default = "default_max_input_value")]
    pub max_input_value: u8,
}

/// Audio server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PulseAudioConfig {
    /// `pactl` executable
    #[serde(default = "default_pactl")]
    pub pactl: String,
    /// Delay before the second bootstrap pass
    #[serde(default = "default_rebootstrap_delay_ms")]
    pub rebootstrap_delay_ms: u64,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl Default for PulseAudioConfig {
    fn default() -> Self {
        Self {
            pactl: default_pactl(),
            rebootstrap_delay_ms: default_rebootstrap_delay_ms(),
            targets: Vec::new(),
        }
    }
}

/// One binding between an audio server object and surface controls
///
/// Indicators are LED note numbers, controls are CC numbers (volume) or
/// button note numbers (mute, default).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TargetConfig {
    pub kind: ObjectKind,
    /// Application name (streams) or device description (devices)
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_indicator: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mute_indicator: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_control: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mute_control: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_indicator: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_control: Option<u8>,
}

impl TargetConfig {
    /// Minimal target with no assignments
    pub fn new(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            presence_indicator: None,
            mute_indicator: None,
            volume_control: None,
            mute_control: None,
            default_indicator: None,
            default_control: None,
        }
    }
}

impl AppConfig {
    /// Default config file location (`~/.config/midimix-gw/config.yaml` on Linux)
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.yaml")
    }

    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;

        config.validate()?;

        for (first, second) in config.duplicate_targets() {
            let target = &config.pulseaudio.targets[second];
            tracing::warn!(
                "Target {} ({} '{}') duplicates target {} and will never match",
                second,
                target.kind,
                target.name,
                first
            );
        }

        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.midi.input_port.is_empty() {
            anyhow::bail!("MIDI input_port cannot be empty");
        }
        if self.midi.output_port.is_empty() {
            anyhow::bail!("MIDI output_port cannot be empty");
        }
        if self.midi.channel == 0 || self.midi.channel > 16 {
            anyhow::bail!(
                "Invalid MIDI channel {} (must be 1-16)",
                self.midi.channel
            );
        }
        if self.midi.max_input_value == 0 || self.midi.max_input_value > 127 {
            anyhow::bail!(
                "Invalid max_input_value {} (must be 1-127)",
                self.midi.max_input_value
            );
        }
        if self.pulseaudio.pactl.is_empty() {
            anyhow::bail!("pulseaudio.pactl cannot be empty");
        }

        for (idx, target) in self.pulseaudio.targets.iter().enumerate() {
            Self::validate_target(target)
                .with_context(|| format!("Invalid target {} ('{}')", idx, target.name))?;
        }

        Ok(())
    }

    fn validate_target(target: &TargetConfig) -> Result<()> {
        if target.name.is_empty() {
            anyhow::bail!("Target name cannot be empty");
        }

        let numbers = [
            ("presence_indicator", target.presence_indicator),
            ("mute_indicator", target.mute_indicator),
            ("volume_control", target.volume_control),
            ("mute_control", target.mute_control),
            ("default_indicator", target.default_indicator),
            ("default_control", target.default_control),
        ];
        for (field, value) in numbers {
            if let Some(n) = value {
                if n > 127 {
                    anyhow::bail!("{} {} is out of range (must be 0-127)", field, n);
                }
            }
        }

        if !target.kind.is_device()
            && (target.default_indicator.is_some() || target.default_control.is_some())
        {
            anyhow::bail!(
                "Default indicator/control is only valid for devices, not a {}",
                target.kind
            );
        }

        Ok(())
    }

    /// Pairs of target positions sharing the same (kind, name)
    ///
    /// The first target wins every match; the second is reported here.
    pub fn duplicate_targets(&self) -> Vec<(usize, usize)> {
        let targets = &self.pulseaudio.targets;
        let mut duplicates = Vec::new();
        for (i, later) in targets.iter().enumerate() {
            if let Some(first) = targets[..i]
                .iter()
                .position(|t| t.kind == later.kind && t.name == later.name)
            {
                duplicates.push((first, i));
            }
        }
        duplicates
    }
}

// Default value functions
fn default_channel() -> u8 { 1 }
fn default_max_input_value() -> u8 { 127 }
fn default_pactl() -> String { "pactl".to_string() }
fn default_rebootstrap_delay_ms() -> u64 { 5000 }

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
midi:
  input_port: "MIDI Mix"
  output_port: "MIDI Mix"
pulseaudio:
  targets:
    - kind: playback_stream
      name: Firefox
      presence_indicator: 1
      mute_indicator: 3
      volume_control: 19
      mute_control: 3
    - kind: sink
      name: Speakers
      default_indicator: 25
      default_control: 25
"#;

    #[test]
    fn test_parse_sample() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.midi.channel, 1);
        assert_eq!(config.midi.max_input_value, 127);
        assert_eq!(config.pulseaudio.rebootstrap_delay_ms, 5000);
        assert_eq!(config.pulseaudio.pactl, "pactl");

        let targets = &config.pulseaudio.targets;
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].kind, ObjectKind::PlaybackStream);
        assert_eq!(targets[0].volume_control, Some(19));
        assert_eq!(targets[1].kind, ObjectKind::OutputDevice);
        assert_eq!(targets[1].default_control, Some(25));
    }

    #[test]
    fn test_missing_pulseaudio_section() {
        let config = AppConfig::from_yaml("midi: {input_port: a, output_port: b}").unwrap();
        assert!(config.pulseaudio.targets.is_empty());
    }

    #[test]
    fn test_rejects_bad_channel() {
        let yaml = "midi: {input_port: a, output_port: b, channel: 17}";
        assert!(AppConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_rejects_zero_max_input() {
        let yaml = "midi: {input_port: a, output_port: b, max_input_value: 0}";
        assert!(AppConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_rejects_default_on_stream() {
        let yaml = r#"
midi: {input_port: a, output_port: b}
pulseaudio:
  targets:
    - {kind: record_stream, name: obs, default_control: 4}
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("only valid for devices"));
    }

    #[test]
    fn test_rejects_out_of_range_note() {
        let yaml = r#"
midi: {input_port: a, output_port: b}
pulseaudio:
  targets:
    - {kind: sink, name: Speakers, mute_indicator: 200}
"#;
        assert!(AppConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_duplicate_targets_are_reported_not_rejected() {
        let yaml = r#"
midi: {input_port: a, output_port: b}
pulseaudio:
  targets:
    - {kind: sink, name: Speakers}
    - {kind: source, name: Speakers}
    - {kind: sink, name: Speakers, mute_indicator: 3}
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.duplicate_targets(), vec![(0, 2)]);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = AppConfig::load(file.path()).await.unwrap();
        assert_eq!(config.pulseaudio.targets[0].name, "Firefox");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(dir.path().join("nope.yaml")).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = AppConfig::from_yaml(include_str!("../../config.example.yaml")).unwrap();
        assert!(config.duplicate_targets().is_empty());
        assert_eq!(config.pulseaudio.targets.len(), 6);
    }

    #[test]
    fn test_default_path() {
        let path = AppConfig::default_path();
        assert!(path.ends_with("midimix-gw/config.yaml"));
    }
}
