use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::MidiOutError;
use crate::Channel;

/// Conventional General MIDI percussion channel, left out of the defaults.
pub const DRUM_CHANNEL: Channel = 9;
/// Largest bend range accepted by validation.
pub const MAX_BEND_RANGE: u8 = 24;

/// Construction-time settings for [`MidiOut`](crate::MidiOut).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiOutConfig {
    /// Channels handed to the voice pool, in allocation order.
    pub channels: Vec<Channel>,
    /// Symmetric pitch bend range in semitones.
    pub pitch_bend_range: u8,
    /// Preferred output port name.
    pub port_name: Option<String>,
}

impl Default for MidiOutConfig {
    fn default() -> Self {
        Self {
            channels: (0..16).filter(|&ch| ch != DRUM_CHANNEL).collect(),
            pitch_bend_range: 2,
            port_name: None,
        }
    }
}

impl MidiOutConfig {
    pub fn with_channels(channels: impl IntoIterator<Item = Channel>) -> Self {
        Self {
            channels: channels.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn pitch_bend_range(mut self, semitones: u8) -> Self {
        self.pitch_bend_range = semitones;
        self
    }

    /// Check channel numbers, duplicates and the bend range.
    pub fn validate(&self) -> Result<(), MidiOutError> {
        let mut seen = HashSet::new();
        for &channel in &self.channels {
            if channel > 15 {
                return Err(MidiOutError::InvalidChannel(channel));
            }
            if !seen.insert(channel) {
                return Err(MidiOutError::DuplicateChannel(channel));
            }
        }
        if self.pitch_bend_range == 0 || self.pitch_bend_range > MAX_BEND_RANGE {
            return Err(MidiOutError::InvalidBendRange(self.pitch_bend_range));
        }
        Ok(())
    }
}

fn settings_path() -> Option<PathBuf> {
    let mut base = dirs::config_dir()?;
    base.push("Polytune");
    base.push("midi-out.json");
    Some(base)
}

/// Load settings from an explicit file.
pub fn load_from(path: &Path) -> anyhow::Result<MidiOutConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config: MidiOutConfig = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a valid MIDI output config", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Load settings from the user config directory. Returns defaults if loading fails.
pub fn load() -> MidiOutConfig {
    let Some(path) = settings_path() else {
        return MidiOutConfig::default();
    };
    if !path.exists() {
        return MidiOutConfig::default();
    }
    match load_from(&path) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(?err, "failed to load midi output settings");
            MidiOutConfig::default()
        }
    }
}

/// Save settings to the user config directory.
pub fn save(config: &MidiOutConfig) -> anyhow::Result<()> {
    let path = settings_path().context("no user config directory")?;
    save_to(&path, config)
}

pub fn save_to(path: &Path, config: &MidiOutConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_skip_drum_channel() {
        let config = MidiOutConfig::default();
        assert_eq!(config.channels.len(), 15);
        assert!(!config.channels.contains(&DRUM_CHANNEL));
        assert_eq!(config.pitch_bend_range, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_channels() {
        let config = MidiOutConfig::with_channels([0, 16]);
        assert_eq!(config.validate(), Err(MidiOutError::InvalidChannel(16)));
        let config = MidiOutConfig::with_channels([1, 2, 1]);
        assert_eq!(config.validate(), Err(MidiOutError::DuplicateChannel(1)));
        let config = MidiOutConfig::with_channels([1]).pitch_bend_range(0);
        assert_eq!(config.validate(), Err(MidiOutError::InvalidBendRange(0)));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: MidiOutConfig = serde_json::from_str(r#"{"channels": [0, 1]}"#).unwrap();
        assert_eq!(config.channels, vec![0, 1]);
        assert_eq!(config.pitch_bend_range, 2);
        assert_eq!(config.port_name, None);
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("midi-out.json");
        let config = MidiOutConfig::with_channels([2, 3, 4]).pitch_bend_range(12);
        save_to(&path, &config).unwrap();
        assert_eq!(load_from(&path).unwrap(), config);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("midi-out.json");
        fs::write(&path, r#"{"channels": [3, 3]}"#).unwrap();
        assert!(load_from(&path).is_err());
    }
}
