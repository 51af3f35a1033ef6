use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{AmbienceError, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub assets: AssetConfig,
    pub engine: EngineConfig,
    pub playback: PlaybackConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields keep their defaults.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.dsp_buffer_length == 0 || self.engine.dsp_buffer_count == 0 {
            return Err(AmbienceError::Config(
                "dsp buffer length and count must be non-zero".to_string(),
            ));
        }
        if self.engine.max_channels == 0 {
            return Err(AmbienceError::Config(
                "max_channels must be non-zero".to_string(),
            ));
        }
        if self.playback.interval_ms == 0 {
            return Err(AmbienceError::Config(
                "playback interval must be non-zero".to_string(),
            ));
        }
        if self.playback.update_interval_ms == 0 {
            return Err(AmbienceError::Config(
                "update interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the sound files are read from before the engine starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetConfig {
    pub base_path: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("assets"),
        }
    }
}

/// Settings applied while bootstrapping the audio engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Mixer block length in samples. Anything much below 2048 can stutter when
    /// mixing is not scheduled in real time.
    pub dsp_buffer_length: u32,
    pub dsp_buffer_count: u32,
    /// Output driver whose sample rate the mixer is matched to.
    pub driver: usize,
    pub max_channels: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dsp_buffer_length: 2048,
            dsp_buffer_count: 2,
            driver: 0,
            max_channels: 1024,
        }
    }
}

/// What the loop driver does when a play request fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayErrorPolicy {
    /// Stop the loop and return the error.
    #[default]
    Halt,
    /// Log the failure and carry on with the next iteration.
    Skip,
}

/// Cadence of the randomized playback loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaybackConfig {
    pub interval_ms: u64,
    /// How often the engine is pumped for callbacks while waiting.
    pub update_interval_ms: u64,
    pub seed: Option<u64>,
    pub on_play_error: PlayErrorPolicy,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            update_interval_ms: 20,
            seed: None,
            on_play_error: PlayErrorPolicy::Halt,
        }
    }
}

impl PlaybackConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = AppConfig::from_json("{}").unwrap();

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.engine.max_channels, 1024);
        assert_eq!(config.engine.dsp_buffer_length, 2048);
        assert_eq!(config.playback.interval(), Duration::from_secs(2));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AppConfig::from_json(
            r#"{ "playback": { "seed": 7, "on_play_error": "skip" }, "assets": { "base_path": "/srv/sounds" } }"#,
        )
        .unwrap();

        assert_eq!(config.playback.seed, Some(7));
        assert_eq!(config.playback.on_play_error, PlayErrorPolicy::Skip);
        assert_eq!(config.playback.interval_ms, 2000);
        assert_eq!(config.assets.base_path, PathBuf::from("/srv/sounds"));
    }

    #[test]
    fn rejects_zero_interval() {
        let err = AppConfig::from_json(r#"{ "playback": { "interval_ms": 0 } }"#).unwrap_err();
        assert!(matches!(err, AmbienceError::Config(_)));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = AppConfig::from_json(r#"{ "engine": { "reverb": true } }"#).unwrap_err();
        assert!(matches!(err, AmbienceError::ConfigParse(_)));
    }

    #[test]
    fn example_file_matches_defaults() {
        let text = include_str!("../../../../ambience.example.json");
        let config = AppConfig::from_json(text).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ambience.json");
        std::fs::write(&path, r#"{ "engine": { "max_channels": 64 } }"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.engine.max_channels, 64);
    }
}
