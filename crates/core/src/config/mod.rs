use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{RenderError, Result};

/// Which synthesis path a run drives. Exclusive per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Video,
    Audio,
}

/// What happens when a referenced bitmap or wave cannot be used.
///
/// `Abort` stops the run before any output is written. `Skip` logs the
/// failure and leaves the slot absent, so events that reference it render
/// as if no asset were assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetPolicy {
    #[default]
    Abort,
    Skip,
}

/// Top-level configuration structure for a render run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub mode: RenderMode,
    pub asset_policy: AssetPolicy,
    pub video: VideoConfig,
    pub audio: AudioConfig,
}

impl RenderConfig {
    /// Reads a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|err| RenderError::InvalidConfig(format!("{}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.video.fallback_width == 0 || self.video.fallback_height == 0 {
            return Err(RenderError::InvalidConfig(
                "video fallback canvas must be non-empty".into(),
            ));
        }
        if self.audio.channels == 0 {
            return Err(RenderError::InvalidConfig(
                "audio.channels must be positive".into(),
            ));
        }
        if self.audio.sample_rate == 0 {
            return Err(RenderError::InvalidConfig(
                "audio.sample_rate must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration specific to the video compositor. The frame rate is fixed
/// at [`crate::render::VIDEO_FPS`] and cannot be set here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VideoConfig {
    /// Canvas used when the chart has no loadable bitmap at all.
    pub fallback_width: u32,
    pub fallback_height: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            fallback_width: 256,
            fallback_height: 256,
        }
    }
}

/// Configuration specific to the audio mixer and the wave decode target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub channels: u16,
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 44_100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: RenderConfig =
            serde_json::from_str(r#"{ "mode": "audio", "audio": { "sample_rate": 48000 } }"#)
                .unwrap();

        assert_eq!(config.mode, RenderMode::Audio);
        assert_eq!(config.asset_policy, AssetPolicy::Abort);
        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.audio.channels, 2);
        assert_eq!(config.video.fallback_width, 256);
    }

    #[test]
    fn rejects_zero_rate() {
        let mut config = RenderConfig::default();
        config.audio.sample_rate = 0;

        let err = config.validate().unwrap_err();
        assert!(format!("{err}").contains("sample_rate"));
    }

    #[test]
    fn reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("render.json");
        let json = r#"{ "asset_policy": "skip", "video": { "fallback_width": 64 } }"#;
        std::fs::write(&path, json).unwrap();

        let config = RenderConfig::from_json_file(&path).unwrap();
        assert_eq!(config.asset_policy, AssetPolicy::Skip);
        assert_eq!(config.video.fallback_width, 64);
        assert_eq!(config.video.fallback_height, 256);
    }

    #[test]
    fn frame_rate_is_not_configurable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("render.json");
        std::fs::write(&path, r#"{ "video": { "fps": 60 } }"#).unwrap();

        let err = RenderConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, RenderError::InvalidConfig(_)));
        assert!(format!("{err}").contains("fps"));
    }
}
