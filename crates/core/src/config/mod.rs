use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Result, SyncError};

/// Top-level configuration structure for the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Period of the position feed loop in milliseconds.
    pub feed_interval_ms: u64,
    /// Sync offset restored every time an asset is loaded.
    pub default_offset_ms: i64,
    pub haptic: HapticConfig,
    pub playlist: Vec<AssetEntry>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            feed_interval_ms: 100,
            default_offset_ms: 0,
            haptic: HapticConfig::default(),
            playlist: vec![
                AssetEntry::new("music1.mp3", "music1.he"),
                AssetEntry::new("music2.mp3", "music2.he"),
            ],
        }
    }
}

impl PlayerConfig {
    /// Reads and validates a JSON configuration file. Missing fields fall
    /// back to their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.feed_interval_ms == 0 {
            return Err(SyncError::InvalidParameter {
                name: "feed_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.playlist.is_empty() {
            return Err(SyncError::msg("playlist must contain at least one asset"));
        }
        Ok(())
    }

    pub fn feed_interval(&self) -> Duration {
        Duration::from_millis(self.feed_interval_ms)
    }
}

/// Parameters handed to the haptic engine together with its source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HapticConfig {
    /// Global amplitude scale, 0-255.
    pub amplitude: u8,
    pub channel: u32,
}

impl Default for HapticConfig {
    fn default() -> Self {
        Self {
            amplitude: 255,
            channel: 0,
        }
    }
}

/// Logical names of one media file and its companion haptic file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub media: String,
    pub haptic: String,
}

impl AssetEntry {
    pub fn new(media: impl Into<String>, haptic: impl Into<String>) -> Self {
        Self {
            media: media.into(),
            haptic: haptic.into(),
        }
    }
}
