// Settings management and persistence
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::db::connection::DbLocation;
use crate::scheduler::types::PlaybackConfigInput;

/// Storage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Database file name, relative to the app directory
    pub database_file: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_file: "soundLibrary.db".to_string(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub verbose: bool,
}

/// Main application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundboardSettings {
    pub version: i32, // Settings schema version for future migrations
    pub playback: PlaybackConfigInput,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

impl Default for SoundboardSettings {
    fn default() -> Self {
        Self {
            version: 1,
            playback: PlaybackConfigInput::default(),
            storage: StorageSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl SoundboardSettings {
    /// Get the settings file path
    pub fn get_settings_path(app_dir: &Path) -> PathBuf {
        app_dir.join("settings.json")
    }

    /// Where the bucket store lives for this app directory
    pub fn database_location(&self, app_dir: &Path) -> DbLocation {
        DbLocation::File(app_dir.join(&self.storage.database_file))
    }

    /// Load settings from file, or return defaults if file doesn't exist
    pub fn load(app_dir: &Path) -> anyhow::Result<Self> {
        let path = Self::get_settings_path(app_dir);

        if !path.exists() {
            debug!("No settings file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: SoundboardSettings = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;

        info!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, app_dir: &Path) -> anyhow::Result<()> {
        // Ensure directory exists
        fs::create_dir_all(app_dir).context("Failed to create settings directory")?;

        let path = Self::get_settings_path(app_dir);
        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write settings file {}", path.display()))?;

        debug!(path = %path.display(), "Saved settings");
        Ok(())
    }
}
