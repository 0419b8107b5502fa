//! Persisted voice and UI preferences.
//!
//! Preference toggles survive restarts: they are read once at startup
//! and written back on every change. Everything else in the client, such
//! as reconnect counters and live transcripts, is process-lifetime state
//! and never touches disk.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// A failure while persisting settings. Loading never fails: a missing
/// or corrupt file falls back to defaults.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The toggles the UI exposes for voice behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    /// Speak assistant replies out loud.
    pub auto_play: bool,
    /// Re-arm listening automatically after each attempt.
    pub wake_mode: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            auto_play: true,
            wake_mode: false,
        }
    }
}

/// File-backed store for [`VoiceSettings`].
pub struct SettingsStore {
    path: PathBuf,
    current: VoiceSettings,
}

impl SettingsStore {
    /// Loads settings from `path`. A missing or unreadable file yields
    /// defaults; corrupt settings never block startup.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(settings) => settings,
                Err(error) => {
                    warn!(%error, path = %path.display(), "settings file is corrupt, using defaults");
                    VoiceSettings::default()
                }
            },
            Err(_) => VoiceSettings::default(),
        };
        Self { path, current }
    }

    /// The current settings.
    pub fn get(&self) -> VoiceSettings {
        self.current
    }

    /// Applies `update` and writes the result through to disk.
    pub fn update(
        &mut self,
        update: impl FnOnce(&mut VoiceSettings),
    ) -> Result<VoiceSettings, SettingsError> {
        update(&mut self.current);
        let encoded = serde_json::to_string_pretty(&self.current)?;
        std::fs::write(&self.path, encoded).map_err(|source| SettingsError::Write {
            path: self.path.clone(),
            source,
        })?;
        Ok(self.current)
    }
}
