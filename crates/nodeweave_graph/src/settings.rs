// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine settings.
//!
//! Stored as RON. Unknown fields are rejected by the parser, missing fields
//! fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// Settings errors
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Reading or writing the settings file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings text is not valid RON for [`GraphSettings`]
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// The file was written by a newer engine
    #[error("Settings version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version found in the file
        found: u32,
        /// Highest version this build understands
        supported: u32,
    },
}

/// Behavior switches for a [`Network`](crate::network::Network)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphSettings {
    /// Format version
    pub version: u32,
    /// Re-run resolution of pending input references whenever a child is added
    pub auto_resolve_pending: bool,
    /// Log unresolved references at warn level instead of debug
    pub warn_on_unresolved: bool,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            auto_resolve_pending: false,
            warn_on_unresolved: false,
        }
    }
}

impl GraphSettings {
    /// Parse settings from RON text
    pub fn from_ron_str(text: &str) -> Result<Self, SettingsError> {
        let settings: GraphSettings = ron::from_str(text)?;
        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(SettingsError::UnsupportedVersion {
                found: settings.version,
                supported: SETTINGS_FORMAT_VERSION,
            });
        }
        Ok(settings)
    }

    /// Serialize settings to pretty RON
    pub fn to_ron_string(&self) -> Result<String, SettingsError> {
        let config = ron::ser::PrettyConfig::default().struct_names(true);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_ron_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded graph settings");
        Ok(settings)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        std::fs::write(path, self.to_ron_string()?)?;
        Ok(())
    }
}
