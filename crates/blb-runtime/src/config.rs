#![forbid(unsafe_code)]

//! Save configuration, loadable from TOML or JSON.
//!
//! ```toml
//! # blb.toml
//! project_dir = "levels"
//! max_auto_saves = 10
//! compress = false
//! ```
//!
//! ```rust,ignore
//! let config = SaveConfig::from_toml_file("blb.toml")?;
//! ```
//!
//! Every field has a default, so a partial file only overrides what it
//! names.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use blb_core::EDITOR_VERSION_TAG;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    /// Directory that holds level files and temp files.
    pub project_dir: PathBuf,
    /// File extension without the dot.
    pub extension: String,
    pub max_auto_saves: usize,
    pub max_manual_saves: usize,
    /// Gzip the body of files this editor writes.
    pub compress: bool,
    /// Tag stamped into headers and checked on load.
    pub editor_version_tag: String,
    pub autosave_interval_secs: u64,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            extension: "blb".into(),
            max_auto_saves: 20,
            max_manual_saves: 100,
            compress: true,
            editor_version_tag: EDITOR_VERSION_TAG.into(),
            autosave_interval_secs: 120,
        }
    }
}

impl SaveConfig {
    /// Default configuration rooted at `dir`.
    #[must_use]
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: dir.into(),
            ..Self::default()
        }
    }

    /// Load from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.checked()
    }

    /// Load from a TOML file on disk.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.checked()
    }

    /// Load from a JSON file on disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Validate all parameters are within acceptable ranges.
    ///
    /// Returns a list of validation errors. An empty list means the config
    /// is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_auto_saves == 0 {
            errors.push("max_auto_saves must be > 0".into());
        }
        if self.max_manual_saves == 0 {
            errors.push("max_manual_saves must be > 0".into());
        }
        if self.extension.is_empty() {
            errors.push("extension must not be empty".into());
        } else if self.extension.contains('.') {
            errors.push(format!(
                "extension must not contain '.', got {:?}",
                self.extension
            ));
        }
        if self.autosave_interval_secs == 0 {
            errors.push("autosave_interval_secs must be > 0".into());
        }

        errors
    }

    fn checked(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

/// Errors that can occur when loading a [`SaveConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation errors: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
