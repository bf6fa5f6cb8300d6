//! Format-agnostic settings loading and saving

use serde::{Serialize, de::DeserializeOwned};

use crate::{Error, NormalizedPath, Result, io};

/// Serialization formats accepted for settings files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    Toml,
    Json,
    Yaml,
}

impl SettingsFormat {
    /// Pick the format from a file extension (case-insensitive).
    pub fn from_path(path: &NormalizedPath) -> Result<Self> {
        let extension = path.extension().unwrap_or("");
        match extension.to_lowercase().as_str() {
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(Error::UnsupportedFormat {
                extension: extension.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
            Self::Yaml => "YAML",
        }
    }
}

/// Loads and saves serde settings, choosing the format by extension.
///
/// Saving goes through [`io::write_atomic`], so a settings file is never left
/// half-written.
#[derive(Debug, Default, Clone, Copy)]
pub struct SettingsStore;

impl SettingsStore {
    pub fn new() -> Self {
        Self
    }

    /// Load settings from `path`.
    pub fn load<T: DeserializeOwned>(&self, path: &NormalizedPath) -> Result<T> {
        let format = SettingsFormat::from_path(path)?;
        let native = path.to_native();
        let content = std::fs::read_to_string(&native).map_err(|e| Error::io(&native, e))?;

        let parse_err = |message: String| Error::SettingsParse {
            path: native.clone(),
            format: format.name().into(),
            message,
        };

        match format {
            SettingsFormat::Toml => toml::from_str(&content).map_err(|e| parse_err(e.to_string())),
            SettingsFormat::Json => {
                serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))
            }
            SettingsFormat::Yaml => {
                serde_yaml::from_str(&content).map_err(|e| parse_err(e.to_string()))
            }
        }
    }

    /// Load settings from `path`, or fall back to `T::default()` when the file
    /// does not exist.
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, path: &NormalizedPath) -> Result<T> {
        if path.exists() {
            self.load(path)
        } else {
            tracing::debug!(path = %path, "settings file absent, using defaults");
            Ok(T::default())
        }
    }

    /// Save settings to `path`.
    pub fn save<T: Serialize>(&self, path: &NormalizedPath, value: &T) -> Result<()> {
        let format = SettingsFormat::from_path(path)?;
        let serialize_err = |message: String| Error::SettingsSerialize {
            path: path.to_native(),
            format: format.name().into(),
            message,
        };

        let content = match format {
            SettingsFormat::Toml => {
                toml::to_string_pretty(value).map_err(|e| serialize_err(e.to_string()))?
            }
            SettingsFormat::Json => {
                serde_json::to_string_pretty(value).map_err(|e| serialize_err(e.to_string()))?
            }
            SettingsFormat::Yaml => {
                serde_yaml::to_string(value).map_err(|e| serialize_err(e.to_string()))?
            }
        };

        io::write_atomic(path, content.as_bytes())
    }
}
