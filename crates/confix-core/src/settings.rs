//! Engine settings

use std::path::PathBuf;

use confix_fs::{NormalizedPath, SettingsStore};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Suffix appended to a target path to name its staging file
pub const DEFAULT_STAGING_SUFFIX: &str = ".confix-staged";

/// Tunables shared by every session of one engine instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Directory holding `events.toml` and `snapshots/`
    pub log_dir: PathBuf,
    pub staging_suffix: String,
    /// Re-read the target at commit time and refuse if it changed since fix
    pub revalidate_before_commit: bool,
    /// Restore ownership and permissions after replacing a target
    pub preserve_permissions: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            log_dir: dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("confix"),
            staging_suffix: DEFAULT_STAGING_SUFFIX.to_string(),
            revalidate_before_commit: true,
            preserve_permissions: true,
        }
    }
}

impl EngineSettings {
    /// Load settings from a TOML, JSON or YAML file; missing files yield
    /// defaults.
    pub fn load(path: &NormalizedPath) -> Result<Self> {
        Ok(SettingsStore::new().load_or_default(path)?)
    }

    pub fn save(&self, path: &NormalizedPath) -> Result<()> {
        Ok(SettingsStore::new().save(path, self)?)
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// Staging file for `target`.
    pub fn staging_path(&self, target: &NormalizedPath) -> NormalizedPath {
        target.with_suffix(&self.staging_suffix)
    }
}
