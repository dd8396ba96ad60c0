//! Global configuration file management.
//!
//! The global configuration lives in the user's home directory and holds the
//! updater and elevation settings. A missing file is not an error: every
//! field has a default.
//!
//! # Location
//!
//! - **Unix/macOS**: `~/.binkeeper/config.toml`
//! - **Windows**: `%LOCALAPPDATA%\binkeeper\config.toml`
//! - **Override**: the `BINKEEPER_CONFIG` environment variable or `--config`
//!
//! # File Format
//!
//! ```toml
//! [updater]
//! binary_name = "data"
//! check_interval_secs = 600
//!
//! [elevation]
//! assume_yes = false
//! ```

use crate::config::updater::{ElevationConfig, UpdaterConfig};
use crate::constants::CONFIG_PATH_ENV;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Global binkeeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Updater behavior.
    #[serde(default)]
    pub updater: UpdaterConfig,

    /// Privilege escalation prompt behavior.
    #[serde(default)]
    pub elevation: ElevationConfig,
}

impl GlobalConfig {
    /// Load from an explicit path, or from the resolved default location.
    ///
    /// Returns defaults when the file does not exist.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load and validate the configuration at `path`.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse global config from {}", path.display()))?;

        config
            .updater
            .validate()
            .with_context(|| format!("Invalid global config at {}", path.display()))?;

        Ok(config)
    }

    /// Save the configuration to `path`, creating parent directories.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize global config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write global config to {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mut perms = fs::metadata(path)
                .await
                .with_context(|| format!("Failed to read permissions for {}", path.display()))?
                .permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms).await.with_context(|| {
                format!("Failed to set permissions on {}", path.display())
            })?;
        }

        Ok(())
    }

    /// Resolve the configuration file location.
    ///
    /// `BINKEEPER_CONFIG` wins over the platform default.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("binkeeper")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".binkeeper")
        };

        Ok(config_dir.join("config.toml"))
    }
}
