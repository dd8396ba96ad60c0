//! The last cycle's result, persisted next to the configuration file.
//!
//! Written after every cycle and shown by `binkeeper status`. Writing is
//! best-effort: the update loop logs a failure and carries on.

use crate::core::UpdateError;
use crate::updater::outcome::UpdateOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const STATE_FILE_NAME: &str = "state.json";

/// Summary of the most recent cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Human-readable outcome.
    pub outcome: String,
    /// Whether the cycle succeeded.
    pub success: bool,
    /// Error class for failed cycles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Version at the canonical path after the cycle, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,
    /// When the cycle finished.
    pub checked_at: DateTime<Utc>,
    /// When the next cycle is due, for cycles run by the loop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_check_at: Option<DateTime<Utc>>,
}

impl StateRecord {
    /// Record for `outcome`, finished now, with the next cycle `next_in`
    /// from now.
    #[must_use]
    pub fn from_outcome(outcome: &UpdateOutcome, next_in: Option<Duration>) -> Self {
        let checked_at = Utc::now();
        Self {
            outcome: outcome.to_string(),
            success: outcome.is_success(),
            error_kind: outcome.error().map(|error| error.kind().to_string()),
            installed_version: outcome.installed_version().map(ToString::to_string),
            checked_at,
            next_check_at: next_in
                .and_then(|delay| chrono::Duration::from_std(delay).ok())
                .map(|delay| checked_at + delay),
        }
    }

    /// State file location for a configuration file at `config_path`.
    #[must_use]
    pub fn path_for(config_path: &Path) -> PathBuf {
        config_path.parent().unwrap_or_else(|| Path::new(".")).join(STATE_FILE_NAME)
    }

    /// Read a record. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>, UpdateError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map(Some).map_err(|e| UpdateError::Other {
            message: format!("Invalid state file {}: {e}", path.display()),
        })
    }

    /// Write the record atomically.
    pub fn save(&self, path: &Path) -> Result<(), UpdateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| UpdateError::Other {
            message: format!("Failed to serialize state: {e}"),
        })?;

        let temp = path.with_extension("json.tmp");
        std::fs::write(&temp, json)?;
        std::fs::rename(&temp, path)?;
        Ok(())
    }
}
