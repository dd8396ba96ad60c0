//! Persisting the install directory on the user's search path.
//!
//! Only Windows needs this: its per-user `Path` lives in the registry under
//! `HKCU\Environment`, and the directory under `%LOCALAPPDATA%` is never on it
//! by default. On every other OS family [`SearchPathManager::ensure_on_path`]
//! is a no-op.
//!
//! Editing the registry does not notify the desktop shell, so new terminals
//! would still inherit the old `Path`. Setting a throwaway variable with
//! `setx` makes Windows broadcast `WM_SETTINGCHANGE`, after which the sentinel
//! is deleted again.

use crate::constants::PATH_BROADCAST_SENTINEL;
use crate::core::UpdateError;
use crate::platform::{OsFamily, normalize_entry};
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

const ENVIRONMENT_KEY: &str = r"HKCU\Environment";

/// A value read from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryValue {
    /// Value name as stored (case preserved).
    pub name: String,
    /// Registry type, e.g. `REG_EXPAND_SZ`.
    pub kind: String,
    /// Raw data.
    pub data: String,
}

/// Result of [`SearchPathManager::ensure_on_path`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathChange {
    /// The directory was already listed.
    AlreadyPresent,
    /// The directory was appended and the change broadcast.
    Added,
    /// This OS family does not persist the search path.
    NotApplicable,
}

/// Persistent per-user environment storage.
#[async_trait]
pub trait EnvironmentStore: Send + Sync {
    /// Read the persisted `Path` value.
    async fn read_path(&self) -> Result<Option<RegistryValue>, UpdateError>;

    /// Persist a new `Path` value.
    async fn write_path(&self, value: &RegistryValue) -> Result<(), UpdateError>;

    /// Notify running shells that the environment changed.
    async fn broadcast_change(&self) -> Result<(), UpdateError>;
}

/// [`EnvironmentStore`] backed by the `reg` and `setx` commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryStore;

#[async_trait]
impl EnvironmentStore for RegistryStore {
    async fn read_path(&self) -> Result<Option<RegistryValue>, UpdateError> {
        let output = run_command("reg", &["query", ENVIRONMENT_KEY, "/v", "Path"]).await;
        match output {
            Ok(stdout) => Ok(parse_reg_query(&stdout)),
            // reg exits 1 when the value does not exist
            Err(_) => Ok(None),
        }
    }

    async fn write_path(&self, value: &RegistryValue) -> Result<(), UpdateError> {
        run_command(
            "reg",
            &["add", ENVIRONMENT_KEY, "/v", &value.name, "/t", &value.kind, "/d", &value.data, "/f"],
        )
        .await
        .map(|_| ())
    }

    async fn broadcast_change(&self) -> Result<(), UpdateError> {
        run_command("setx", &[PATH_BROADCAST_SENTINEL, "\"\""]).await?;
        run_command("reg", &["delete", ENVIRONMENT_KEY, "/v", PATH_BROADCAST_SENTINEL, "/f"])
            .await
            .map(|_| ())
    }
}

async fn run_command(program: &str, args: &[&str]) -> Result<String, UpdateError> {
    let output = Command::new(program).args(args).output().await.map_err(|e| UpdateError::Path {
        reason: format!("failed to run {program}: {e}"),
    })?;

    if !output.status.success() {
        return Err(UpdateError::Path {
            reason: format!(
                "{program} {} exited with {}: {}",
                args.first().unwrap_or(&""),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Extract the `Path` value from `reg query` output.
#[must_use]
pub fn parse_reg_query(output: &str) -> Option<RegistryValue> {
    let line = Regex::new(r"(?im)^\s*(path)\s+(REG_[A-Z_]+)\s+(.*?)\s*$").ok()?;
    line.captures(output).map(|caps| RegistryValue {
        name: caps[1].to_string(),
        kind: caps[2].to_string(),
        data: caps[3].to_string(),
    })
}

/// Append `dir` to a `;`-separated search path unless it is already listed.
///
/// Returns `None` when no change is needed.
#[must_use]
pub fn append_path_entry(current: &str, dir: &Path) -> Option<String> {
    let dir = dir.to_string_lossy();
    let wanted = normalize_entry(OsFamily::Windows, &dir);

    if current.split(';').any(|entry| normalize_entry(OsFamily::Windows, entry) == wanted) {
        return None;
    }

    let trimmed = current.trim_end_matches(';');
    if trimmed.is_empty() {
        Some(dir.into_owned())
    } else {
        Some(format!("{trimmed};{dir}"))
    }
}

/// Ensures the install directory is on the persisted search path.
pub struct SearchPathManager {
    os: OsFamily,
    store: Box<dyn EnvironmentStore>,
}

impl SearchPathManager {
    /// Manager for `os` backed by the Windows registry.
    #[must_use]
    pub fn new(os: OsFamily) -> Self {
        Self::with_store(os, Box::new(RegistryStore))
    }

    /// Manager with a custom environment store.
    #[must_use]
    pub fn with_store(os: OsFamily, store: Box<dyn EnvironmentStore>) -> Self {
        Self {
            os,
            store,
        }
    }

    /// Append `dir` to the persisted search path if it is absent.
    pub async fn ensure_on_path(&self, dir: &Path) -> Result<PathChange, UpdateError> {
        if !self.os.uses_registry_environment() {
            debug!("Search path is not persisted on {}, skipping", self.os.release_name());
            return Ok(PathChange::NotApplicable);
        }

        let entry = self.store.read_path().await?.ok_or_else(|| UpdateError::Path {
            reason: "Could not find `Path` entry in the registry".to_string(),
        })?;

        let Some(updated) = append_path_entry(&entry.data, dir) else {
            debug!("{} is already on the search path", dir.display());
            return Ok(PathChange::AlreadyPresent);
        };

        self.store
            .write_path(&RegistryValue {
                data: updated,
                ..entry
            })
            .await?;
        self.store.broadcast_change().await?;

        info!("Added {} to the search path", dir.display());
        Ok(PathChange::Added)
    }
}
