//! Verifying downloaded candidates and placing them at the canonical path.
//!
//! # Verification
//!
//! A candidate is made executable and run with the version arguments. It is
//! accepted only when it exits zero and prints a semantic version. A rejected
//! candidate never touches the canonical path. When the release publishes a
//! checksum manifest, [`checksum`] is consulted first.
//!
//! # Placement
//!
//! The verified candidate is first copied to a hidden sibling of the
//! canonical path so the final rename stays on one filesystem. Then:
//!
//! 1. Rename onto the canonical path. Readers see the old or the new binary,
//!    never a partial one.
//! 2. If that fails and a binary is in the way, remove it; if removal is not
//!    permitted, remove it through the [`ElevationGateway`]. Rename again.
//! 3. If the rename still fails, move the candidate through the gateway.
//!
//! The old binary is only removed after a direct rename has failed. Once
//! placed, the binary gets the permission bits of a reference executable and
//! the install directory is put on the search path. A search path failure is
//! reported as a warning, not as a failed install.

pub mod checksum;

use crate::config::UpdaterConfig;
use crate::core::UpdateError;
use crate::download::DownloadResult;
use crate::elevation::{
    ElevatedCommand, ElevationGateway, MOVE_JUSTIFICATION, PERMISSIONS_JUSTIFICATION,
    REPLACE_JUSTIFICATION,
};
use crate::platform::PlatformTarget;
use crate::platform::search_path::{PathChange, SearchPathManager};
use crate::probe::{neutral_working_dir, run_version_command};
use semver::Version;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How the candidate reached the canonical path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// A single rename.
    Renamed,
    /// The old binary was removed, then renamed over.
    RenamedAfterRemoval,
    /// The old binary was removed with elevated rights, then renamed over.
    RenamedAfterElevatedRemoval,
    /// The candidate was moved with elevated rights.
    ElevatedMove,
}

/// What [`Installer::install`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// How the binary was placed.
    pub placement: Placement,
    /// Search path result, when it could be determined.
    pub path_change: Option<PathChange>,
    /// Why the search path could not be updated.
    pub path_warning: Option<String>,
}

/// Verifies and installs the managed binary.
pub struct Installer {
    target: PlatformTarget,
    version_args: Vec<String>,
    probe_timeout: Duration,
    reference_executable: String,
    gateway: Arc<dyn ElevationGateway>,
    path_manager: SearchPathManager,
}

impl Installer {
    /// Installer for `target`.
    #[must_use]
    pub fn new(
        target: PlatformTarget,
        config: &UpdaterConfig,
        gateway: Arc<dyn ElevationGateway>,
        path_manager: SearchPathManager,
    ) -> Self {
        Self {
            target,
            version_args: config.version_args.clone(),
            probe_timeout: config.probe_timeout(),
            reference_executable: config.reference_executable.clone(),
            gateway,
            path_manager,
        }
    }

    /// The install target.
    #[must_use]
    pub const fn target(&self) -> &PlatformTarget {
        &self.target
    }

    /// Check the downloaded bytes against a published checksum.
    pub fn verify_checksum(
        &self,
        download: &DownloadResult,
        expected: &str,
    ) -> Result<(), UpdateError> {
        checksum::verify_digest(download.sha256(), expected, download.local_path())
    }

    /// Make `candidate` executable and check that it reports a version.
    pub async fn verify(&self, candidate: &Path) -> Result<Version, UpdateError> {
        let functional = |reason: String| UpdateError::Functional {
            path: candidate.display().to_string(),
            reason,
        };

        make_executable(candidate)
            .await
            .map_err(|e| functional(format!("could not make it executable: {e}")))?;

        let version = run_version_command(
            candidate,
            &self.version_args,
            &neutral_working_dir(),
            self.probe_timeout,
        )
        .await
        .map_err(|failure| functional(failure.to_string()))?;

        debug!("Candidate {} reports version {}", candidate.display(), version);
        Ok(version)
    }

    /// Place a verified `candidate` at the canonical path.
    pub async fn install(&self, candidate: &Path) -> Result<InstallReport, UpdateError> {
        let destination = self.target.binary_path();
        let staged = self.stage(candidate).await;
        let source = staged.as_deref().unwrap_or(candidate);

        let placement = match self.place(source, destination).await {
            Ok(placement) => placement,
            Err(error) => {
                if let Some(staged) = &staged
                    && let Err(e) = fs::remove_file(staged).await
                    && e.kind() != std::io::ErrorKind::NotFound
                {
                    warn!("Failed to remove staged binary {}: {}", staged.display(), e);
                }
                return Err(error);
            }
        };
        info!("Placed binary at {} ({:?})", destination.display(), placement);

        self.apply_permissions(destination).await?;

        let (path_change, path_warning) =
            match self.path_manager.ensure_on_path(self.target.install_directory()).await {
                Ok(change) => (Some(change), None),
                Err(error) => {
                    warn!("Installed, but {}", error);
                    (None, Some(error.to_string()))
                }
            };

        Ok(InstallReport {
            placement,
            path_change,
            path_warning,
        })
    }

    async fn stage(&self, candidate: &Path) -> Option<PathBuf> {
        let dir = self.target.install_directory();
        if let Err(e) = fs::create_dir_all(dir).await {
            debug!("Cannot create {}: {}", dir.display(), e);
            return None;
        }

        let file_name = self
            .target
            .binary_path()
            .file_name()
            .map_or_else(|| "binary".into(), |name| name.to_string_lossy());
        let staged = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

        match fs::copy(candidate, &staged).await {
            Ok(_) => {
                debug!("Staged candidate at {}", staged.display());
                Some(staged)
            }
            Err(e) => {
                debug!("Cannot stage in {}, placing from scratch: {}", dir.display(), e);
                if let Err(e) = fs::remove_file(&staged).await
                    && e.kind() != std::io::ErrorKind::NotFound
                {
                    debug!("Failed to remove partial copy {}: {}", staged.display(), e);
                }
                None
            }
        }
    }

    async fn place(&self, source: &Path, destination: &Path) -> Result<Placement, UpdateError> {
        let os = self.target.os();

        let Err(error) = fs::rename(source, destination).await else {
            return Ok(Placement::Renamed);
        };
        debug!("Renaming onto {} failed: {}", destination.display(), error);

        if fs::symlink_metadata(destination).await.is_ok() {
            let elevated = match fs::remove_file(destination).await {
                Ok(()) => false,
                Err(e) => {
                    warn!("Could not remove {}: {}", destination.display(), e);
                    self.gateway
                        .run_elevated(
                            &ElevatedCommand::removal(os, destination)?,
                            REPLACE_JUSTIFICATION,
                        )
                        .await?;
                    true
                }
            };

            match fs::rename(source, destination).await {
                Ok(()) if elevated => return Ok(Placement::RenamedAfterElevatedRemoval),
                Ok(()) => return Ok(Placement::RenamedAfterRemoval),
                Err(e) => warn!("Renaming onto cleared {} failed: {}", destination.display(), e),
            }
        }

        self.gateway
            .run_elevated(&ElevatedCommand::relocation(os, source, destination)?, MOVE_JUSTIFICATION)
            .await?;

        if fs::symlink_metadata(destination).await.is_err() {
            return Err(UpdateError::Install {
                path: destination.display().to_string(),
                reason: "the elevated move finished but the binary is missing".to_string(),
            });
        }
        Ok(Placement::ElevatedMove)
    }

    #[cfg(unix)]
    async fn apply_permissions(&self, destination: &Path) -> Result<(), UpdateError> {
        use std::os::unix::fs::PermissionsExt;

        let mode = self.reference_mode().await.unwrap_or(0o755);
        match fs::set_permissions(destination, std::fs::Permissions::from_mode(mode)).await {
            Ok(()) => {
                debug!("Set mode {:o} on {}", mode, destination.display());
                Ok(())
            }
            Err(e) => {
                warn!("Could not set permissions on {}: {}", destination.display(), e);
                self.gateway
                    .run_elevated(
                        &ElevatedCommand::make_executable(destination)?,
                        PERMISSIONS_JUSTIFICATION,
                    )
                    .await
            }
        }
    }

    #[cfg(not(unix))]
    async fn apply_permissions(&self, _destination: &Path) -> Result<(), UpdateError> {
        Ok(())
    }

    #[cfg(unix)]
    async fn reference_mode(&self) -> Option<u32> {
        use std::os::unix::fs::PermissionsExt;

        let reference = which::which(&self.reference_executable).ok()?;
        let metadata = fs::metadata(&reference).await.ok()?;
        let mode = metadata.permissions().mode() & 0o777;
        // A reference that is not executable would produce a broken install.
        (mode & 0o111 != 0).then_some(mode)
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn make_executable(path: &Path) -> std::io::Result<()> {
    fs::metadata(path).await.map(|_| ())
}
