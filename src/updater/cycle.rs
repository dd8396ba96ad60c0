//! A single check-download-verify-install pass.

use crate::config::UpdaterConfig;
use crate::connectivity::Connectivity;
use crate::core::UpdateError;
use crate::download::{DownloadResult, HttpDownloader};
use crate::elevation::ElevationGateway;
use crate::install::{InstallReport, Installer, checksum};
use crate::platform::{PlatformTarget, SearchPathManager};
use crate::probe::VersionProbe;
use crate::release::{GithubReleases, ReleaseInfo, ReleaseSource};
use crate::updater::LoopState;
use crate::updater::outcome::{Reporter, UpdateEvent, UpdateOutcome, UpdateReason};
use semver::Version;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What the canonical path held before the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstalledState {
    /// No file at the canonical path.
    Missing,
    /// A file that did not report a version.
    Broken,
    /// A working binary.
    Version(Version),
}

/// The components one cycle drives.
pub struct UpdateCycle {
    target: PlatformTarget,
    releases: Arc<dyn ReleaseSource>,
    probe: VersionProbe,
    downloader: HttpDownloader,
    installer: Installer,
    client: reqwest::Client,
    verify_checksum: bool,
    connectivity: Connectivity,
}

impl UpdateCycle {
    /// Wire up the production components for `target`.
    #[must_use]
    pub fn from_config(
        config: &UpdaterConfig,
        target: PlatformTarget,
        client: reqwest::Client,
        connectivity: Connectivity,
        gateway: Arc<dyn ElevationGateway>,
    ) -> Self {
        let os = target.os();
        Self {
            releases: Arc::new(GithubReleases::new(client.clone(), config.release_url.clone())),
            probe: VersionProbe::new(
                target.binary_path(),
                config.version_args.clone(),
                config.probe_timeout(),
            ),
            downloader: HttpDownloader::new(client.clone(), connectivity.clone()),
            installer: Installer::new(target.clone(), config, gateway, SearchPathManager::new(os)),
            client,
            verify_checksum: config.verify_checksum,
            connectivity,
            target,
        }
    }

    /// Replace the release source.
    #[must_use]
    pub fn with_release_source(mut self, releases: Arc<dyn ReleaseSource>) -> Self {
        self.releases = releases;
        self
    }

    /// The install target.
    #[must_use]
    pub const fn target(&self) -> &PlatformTarget {
        &self.target
    }

    /// The release source.
    #[must_use]
    pub fn releases(&self) -> &dyn ReleaseSource {
        self.releases.as_ref()
    }

    /// Probe the canonical path.
    pub async fn inspect_installed(&self) -> InstalledState {
        if !self.probe.binary().exists() {
            return InstalledState::Missing;
        }
        self.probe.current_version().await.map_or(InstalledState::Broken, InstalledState::Version)
    }

    /// Run the cycle to completion.
    pub async fn run(&self, reporter: &dyn Reporter, state: &watch::Sender<LoopState>) -> UpdateOutcome {
        if !self.connectivity.is_online() {
            info!("Offline, skipping update check");
            return UpdateOutcome::SkippedOffline;
        }

        match self.execute(reporter, state).await {
            Ok(outcome) => outcome,
            Err(error) => UpdateOutcome::Failed(error),
        }
    }

    async fn execute(
        &self,
        reporter: &dyn Reporter,
        state: &watch::Sender<LoopState>,
    ) -> Result<UpdateOutcome, UpdateError> {
        super::transition(state, LoopState::Checking);

        let installed = self.inspect_installed().await;
        let release = self.releases.latest_release(self.target.os()).await?;

        let (previous, reason) = match installed {
            InstalledState::Missing => {
                reporter.report(UpdateEvent::NotInstalled);
                (None, UpdateReason::NotInstalled)
            }
            InstalledState::Broken => {
                reporter.report(UpdateEvent::NotInstalled);
                (None, UpdateReason::ProbeFailed)
            }
            InstalledState::Version(current) if current >= release.version => {
                debug!("Installed {} is not older than released {}", current, release.version);
                reporter.report(UpdateEvent::NoUpdate {
                    current: current.clone(),
                });
                return Ok(UpdateOutcome::NoUpdateAvailable {
                    current,
                });
            }
            InstalledState::Version(current) => {
                info!("Update available: {} -> {}", current, release.version);
                reporter.report(UpdateEvent::UpdateAvailable {
                    current: current.clone(),
                    remote: release.version.clone(),
                });
                (Some(current), UpdateReason::Outdated)
            }
        };

        super::transition(state, LoopState::Downloading);
        let on_progress = |percentage: u8| reporter.report(UpdateEvent::Progress(percentage));
        let mut download = self
            .downloader
            .download(&release.download_url, &release.artifact_name, &on_progress)
            .await?;

        let result = self.verify_and_install(&release, &download, state).await;
        if let Err(e) = download.cleanup() {
            warn!("Failed to clean up download: {}", e);
        }
        let report = result?;

        let new_version = match self.probe.probe().await {
            Ok(version) => version,
            Err(failure) => {
                warn!("Installed binary did not report its version after the update: {}", failure);
                release.version.clone()
            }
        };

        Ok(UpdateOutcome::UpdateInstalled {
            previous,
            new_version,
            reason,
            release_page: release.release_page,
            path_warning: report.path_warning,
        })
    }

    async fn verify_and_install(
        &self,
        release: &ReleaseInfo,
        download: &DownloadResult,
        state: &watch::Sender<LoopState>,
    ) -> Result<InstallReport, UpdateError> {
        super::transition(state, LoopState::Verifying);

        if self.verify_checksum {
            match &release.checksum_url {
                Some(url) => {
                    match checksum::fetch_expected_checksum(&self.client, url, &release.artifact_name)
                        .await?
                    {
                        Some(expected) => self.installer.verify_checksum(download, &expected)?,
                        None => warn!("No checksum available for verification, skipping"),
                    }
                }
                None => debug!("Release publishes no checksums"),
            }
        }

        let candidate_version = self.installer.verify(download.local_path()).await?;
        if candidate_version != release.version {
            warn!(
                "Downloaded binary reports {} but the release is {}",
                candidate_version, release.version
            );
        }

        super::transition(state, LoopState::Installing);
        self.installer.install(download.local_path()).await
    }
}
