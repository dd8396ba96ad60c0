//! What a cycle produced, and the events the presentation layer sees.

use crate::core::UpdateError;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Why an update was installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateReason {
    /// No binary at the canonical path.
    NotInstalled,
    /// A binary exists but did not report a usable version.
    ProbeFailed,
    /// The installed version is older than the latest release.
    Outdated,
}

impl fmt::Display for UpdateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotInstalled => "not installed",
            Self::ProbeFailed => "installed binary did not report a version",
            Self::Outdated => "newer release available",
        })
    }
}

/// Result of one update cycle.
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    /// The installed binary is current.
    NoUpdateAvailable {
        /// Installed version
        current: Version,
    },
    /// A new binary was placed at the canonical path.
    UpdateInstalled {
        /// Version before the update, when one was detected
        previous: Option<Version>,
        /// Version reported by the binary now at the canonical path
        new_version: Version,
        /// What triggered the update
        reason: UpdateReason,
        /// Release notes page, when published
        release_page: Option<String>,
        /// Set when the search path could not be updated
        path_warning: Option<String>,
    },
    /// The host was offline; nothing was attempted.
    SkippedOffline,
    /// The cycle failed.
    Failed(UpdateError),
}

impl UpdateOutcome {
    /// Whether the cycle counts as successful for scheduling.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    /// Version at the canonical path after the cycle, when known.
    #[must_use]
    pub const fn installed_version(&self) -> Option<&Version> {
        match self {
            Self::NoUpdateAvailable {
                current,
            } => Some(current),
            Self::UpdateInstalled {
                new_version,
                ..
            } => Some(new_version),
            Self::SkippedOffline | Self::Failed(_) => None,
        }
    }

    /// The error, for failed cycles.
    #[must_use]
    pub const fn error(&self) -> Option<&UpdateError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoUpdateAvailable {
                current,
            } => write!(f, "No update found, {current} is the latest version"),
            Self::UpdateInstalled {
                previous: Some(previous),
                new_version,
                ..
            } => write!(f, "Updated from {previous} to {new_version}"),
            Self::UpdateInstalled {
                previous: None,
                new_version,
                reason,
                ..
            } => write!(f, "Installed {new_version} ({reason})"),
            Self::SkippedOffline => f.write_str("Offline, update check skipped"),
            Self::Failed(error) => write!(f, "Update failed: {error}"),
        }
    }
}

/// Status updates delivered to the presentation layer during a cycle.
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    /// No working binary was found; installing.
    NotInstalled,
    /// A newer release exists.
    UpdateAvailable {
        /// Installed version
        current: Version,
        /// Latest release
        remote: Version,
    },
    /// Nothing to do.
    NoUpdate {
        /// Installed version
        current: Version,
    },
    /// Download progress in whole percent.
    Progress(u8),
    /// The cycle ended.
    Finished(UpdateOutcome),
}

/// Receives [`UpdateEvent`]s.
///
/// Called from inside the cycle, including from the download loop, so
/// implementations must return quickly.
pub trait Reporter: Send + Sync {
    /// Handle one event.
    fn report(&self, event: UpdateEvent);
}

impl Reporter for mpsc::UnboundedSender<UpdateEvent> {
    fn report(&self, event: UpdateEvent) {
        // A closed receiver means nobody is listening any more.
        let _ = self.send(event);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn report(&self, _event: UpdateEvent) {}
}
