use crate::constants::{
    DEFAULT_APP_DIR_NAME, DEFAULT_BINARY_NAME, DEFAULT_CHECK_INTERVAL_SECS,
    DEFAULT_INITIAL_DELAY_SECS, DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_RELEASE_URL,
    MIN_RETRY_INTERVAL, RETRY_INTERVAL_DIVISOR,
};
use crate::core::UpdateError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration settings for the managed-binary updater.
///
/// `UpdaterConfig` defines where releases come from, what the managed binary
/// is called, how it is probed, and how often the update loop runs.
///
/// # Default Behavior
///
/// - First check 2 seconds after the host starts
/// - Checks every 10 minutes after a successful cycle
/// - Retries after one tenth of that interval when a cycle fails
/// - Verifies checksums when the release publishes them
/// - Stays off on platforms where a package manager provides the binary
///
/// ## TOML Example
/// ```toml
/// [updater]
/// release_url = "https://api.github.com/repos/datahq/datahub-cli/releases/latest"
/// binary_name = "data"
/// check_interval_secs = 600
/// retry_interval_secs = 60
/// install_dir = "~/bin"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdaterConfig {
    /// Endpoint of the release index returning the latest release as JSON.
    #[serde(default = "default_release_url")]
    pub release_url: String,

    /// Name of the managed binary without the platform suffix.
    #[serde(default = "default_binary_name")]
    pub binary_name: String,

    /// Directory name under the per-user local application data root
    /// (Windows only).
    #[serde(default = "default_app_dir_name")]
    pub app_dir_name: String,

    /// Arguments that make the managed binary print its bare version.
    #[serde(default = "default_version_args")]
    pub version_args: Vec<String>,

    /// Seconds between host start-up and the first cycle.
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,

    /// Seconds between cycles after a successful cycle.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Seconds between cycles after a failed cycle.
    ///
    /// When unset, one tenth of `check_interval_secs` is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval_secs: Option<u64>,

    /// Overrides the platform's install directory. `~` and environment
    /// variables are expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<String>,

    /// Known-good executable whose permission bits are mirrored onto the
    /// installed binary. Looked up on `PATH` when not absolute.
    #[serde(default = "default_reference_executable")]
    pub reference_executable: String,

    /// Whether to verify SHA-256 checksums when a release publishes them.
    #[serde(default = "default_verify_checksum")]
    pub verify_checksum: bool,

    /// Run the loop even where a system package manager is expected to
    /// provide the binary.
    #[serde(default)]
    pub run_on_package_managed_platforms: bool,

    /// Seconds to wait for the managed binary to print its version.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

/// Settings for the privilege escalation prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElevationConfig {
    /// Approve every elevation request without asking.
    #[serde(default)]
    pub assume_yes: bool,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            release_url: default_release_url(),
            binary_name: default_binary_name(),
            app_dir_name: default_app_dir_name(),
            version_args: default_version_args(),
            initial_delay_secs: default_initial_delay_secs(),
            check_interval_secs: default_check_interval_secs(),
            retry_interval_secs: None,
            install_dir: None,
            reference_executable: default_reference_executable(),
            verify_checksum: default_verify_checksum(),
            run_on_package_managed_platforms: false,
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl UpdaterConfig {
    /// Delay before the first cycle.
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    /// Delay after a successful cycle.
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Delay after a failed cycle.
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        let derived = match self.retry_interval_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self.check_interval() / RETRY_INTERVAL_DIVISOR as u32,
        };
        derived.max(MIN_RETRY_INTERVAL)
    }

    /// Timeout for version probes.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// The install directory override with `~` and variables expanded.
    pub fn install_dir_override(&self) -> Result<Option<PathBuf>, UpdateError> {
        self.install_dir
            .as_deref()
            .map(|raw| {
                shellexpand::full(raw).map(|expanded| PathBuf::from(expanded.as_ref())).map_err(
                    |e| UpdateError::Config {
                        message: format!("Invalid updater.install_dir '{raw}': {e}"),
                    },
                )
            })
            .transpose()
    }

    /// Check that the configuration can drive the update loop.
    pub fn validate(&self) -> Result<(), UpdateError> {
        if !(self.release_url.starts_with("https://") || self.release_url.starts_with("http://")) {
            return Err(UpdateError::Config {
                message: format!(
                    "updater.release_url must be an http(s) URL, got '{}'",
                    self.release_url
                ),
            });
        }

        if self.binary_name.trim().is_empty() {
            return Err(UpdateError::Config {
                message: "updater.binary_name must not be empty".to_string(),
            });
        }

        if self.check_interval_secs == 0 || self.retry_interval_secs == Some(0) {
            return Err(UpdateError::Config {
                message: "updater intervals must be greater than zero".to_string(),
            });
        }

        if self.version_args.is_empty() {
            return Err(UpdateError::Config {
                message: "updater.version_args must name at least one argument".to_string(),
            });
        }

        Ok(())
    }
}

fn default_release_url() -> String {
    DEFAULT_RELEASE_URL.to_string()
}

fn default_binary_name() -> String {
    DEFAULT_BINARY_NAME.to_string()
}

fn default_app_dir_name() -> String {
    DEFAULT_APP_DIR_NAME.to_string()
}

fn default_version_args() -> Vec<String> {
    vec!["--version".to_string()]
}

const fn default_initial_delay_secs() -> u64 {
    DEFAULT_INITIAL_DELAY_SECS
}

const fn default_check_interval_secs() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

fn default_reference_executable() -> String {
    if cfg!(windows) {
        "cmd".to_string()
    } else {
        "sh".to_string()
    }
}

const fn default_verify_checksum() -> bool {
    true
}

const fn default_probe_timeout_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}
