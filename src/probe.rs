//! Asking a managed binary which version it is.
//!
//! Used twice per cycle: on the installed binary to decide whether an update
//! is needed, and by the installer on a downloaded candidate as its
//! functional self-test. The binary must print a bare semantic version
//! (optionally `v`-prefixed) and nothing else on stdout, and exit zero.

use semver::Version;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Why a version probe produced no version.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    /// The binary could not be started.
    #[error("failed to run: {0}")]
    Spawn(#[source] std::io::Error),

    /// The binary exited unsuccessfully.
    #[error("exited with {status}: {stderr}")]
    ExitStatus {
        /// Exit status as displayed by the OS
        status: String,
        /// Trimmed stderr
        stderr: String,
    },

    /// Nothing was printed on stdout.
    #[error("printed no version")]
    EmptyOutput,

    /// Stdout was not a semantic version.
    #[error("printed '{output}', which is not a semantic version")]
    Unparseable {
        /// Trimmed stdout
        output: String,
    },

    /// The binary did not finish in time.
    #[error("did not finish within {0:?}")]
    Timeout(Duration),
}

/// Run `binary args...` from `cwd` and parse its version output.
pub async fn run_version_command(
    binary: &Path,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
) -> Result<Version, ProbeFailure> {
    let mut command = Command::new(binary);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| ProbeFailure::Timeout(timeout))?
        .map_err(ProbeFailure::Spawn)?;

    if !output.status.success() {
        return Err(ProbeFailure::ExitStatus {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_version_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse the stdout of a version command.
pub fn parse_version_output(stdout: &str) -> Result<Version, ProbeFailure> {
    let output = stdout.trim();
    if output.is_empty() {
        return Err(ProbeFailure::EmptyOutput);
    }

    let candidate = output.strip_prefix('v').unwrap_or(output);
    Version::parse(candidate).map_err(|_| ProbeFailure::Unparseable {
        output: output.to_string(),
    })
}

/// Working directory for probes.
///
/// The home directory, so that a file named like the binary in the host's
/// current directory is never picked up instead.
#[must_use]
pub fn neutral_working_dir() -> PathBuf {
    dirs::home_dir().filter(|home| home.is_dir()).unwrap_or_else(std::env::temp_dir)
}

/// Probe for the binary at the canonical install path.
#[derive(Debug, Clone)]
pub struct VersionProbe {
    binary: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl VersionProbe {
    /// Probe `binary` with the given version arguments.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            args,
            timeout,
        }
    }

    /// The binary being probed.
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run the probe, keeping the failure reason.
    pub async fn probe(&self) -> Result<Version, ProbeFailure> {
        run_version_command(&self.binary, &self.args, &neutral_working_dir(), self.timeout).await
    }

    /// The installed version, or `None` when absent or not working.
    pub async fn current_version(&self) -> Option<Version> {
        if !self.binary.exists() {
            debug!("No binary at {}", self.binary.display());
            return None;
        }

        match self.probe().await {
            Ok(version) => Some(version),
            Err(failure) => {
                warn!("Installed binary {} is not working: {}", self.binary.display(), failure);
                None
            }
        }
    }
}
