//! Test utilities for binkeeper
//!
//! Helpers shared by unit tests and the integration tests under `tests/`:
//! logging set-up, fake managed binaries, and an elevation gateway that runs
//! commands without escalating.
//!
//! Fake binaries are `#!/bin/sh` scripts, so anything that executes them is
//! Unix-only.

use crate::core::UpdateError;
use crate::elevation::{ElevatedCommand, ElevationGateway};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`. Does nothing when neither
/// is set.
///
/// ```bash
/// RUST_LOG=binkeeper=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// Write an executable shell script `dir/name` running `body`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("make script executable");
    path
}

/// Script body of a managed binary that reports `version`.
#[must_use]
pub fn fake_binary_body(version: &str) -> String {
    format!("echo {version}")
}

/// Elevation gateway that approves everything and runs the command with the
/// current user's rights, recording each justification.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    requests: Mutex<Vec<(String, String)>>,
}

impl RecordingGateway {
    /// Recorded `(command, justification)` pairs, in order.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().map(|requests| requests.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ElevationGateway for RecordingGateway {
    async fn run_elevated(
        &self,
        command: &ElevatedCommand,
        justification: &str,
    ) -> Result<(), UpdateError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((command.as_str().to_string(), justification.to_string()));
        }

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command.as_str())
            .output()
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(UpdateError::PermissionDenied {
                operation: command.as_str().to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
