//! Running commands with administrator rights after explicit consent.
//!
//! The installer never escalates on its own. It builds an
//! [`ElevatedCommand`] and hands it to an [`ElevationGateway`] together with
//! a one-sentence justification. [`PromptingGateway`] asks a
//! [`ConsentPrompt`] first and only then goes through the platform's
//! escalation primitive:
//!
//! | OS family | Mechanism |
//! |-----------|-----------|
//! | macOS | `osascript` with `administrator privileges` |
//! | Windows | `powershell Start-Process -Verb RunAs` around `cmd /c` |
//! | Linux, other Unix | `pkexec sh -c` |
//!
//! Credentials are handled entirely by the OS dialog; nothing about them is
//! observed or logged here.

use crate::core::UpdateError;
use crate::platform::OsFamily;
use async_trait::async_trait;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

/// Justification shown when an existing binary must be removed.
pub const REPLACE_JUSTIFICATION: &str = "It needs to replace the existing instance of the CLI.";
/// Justification shown when the candidate must be moved into place.
pub const MOVE_JUSTIFICATION: &str = "It needs to move the downloaded CLI into its place.";
/// Justification shown when permissions must be fixed.
pub const PERMISSIONS_JUSTIFICATION: &str =
    "It needs to set the correct permissions on the downloaded CLI.";

/// A shell command line to run with elevated rights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevatedCommand {
    line: String,
}

impl ElevatedCommand {
    /// Wrap an already-quoted command line.
    #[must_use]
    pub fn raw(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
        }
    }

    /// Forcibly remove `path`.
    pub fn removal(os: OsFamily, path: &Path) -> Result<Self, UpdateError> {
        Ok(match os {
            OsFamily::Windows => Self::raw(format!("del /f {}", quote_windows(path))),
            _ => Self::raw(format!("rm -f {}", quote_unix(path)?)),
        })
    }

    /// Move `from` onto `to`, replacing it.
    pub fn relocation(os: OsFamily, from: &Path, to: &Path) -> Result<Self, UpdateError> {
        Ok(match os {
            OsFamily::Windows => {
                Self::raw(format!("move /Y {} {}", quote_windows(from), quote_windows(to)))
            }
            _ => Self::raw(format!("mv -f {} {}", quote_unix(from)?, quote_unix(to)?)),
        })
    }

    /// Mark `path` executable.
    pub fn make_executable(path: &Path) -> Result<Self, UpdateError> {
        Ok(Self::raw(format!("chmod +x {}", quote_unix(path)?)))
    }

    /// The command line.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.line
    }
}

fn quote_unix(path: &Path) -> Result<String, UpdateError> {
    let raw = path.to_string_lossy();
    shlex::try_quote(&raw).map(|quoted| quoted.into_owned()).map_err(|e| {
        UpdateError::PermissionDenied {
            operation: format!("quote {raw}"),
            reason: e.to_string(),
        }
    })
}

fn quote_windows(path: &Path) -> String {
    format!("\"{}\"", path.to_string_lossy().replace('"', ""))
}

/// Program and arguments that run `line` through the escalation primitive
/// of `os`.
#[must_use]
pub fn escalation_invocation(os: OsFamily, line: &str) -> (String, Vec<String>) {
    match os {
        OsFamily::MacOs => {
            let escaped = line.replace('\\', "\\\\").replace('"', "\\\"");
            (
                "osascript".to_string(),
                vec![
                    "-e".to_string(),
                    format!("do shell script \"{escaped}\" with administrator privileges"),
                ],
            )
        }
        OsFamily::Windows => {
            let escaped = line.replace('\'', "''");
            (
                "powershell".to_string(),
                vec![
                    "-NoProfile".to_string(),
                    "-NonInteractive".to_string(),
                    "-Command".to_string(),
                    format!(
                        "$p = Start-Process -FilePath cmd -ArgumentList '/c {escaped}' -Verb RunAs -Wait -PassThru -WindowStyle Hidden; exit $p.ExitCode"
                    ),
                ],
            )
        }
        OsFamily::Linux | OsFamily::Other(_) => (
            "pkexec".to_string(),
            vec!["sh".to_string(), "-c".to_string(), line.to_string()],
        ),
    }
}

/// Runs commands with elevated rights.
#[async_trait]
pub trait ElevationGateway: Send + Sync {
    /// Run `command` elevated after the user approved `justification`.
    ///
    /// A refusal, and any failure of the escalated process, is a
    /// [`UpdateError::PermissionDenied`].
    async fn run_elevated(
        &self,
        command: &ElevatedCommand,
        justification: &str,
    ) -> Result<(), UpdateError>;
}

/// Asks the user whether an elevated command may run.
#[async_trait]
pub trait ConsentPrompt: Send + Sync {
    /// `true` when the user approved.
    async fn confirm(&self, justification: &str) -> bool;
}

/// Interactive yes/no prompt on the terminal.
///
/// Declines without asking when stdin is not a terminal.
#[derive(Debug, Clone, Default)]
pub struct TerminalConsent;

#[async_trait]
impl ConsentPrompt for TerminalConsent {
    async fn confirm(&self, justification: &str) -> bool {
        if !std::io::stdin().is_terminal() {
            debug!("No terminal to ask for elevation, declining");
            return false;
        }

        let prompt = format!("binkeeper needs elevated permissions. {justification} Allow?");
        let answer = tokio::task::spawn_blocking(move || {
            dialoguer::Confirm::new().with_prompt(prompt).default(false).interact()
        })
        .await;

        matches!(answer, Ok(Ok(true)))
    }
}

/// Approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

#[async_trait]
impl ConsentPrompt for AssumeYes {
    async fn confirm(&self, _justification: &str) -> bool {
        true
    }
}

/// Declines everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl ConsentPrompt for DenyAll {
    async fn confirm(&self, _justification: &str) -> bool {
        false
    }
}

/// [`ElevationGateway`] that asks for consent, then escalates.
#[derive(Clone)]
pub struct PromptingGateway {
    os: OsFamily,
    consent: Arc<dyn ConsentPrompt>,
}

impl PromptingGateway {
    /// Gateway for `os` asking `consent` before each command.
    #[must_use]
    pub fn new(os: OsFamily, consent: Arc<dyn ConsentPrompt>) -> Self {
        Self {
            os,
            consent,
        }
    }
}

#[async_trait]
impl ElevationGateway for PromptingGateway {
    async fn run_elevated(
        &self,
        command: &ElevatedCommand,
        justification: &str,
    ) -> Result<(), UpdateError> {
        info!("Requesting elevated permissions: {}", justification);

        if !self.consent.confirm(justification).await {
            return Err(UpdateError::PermissionDenied {
                operation: command.as_str().to_string(),
                reason: "No permissions given".to_string(),
            });
        }

        let (program, args) = escalation_invocation(self.os, command.as_str());
        let output = Command::new(&program).args(&args).output().await.map_err(|e| {
            UpdateError::PermissionDenied {
                operation: command.as_str().to_string(),
                reason: format!("failed to run {program}: {e}"),
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(UpdateError::PermissionDenied {
                operation: command.as_str().to_string(),
                reason: if stderr.is_empty() {
                    format!("{program} exited with {}", output.status)
                } else {
                    stderr
                },
            });
        }

        debug!("Elevated command finished: {}", command.as_str());
        Ok(())
    }
}
