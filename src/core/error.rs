//! Error handling for binkeeper
//!
//! This module provides the error taxonomy shared by every component of the
//! installer and the user-friendly error reporting used by the CLI host. The
//! error system follows two principles:
//! 1. **Strongly-typed errors** so the update loop can turn any failure into a
//!    scheduling decision without string matching
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Error Categories
//!
//! - **Transport**: [`UpdateError::Network`], [`UpdateError::Offline`]
//! - **Release metadata**: [`UpdateError::NotFound`]
//! - **Artifact**: [`UpdateError::Functional`]
//! - **Placement**: [`UpdateError::Install`], [`UpdateError::PermissionDenied`]
//! - **Environment**: [`UpdateError::Path`], [`UpdateError::Config`]
//!
//! Components never retry internally. Every error bubbles unchanged to the
//! update loop, which consults [`UpdateError::retry_kind`] to pick the next
//! delay.
//!
//! # Examples
//!
//! ```rust,no_run
//! use binkeeper::core::{RetryKind, UpdateError};
//!
//! let error = UpdateError::Offline;
//! assert_eq!(error.retry_kind(), RetryKind::Fast);
//! assert!(!error.is_user_facing());
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for installer and updater operations.
///
/// Each variant corresponds to one failure class of the update cycle. The
/// variants carry plain strings rather than source errors so that outcomes can
/// be cloned into status reports and persisted records.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Transport-level failure talking to the release index or artifact host.
    #[error("Network error during {operation}: {reason}")]
    Network {
        /// What was being attempted (e.g., "release query")
        operation: String,
        /// Transport error text
        reason: String,
    },

    /// Connectivity was lost before or during an operation.
    #[error("Went offline, stopping the current operation")]
    Offline,

    /// Release metadata was malformed or had no artifact for this platform.
    #[error("No usable release found: {reason}")]
    NotFound {
        /// Why the release could not be used
        reason: String,
    },

    /// The downloaded artifact failed its self-test.
    #[error("The downloaded binary doesn't work ({path}): {reason}")]
    Functional {
        /// Path of the rejected candidate
        path: String,
        /// Why verification failed
        reason: String,
    },

    /// Placing a verified candidate at the canonical path failed.
    #[error("Failed to install binary at {path}: {reason}")]
    Install {
        /// Canonical install path
        path: String,
        /// Failure text
        reason: String,
    },

    /// Elevation was declined, or the OS denied even elevated access.
    #[error("Permission denied: {operation}: {reason}")]
    PermissionDenied {
        /// Command or operation that needed privileges
        operation: String,
        /// Denial text, verbatim from the escalated process when available
        reason: String,
    },

    /// The install directory could not be persisted on the search path.
    #[error("Could not update the search path: {reason}")]
    Path {
        /// Failure text
        reason: String,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// Unclassified I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all used when an I/O error is cloned for reporting.
    #[error("{message}")]
    Other {
        /// Error text
        message: String,
    },
}

/// How soon the update loop should try again after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    /// Reschedule after the short retry interval.
    Fast,
    /// Reschedule after the regular check interval.
    Normal,
}

impl UpdateError {
    /// Classifies this error for the update loop's scheduler.
    ///
    /// Everything transient or plausibly transient retries fast. Configuration
    /// errors cannot fix themselves within a minute, so they wait for the
    /// regular interval.
    #[must_use]
    pub const fn retry_kind(&self) -> RetryKind {
        match self {
            Self::Config {
                ..
            } => RetryKind::Normal,
            _ => RetryKind::Fast,
        }
    }

    /// Whether this error should be surfaced to the user as a failure.
    ///
    /// Losing connectivity is expected on laptops and is only logged.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Offline)
    }

    /// Short stable label used in logs and persisted records.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Network {
                ..
            } => "network",
            Self::Offline => "offline",
            Self::NotFound {
                ..
            } => "not-found",
            Self::Functional {
                ..
            } => "functional",
            Self::Install {
                ..
            } => "install",
            Self::PermissionDenied {
                ..
            } => "permission-denied",
            Self::Path {
                ..
            } => "path",
            Self::Config {
                ..
            } => "config",
            Self::Io(_) | Self::Other {
                ..
            } => "io",
        }
    }

    pub(crate) fn network(operation: &str, error: impl fmt::Display) -> Self {
        Self::Network {
            operation: operation.to_string(),
            reason: error.to_string(),
        }
    }
}

impl Clone for UpdateError {
    fn clone(&self) -> Self {
        match self {
            Self::Network {
                operation,
                reason,
            } => Self::Network {
                operation: operation.clone(),
                reason: reason.clone(),
            },
            Self::Offline => Self::Offline,
            Self::NotFound {
                reason,
            } => Self::NotFound {
                reason: reason.clone(),
            },
            Self::Functional {
                path,
                reason,
            } => Self::Functional {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::Install {
                path,
                reason,
            } => Self::Install {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::PermissionDenied {
                operation,
                reason,
            } => Self::PermissionDenied {
                operation: operation.clone(),
                reason: reason.clone(),
            },
            Self::Path {
                reason,
            } => Self::Path {
                reason: reason.clone(),
            },
            Self::Config {
                message,
            } => Self::Config {
                message: message.clone(),
            },
            // io::Error is not Clone, keep its text
            Self::Io(e) => Self::Other {
                message: format!("IO error: {e}"),
            },
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Error wrapper that adds a suggestion and details for CLI display.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: UpdateError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: UpdateError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Attach a suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach details.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with suggestions.
///
/// Walks the error chain looking for an [`UpdateError`]; falls back to a
/// generic message carrying the full chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    for cause in error.chain() {
        if let Some(update_error) = cause.downcast_ref::<UpdateError>() {
            return create_error_context(update_error.clone());
        }

        if let Some(io_error) = cause.downcast_ref::<std::io::Error>()
            && io_error.kind() == std::io::ErrorKind::PermissionDenied
        {
            return ErrorContext::new(UpdateError::PermissionDenied {
                operation: "file access".to_string(),
                reason: io_error.to_string(),
            })
            .with_suggestion("Check ownership of the install directory or rerun with --yes to allow elevation");
        }
    }

    ErrorContext::new(UpdateError::Other {
        message: format!("{error:#}"),
    })
}

fn create_error_context(error: UpdateError) -> ErrorContext {
    match &error {
        UpdateError::Network {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check your internet connection; the next check runs automatically"),
        UpdateError::Offline => ErrorContext::new(error)
            .with_details("The download was stopped because connectivity was lost"),
        UpdateError::NotFound {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Verify `updater.release_url` in your configuration")
            .with_details("The release index must list an asset named <tool>-<platform>-... for this OS"),
        UpdateError::Functional {
            ..
        } => ErrorContext::new(error)
            .with_details("The artifact was discarded and the installed binary was left untouched"),
        UpdateError::PermissionDenied {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Approve the permission prompt, or pass --yes for unattended runs"),
        UpdateError::Path {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Add the install directory to your PATH manually"),
        UpdateError::Config {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check the TOML syntax and values in your binkeeper config file"),
        _ => ErrorContext::new(error),
    }
}
