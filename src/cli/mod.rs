//! Command-line host for the updater.
//!
//! The binary is a thin shell around the library: it loads the
//! configuration, wires the components together and presents events on the
//! console.
//!
//! # Commands
//!
//! - `watch` - run the update loop until interrupted
//! - `check` - run one cycle now; exits non-zero when it fails
//! - `status` - show the install target, versions, and the last recorded cycle
//! - `ensure-path` - put the install directory on the persistent search path
//!
//! # Global Options
//!
//! - `--config <PATH>` - configuration file (also `BINKEEPER_CONFIG`)
//! - `-v/--verbose`, `-q/--quiet` - log level (`RUST_LOG` wins over both)
//! - `--yes` - approve elevation prompts without asking
//! - `--no-progress` - no progress bars (also `BINKEEPER_NO_PROGRESS`)

mod check;
pub mod common;
mod ensure_path;
pub mod reporter;
mod status;
mod watch;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

pub use common::HostContext;
pub use reporter::ConsoleReporter;

/// Options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Explicit configuration file.
    pub config_path: Option<PathBuf>,
    /// Approve elevation prompts without asking.
    pub assume_yes: bool,
    /// Disable progress bars.
    pub no_progress: bool,
}

/// Keeps a companion command-line tool installed and up to date.
#[derive(Parser, Debug)]
#[command(
    name = "binkeeper",
    about = "Keep a companion command-line tool installed and up to date",
    version,
    long_about = "binkeeper checks a release index for the latest build of a managed binary, \
                  verifies that the download actually runs, and atomically installs it on \
                  your PATH, asking for elevated permissions only when it must."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Approve privilege escalation prompts without asking
    #[arg(short, long, global = true)]
    yes: bool,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the update loop until interrupted
    Watch(watch::WatchCommand),

    /// Check for an update once and install it
    Check(check::CheckCommand),

    /// Show the install target and versions
    Status(status::StatusCommand),

    /// Add the install directory to the persistent search path
    EnsurePath(ensure_path::EnsurePathCommand),
}

impl Cli {
    /// Log level selected by `--verbose` / `--quiet`.
    #[must_use]
    pub const fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::DEBUG
        } else if self.quiet {
            LevelFilter::ERROR
        } else {
            LevelFilter::INFO
        }
    }

    /// Options shared by every command.
    #[must_use]
    pub fn global_options(&self) -> GlobalOptions {
        GlobalOptions {
            config_path: self.config.clone(),
            assume_yes: self.yes,
            no_progress: self.no_progress,
        }
    }

    /// Run the selected command.
    pub async fn execute(self) -> Result<()> {
        let options = self.global_options();
        match self.command {
            Commands::Watch(cmd) => cmd.execute(&options).await,
            Commands::Check(cmd) => cmd.execute(&options).await,
            Commands::Status(cmd) => cmd.execute(&options).await,
            Commands::EnsurePath(cmd) => cmd.execute(&options).await,
        }
    }
}
