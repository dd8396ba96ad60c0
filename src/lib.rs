//! binkeeper - keeps one companion command-line tool installed and current.
//!
//! A background updater that checks a release index for the latest build of
//! a managed binary, downloads it into a scratch directory, verifies that it
//! actually runs, and atomically installs it on the user's `PATH`, asking for
//! elevated permissions only when a direct replace is not possible.
//!
//! # Architecture Overview
//!
//! ## Core Components
//! - [`platform`] - where the binary lives on this OS, and the persistent search path
//! - [`release`] - the latest published artifact for this platform
//! - [`probe`] - which version is installed
//! - [`download`] - streaming downloads with progress and offline cancellation
//! - [`install`] - verification and atomic placement
//! - [`elevation`] - consent-gated privileged commands
//! - [`updater`] - the cycle, the loop and its schedule
//!
//! ## Supporting Modules
//! - [`config`] - TOML configuration
//! - [`connectivity`] - online/offline status provider
//! - [`core`] - error taxonomy and user-facing error context
//! - [`http`] - HTTP client set-up
//! - [`cli`] - command-line host and console presentation
//!
//! # Control Flow
//!
//! ```text
//! UpdateLoop
//!   └─ UpdateCycle
//!        ├─ VersionProbe + ReleaseSource   (is an update needed?)
//!        ├─ HttpDownloader                 (scratch directory)
//!        ├─ Installer::verify              (checksum, self-test)
//!        ├─ Installer::install             (rename, elevated fallbacks)
//!        └─ SearchPathManager              (non-fatal)
//! ```
//!
//! # Configuration
//!
//! `~/.binkeeper/config.toml` (override with `BINKEEPER_CONFIG` or `--config`):
//!
//! ```toml
//! [updater]
//! release_url = "https://api.github.com/repos/datahq/datahub-cli/releases/latest"
//! binary_name = "data"
//! check_interval_secs = 600
//!
//! [elevation]
//! assume_yes = false
//! ```

pub mod cli;
pub mod config;
pub mod connectivity;
pub mod constants;
pub mod core;
pub mod download;
pub mod elevation;
pub mod http;
pub mod install;
pub mod platform;
pub mod probe;
pub mod release;
pub mod updater;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
