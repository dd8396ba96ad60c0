//! Platform-specific resolution of where the managed binary lives.
//!
//! This module answers three questions for the current operating system:
//! which directory the managed binary is installed into, what its file is
//! called (including the platform suffix), and whether that directory is
//! already on the executable search path.
//!
//! # Directory Selection
//!
//! | OS family | Install directory |
//! |-----------|-------------------|
//! | Windows | `%LOCALAPPDATA%\<app_dir_name>` (created if absent) |
//! | macOS, Linux, other Unix | `~/bin` if on `PATH`, else `/usr/local/bin` if on `PATH`, else `/usr/bin` |
//!
//! An `updater.install_dir` override replaces the table above.
//!
//! # Examples
//!
//! ```rust,no_run
//! use binkeeper::config::UpdaterConfig;
//! use binkeeper::platform::PlatformTarget;
//!
//! # fn example() -> Result<(), binkeeper::core::UpdateError> {
//! let target = PlatformTarget::detect(&UpdaterConfig::default())?;
//! println!("{} -> {}", target.os().release_name(), target.binary_path().display());
//! # Ok(())
//! # }
//! ```

pub mod search_path;

use crate::config::UpdaterConfig;
use crate::core::UpdateError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

pub use search_path::SearchPathManager;

/// Operating system families the locator distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    /// Windows, with a registry-based per-user environment store.
    Windows,
    /// macOS.
    MacOs,
    /// Linux distributions, where a package manager is expected to provide
    /// the managed binary.
    Linux,
    /// Any other Unix-like system, named by `std::env::consts::OS`.
    Other(&'static str),
}

impl OsFamily {
    /// The family this binary was compiled for.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else {
            Self::Other(std::env::consts::OS)
        }
    }

    /// Lowercase platform token used in release asset names.
    #[must_use]
    pub const fn release_name(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Linux => "linux",
            Self::Other(name) => name,
        }
    }

    /// Suffix appended to executable file names.
    #[must_use]
    pub const fn binary_suffix(self) -> &'static str {
        match self {
            Self::Windows => ".exe",
            _ => "",
        }
    }

    /// Whether the search path is persisted in a per-user registry store.
    #[must_use]
    pub const fn uses_registry_environment(self) -> bool {
        matches!(self, Self::Windows)
    }

    /// Whether the system package manager is expected to provide the binary.
    #[must_use]
    pub const fn is_package_managed(self) -> bool {
        matches!(self, Self::Linux)
    }
}

/// Snapshot of the environment state the locator depends on.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// Raw `PATH` value.
    pub path_var: Option<OsString>,
    /// The user's home directory.
    pub home: Option<PathBuf>,
    /// The per-user local application data root.
    pub local_app_data: Option<PathBuf>,
}

impl Environment {
    /// Capture the current process environment.
    #[must_use]
    pub fn capture() -> Self {
        Self {
            path_var: std::env::var_os("PATH"),
            home: dirs::home_dir(),
            local_app_data: dirs::data_local_dir(),
        }
    }

    /// Entries of the search path, in order.
    #[must_use]
    pub fn path_entries(&self) -> Vec<PathBuf> {
        self.path_var.as_ref().map(|raw| std::env::split_paths(raw).collect()).unwrap_or_default()
    }

    /// Whether `dir` is an entry of the search path.
    ///
    /// Comparison ignores trailing separators, and case on Windows.
    #[must_use]
    pub fn contains_path_entry(&self, os: OsFamily, dir: &Path) -> bool {
        let wanted = normalize_entry(os, &dir.to_string_lossy());
        self.path_entries().iter().any(|entry| normalize_entry(os, &entry.to_string_lossy()) == wanted)
    }
}

pub(crate) fn normalize_entry(os: OsFamily, entry: &str) -> String {
    let trimmed = entry.trim().trim_end_matches(['/', '\\']);
    if os.uses_registry_environment() {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    }
}

/// Where the managed binary lives on this platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformTarget {
    os: OsFamily,
    install_directory: PathBuf,
    binary_path: PathBuf,
    on_search_path: bool,
}

static DETECTED: OnceLock<PlatformTarget> = OnceLock::new();

impl PlatformTarget {
    /// Resolve the target for the running process.
    ///
    /// The first successful resolution is memoized for the rest of the
    /// process; later calls return it regardless of `config`.
    pub fn detect(config: &UpdaterConfig) -> Result<Self, UpdateError> {
        if let Some(target) = DETECTED.get() {
            return Ok(target.clone());
        }

        let target = Self::resolve(OsFamily::current(), &Environment::capture(), config)?;
        Ok(DETECTED.get_or_init(|| target).clone())
    }

    /// Resolve the target for `os` from an environment snapshot.
    ///
    /// Creates the install directory on Windows when it does not exist.
    pub fn resolve(
        os: OsFamily,
        env: &Environment,
        config: &UpdaterConfig,
    ) -> Result<Self, UpdateError> {
        let install_directory = match config.install_dir_override()? {
            Some(dir) => dir,
            None if os.uses_registry_environment() => {
                let root = env.local_app_data.as_ref().ok_or_else(|| UpdateError::Config {
                    message: "Unable to determine the local application data directory".to_string(),
                })?;
                let dir = root.join(&config.app_dir_name);
                std::fs::create_dir_all(&dir)?;
                dir
            }
            None => select_unix_directory(env),
        };

        let binary_path =
            install_directory.join(format!("{}{}", config.binary_name, os.binary_suffix()));
        let on_search_path = env.contains_path_entry(os, &install_directory);

        debug!(
            "Resolved install target {} (on PATH: {})",
            binary_path.display(),
            on_search_path
        );

        Ok(Self {
            os,
            install_directory,
            binary_path,
            on_search_path,
        })
    }

    /// The OS family this target was resolved for.
    #[must_use]
    pub const fn os(&self) -> OsFamily {
        self.os
    }

    /// Directory the managed binary is installed into.
    #[must_use]
    pub fn install_directory(&self) -> &Path {
        &self.install_directory
    }

    /// Canonical path of the managed binary.
    #[must_use]
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Platform suffix of the binary file name.
    #[must_use]
    pub const fn binary_suffix(&self) -> &'static str {
        self.os.binary_suffix()
    }

    /// Whether the install directory was on `PATH` when resolved.
    #[must_use]
    pub const fn on_search_path(&self) -> bool {
        self.on_search_path
    }
}

fn select_unix_directory(env: &Environment) -> PathBuf {
    let os = OsFamily::Linux;

    if let Some(home) = &env.home {
        let user_bin = home.join("bin");
        if env.contains_path_entry(os, &user_bin) {
            return user_bin;
        }
    }

    let local_bin = PathBuf::from("/usr/local/bin");
    if env.contains_path_entry(os, &local_bin) {
        return local_bin;
    }

    PathBuf::from("/usr/bin")
}
