//! Configuration for binkeeper.
//!
//! - [`global`] - loading and saving the global TOML file
//! - [`updater`] - the `[updater]` and `[elevation]` sections

pub mod global;
pub mod updater;

pub use global::GlobalConfig;
pub use updater::{ElevationConfig, UpdaterConfig};
