//! Global constants used throughout the binkeeper codebase.
//!
//! Timing defaults for the update loop, timeouts for external processes,
//! and the environment variable names the host honors. Defining them
//! centrally keeps the scheduling numbers discoverable.

use std::time::Duration;

/// Delay between host start-up and the first update cycle (2 seconds).
pub const DEFAULT_INITIAL_DELAY_SECS: u64 = 2;

/// Interval between successful update cycles (10 minutes).
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 600;

/// Divisor applied to the check interval to derive the retry interval
/// after a failed cycle when none is configured.
pub const RETRY_INTERVAL_DIVISOR: u64 = 10;

/// Lower bound for any derived retry interval.
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Timeout for invoking a managed binary with its version flag (30 seconds).
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;

/// Timeout for the release index request (30 seconds).
///
/// Downloads have no overall timeout; they are bounded by the connect
/// timeout and by the connectivity signal instead.
pub const RELEASE_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout for all HTTP requests (15 seconds).
pub const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Interval between connectivity probes in `watch` mode (30 seconds).
pub const CONNECTIVITY_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Timeout for a single connectivity probe (5 seconds).
pub const CONNECTIVITY_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default endpoint of the remote release index.
pub const DEFAULT_RELEASE_URL: &str =
    "https://api.github.com/repos/datahq/datahub-cli/releases/latest";

/// Default name of the managed binary, without platform suffix.
pub const DEFAULT_BINARY_NAME: &str = "data";

/// Default per-user application directory name on Windows.
pub const DEFAULT_APP_DIR_NAME: &str = "datahub-cli";

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "BINKEEPER_CONFIG";

/// Environment variable disabling progress bars.
pub const NO_PROGRESS_ENV: &str = "BINKEEPER_NO_PROGRESS";

/// Sentinel variable set and cleared to broadcast a `Path` change on Windows.
pub const PATH_BROADCAST_SENTINEL: &str = "BINKEEPER_ENSURE_PATH_TMP";

/// Product token used in the HTTP user agent.
pub const USER_AGENT_PRODUCT: &str = "binkeeper";
