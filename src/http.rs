//! HTTP client construction shared by the release resolver and the downloader.

use crate::constants::{HTTP_CONNECT_TIMEOUT, USER_AGENT_PRODUCT};
use crate::core::UpdateError;

/// User agent sent with every request.
///
/// Format: `<product> <host version> rust-<rustc version> <os> (<arch>)`,
/// where the rustc version is the compiler that built this binary.
#[must_use]
pub fn user_agent() -> String {
    format!(
        "{USER_AGENT_PRODUCT} {} rust-{} {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("BINKEEPER_RUSTC_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Build the shared HTTP client.
///
/// No overall request timeout is set so long downloads are not cut off;
/// callers that need one (the release query) set it per request.
pub fn build_client() -> Result<reqwest::Client, UpdateError> {
    reqwest::Client::builder()
        .user_agent(user_agent())
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .build()
        .map_err(|e| UpdateError::network("client setup", e))
}
