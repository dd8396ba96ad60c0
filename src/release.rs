//! Resolving the latest published artifact for this platform.
//!
//! The release index is a GitHub-style "latest release" document:
//!
//! ```json
//! {
//!   "tag_name": "v2.3.0",
//!   "html_url": "https://github.com/datahq/datahub-cli/releases/tag/v2.3.0",
//!   "assets": [
//!     { "name": "data-macos-x64.gz", "browser_download_url": "https://..." },
//!     { "name": "data-windows-x64.exe.gz", "browser_download_url": "https://..." }
//!   ]
//! }
//! ```
//!
//! The asset for a platform is the one whose second hyphen-delimited name
//! token equals the platform's release name, compared case-insensitively.
//! The resolver never retries; retry policy belongs to the update loop.

use crate::constants::RELEASE_QUERY_TIMEOUT;
use crate::core::UpdateError;
use crate::platform::OsFamily;
use async_trait::async_trait;
use reqwest::StatusCode;
use semver::Version;
use serde::Deserialize;
use tracing::debug;

/// Asset names recognized as SHA-256 checksum manifests.
const CHECKSUM_ASSET_NAMES: &[&str] = &["checksums.txt", "sha256sums", "sha256sums.txt"];

/// How the artifact bytes are encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    /// Written verbatim.
    Identity,
    /// Gzip-compressed; decompressed while streaming.
    Gzip,
}

impl ContentEncoding {
    /// Infer the encoding from an asset file name.
    #[must_use]
    pub fn from_asset_name(name: &str) -> Self {
        if name.to_ascii_lowercase().ends_with(".gz") {
            Self::Gzip
        } else {
            Self::Identity
        }
    }
}

/// The latest release artifact for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Release version with the tag's `v` prefix removed.
    pub version: Version,
    /// Where the artifact is downloaded from.
    pub download_url: String,
    /// Asset file name.
    pub artifact_name: String,
    /// Encoding implied by the asset name.
    pub content_encoding: ContentEncoding,
    /// Checksum manifest published with the release, if any.
    pub checksum_url: Option<String>,
    /// Human-readable release page, if any.
    pub release_page: Option<String>,
}

/// A source of release metadata.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Fetch the latest release artifact for `os`.
    async fn latest_release(&self, os: OsFamily) -> Result<ReleaseInfo, UpdateError>;
}

#[derive(Debug, Deserialize)]
struct ReleasePayload {
    tag_name: Option<String>,
    html_url: Option<String>,
    assets: Option<Vec<AssetPayload>>,
}

#[derive(Debug, Deserialize)]
struct AssetPayload {
    name: Option<String>,
    browser_download_url: Option<String>,
}

/// [`ReleaseSource`] reading a GitHub-compatible release endpoint.
#[derive(Debug, Clone)]
pub struct GithubReleases {
    client: reqwest::Client,
    endpoint: String,
}

impl GithubReleases {
    /// Resolver for `endpoint` using `client`.
    #[must_use]
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ReleaseSource for GithubReleases {
    async fn latest_release(&self, os: OsFamily) -> Result<ReleaseInfo, UpdateError> {
        debug!("Checking for binary updates at {}", self.endpoint);

        let response = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .timeout(RELEASE_QUERY_TIMEOUT)
            .send()
            .await
            .map_err(|e| UpdateError::network("release query", e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(UpdateError::NotFound {
                reason: format!("release index {} returned 404", self.endpoint),
            });
        }
        if !status.is_success() {
            return Err(UpdateError::network("release query", format!("HTTP {status}")));
        }

        let body = response.bytes().await.map_err(|e| UpdateError::network("release query", e))?;
        let payload: ReleasePayload =
            serde_json::from_slice(&body).map_err(|e| UpdateError::NotFound {
                reason: format!("malformed release payload: {e}"),
            })?;

        select_release(payload, os)
    }
}

/// Parse a raw release document and select the asset for `os`.
pub fn parse_release(json: &str, os: OsFamily) -> Result<ReleaseInfo, UpdateError> {
    let payload: ReleasePayload = serde_json::from_str(json).map_err(|e| UpdateError::NotFound {
        reason: format!("malformed release payload: {e}"),
    })?;
    select_release(payload, os)
}

fn select_release(payload: ReleasePayload, os: OsFamily) -> Result<ReleaseInfo, UpdateError> {
    let not_found = |reason: &str| UpdateError::NotFound {
        reason: reason.to_string(),
    };

    let assets = payload.assets.filter(|assets| !assets.is_empty()).ok_or_else(|| {
        not_found("Not able to get URL of latest binary: release has no assets")
    })?;

    let tag = payload.tag_name.ok_or_else(|| not_found("release has no tag_name"))?;
    let version = Version::parse(tag.trim().trim_start_matches('v')).map_err(|e| {
        UpdateError::NotFound {
            reason: format!("release tag '{tag}' is not a semantic version: {e}"),
        }
    })?;

    let platform = os.release_name();
    let asset = assets
        .iter()
        .find(|asset| {
            asset
                .name
                .as_deref()
                .and_then(|name| name.split('-').nth(1))
                .is_some_and(|token| token.eq_ignore_ascii_case(platform))
        })
        .ok_or_else(|| {
            not_found(&format!("Not able to select an asset of the latest binary for {platform}"))
        })?;

    let artifact_name = asset.name.clone().unwrap_or_default();
    let download_url = asset
        .browser_download_url
        .clone()
        .filter(|url| !url.is_empty())
        .ok_or_else(|| not_found("Latest release doesn't contain a binary download URL"))?;

    let checksum_url = assets
        .iter()
        .find(|asset| {
            asset.name.as_deref().is_some_and(|name| {
                CHECKSUM_ASSET_NAMES.contains(&name.to_ascii_lowercase().as_str())
            })
        })
        .and_then(|asset| asset.browser_download_url.clone());

    debug!("Latest release {} offers {} for {}", version, artifact_name, platform);

    Ok(ReleaseInfo {
        version,
        content_encoding: ContentEncoding::from_asset_name(&artifact_name),
        download_url,
        artifact_name,
        checksum_url,
        release_page: payload.html_url,
    })
}
