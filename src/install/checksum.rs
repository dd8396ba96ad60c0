//! SHA-256 verification of downloaded artifacts.
//!
//! Releases may publish a checksum manifest (`checksums.txt` or
//! `SHA256SUMS`) in the usual `sha256sum` format:
//!
//! ```text
//! 3b0c...e1f2  data-macos
//! 9a7d...04c8 *data-windows.exe.gz
//! ```
//!
//! The digest is compared against the bytes as transferred, before any
//! decompression, which is what the manifest describes.

use crate::core::UpdateError;
use std::path::Path;
use tracing::{debug, info, warn};

/// Find the checksum for `artifact_name` in a manifest.
#[must_use]
pub fn parse_checksums(content: &str, artifact_name: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let (checksum, filename) = (parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }

        let filename = filename.trim_start_matches('*');
        let matches = filename == artifact_name || filename.ends_with(&format!("/{artifact_name}"));
        matches.then(|| normalize(checksum))
    })
}

fn normalize(checksum: &str) -> String {
    checksum.trim().trim_start_matches("sha256:").to_ascii_lowercase()
}

/// Download a checksum manifest and look up `artifact_name`.
///
/// Returns `Ok(None)` when the manifest is unavailable or does not list the
/// artifact, so that verification is skipped rather than failed.
pub async fn fetch_expected_checksum(
    client: &reqwest::Client,
    checksums_url: &str,
    artifact_name: &str,
) -> Result<Option<String>, UpdateError> {
    debug!("Fetching checksums from: {}", checksums_url);

    let response = client
        .get(checksums_url)
        .send()
        .await
        .map_err(|e| UpdateError::network("checksum download", e))?;

    if !response.status().is_success() {
        warn!("Failed to fetch checksums file: HTTP {}", response.status());
        return Ok(None);
    }

    let content =
        response.text().await.map_err(|e| UpdateError::network("checksum download", e))?;

    let checksum = parse_checksums(&content, artifact_name);
    if checksum.is_none() {
        warn!("No checksum found for artifact: {}", artifact_name);
    }
    Ok(checksum)
}

/// Compare a computed digest with the expected one.
pub fn verify_digest(actual: &str, expected: &str, candidate: &Path) -> Result<(), UpdateError> {
    info!("Verifying checksum for: {}", candidate.display());

    if normalize(actual) != normalize(expected) {
        return Err(UpdateError::Functional {
            path: candidate.display().to_string(),
            reason: format!("checksum mismatch: expected {expected}, got {actual}"),
        });
    }

    info!("Checksum verification successful");
    Ok(())
}
