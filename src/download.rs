//! Streaming artifact downloads into an isolated scratch directory.
//!
//! Every download gets its own [`TempDir`]. The body is streamed chunk by
//! chunk so that progress can be reported and so that the transfer can be
//! abandoned as soon as the connectivity provider reports offline. Gzip
//! artifacts are decompressed on the fly; the SHA-256 of the bytes as
//! transferred is computed alongside for checksum verification.
//!
//! The caller owns the returned [`DownloadResult`] and must call
//! [`DownloadResult::cleanup`] on every exit path. On failure the downloader
//! removes the scratch directory itself before returning.

use crate::connectivity::Connectivity;
use crate::core::UpdateError;
use crate::release::ContentEncoding;
use flate2::write::GzDecoder;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Turns byte counts into deduplicated, monotonic whole percentages.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: Option<u64>,
    received: u64,
    last: Option<u8>,
}

impl ProgressTracker {
    /// Tracker for a body of `total` bytes. Unknown or zero length disables
    /// reporting.
    #[must_use]
    pub fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|&total| total > 0),
            received: 0,
            last: None,
        }
    }

    /// Record `bytes` more received. Returns the new percentage when it
    /// differs from the last one reported.
    pub fn advance(&mut self, bytes: u64) -> Option<u8> {
        let total = self.total?;
        self.received = self.received.saturating_add(bytes);

        let percentage = (u128::from(self.received) * 100 / u128::from(total)).min(100) as u8;
        if self.last.is_some_and(|last| percentage <= last) {
            return None;
        }
        self.last = Some(percentage);
        Some(percentage)
    }
}

/// A downloaded artifact in its scratch directory.
#[derive(Debug)]
pub struct DownloadResult {
    local_path: PathBuf,
    sha256: String,
    scratch: Option<TempDir>,
}

impl DownloadResult {
    /// Path of the downloaded (and decompressed) file.
    #[must_use]
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Hex SHA-256 of the bytes as transferred.
    #[must_use]
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    /// Whether the scratch directory has not been removed yet.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.scratch.is_some()
    }

    /// Remove the scratch directory. Later calls do nothing.
    pub fn cleanup(&mut self) -> Result<(), UpdateError> {
        let Some(scratch) = self.scratch.take() else {
            return Ok(());
        };
        let path = scratch.path().to_path_buf();
        scratch.close()?;
        debug!("Removed scratch directory {}", path.display());
        Ok(())
    }
}

enum Sink {
    Plain(File),
    Gzip(GzDecoder<Vec<u8>>, File),
}

impl Sink {
    async fn write(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Plain(file) => file.write_all(chunk).await,
            Self::Gzip(decoder, file) => {
                decoder.write_all(chunk)?;
                let decoded = std::mem::take(decoder.get_mut());
                file.write_all(&decoded).await
            }
        }
    }

    async fn finish(self) -> std::io::Result<()> {
        let mut file = match self {
            Self::Plain(file) => file,
            Self::Gzip(mut decoder, mut file) => {
                decoder.try_finish()?;
                let decoded = std::mem::take(decoder.get_mut());
                file.write_all(&decoded).await?;
                file
            }
        };
        file.flush().await?;
        file.sync_all().await
    }
}

/// Downloads artifacts over HTTP.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
    connectivity: Connectivity,
}

impl HttpDownloader {
    /// Downloader using `client`, abandoning transfers when `connectivity`
    /// goes offline.
    #[must_use]
    pub fn new(client: reqwest::Client, connectivity: Connectivity) -> Self {
        Self {
            client,
            connectivity,
        }
    }

    /// Fetch `url` into a fresh scratch directory.
    ///
    /// The file is named after `artifact_name`, minus a `.gz` suffix when the
    /// body is decompressed. `on_progress` receives each new whole percentage
    /// when the server sends a content length.
    pub async fn download(
        &self,
        url: &str,
        artifact_name: &str,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<DownloadResult, UpdateError> {
        if !self.connectivity.is_online() {
            return Err(UpdateError::Offline);
        }

        let scratch = tempfile::Builder::new().prefix("binkeeper-download-").tempdir()?;
        debug!("Downloading {} into {}", url, scratch.path().display());

        match self.fetch_into(url, artifact_name, scratch.path(), on_progress).await {
            Ok((local_path, sha256)) => {
                info!("Downloaded {} to {}", artifact_name, local_path.display());
                Ok(DownloadResult {
                    local_path,
                    sha256,
                    scratch: Some(scratch),
                })
            }
            Err(error) => {
                if let Err(cleanup_error) = scratch.close() {
                    warn!("Failed to remove scratch directory: {}", cleanup_error);
                }
                Err(error)
            }
        }
    }

    async fn fetch_into(
        &self,
        url: &str,
        artifact_name: &str,
        dir: &Path,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<(PathBuf, String), UpdateError> {
        let mut response = tokio::select! {
            biased;
            () = self.connectivity.went_offline() => return Err(UpdateError::Offline),
            response = self.client.get(url).send() => {
                response.map_err(|e| UpdateError::network("download", e))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::network("download", format!("HTTP {status} for {url}")));
        }

        let header_gzip = response
            .headers()
            .get(reqwest::header::CONTENT_ENCODING)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("gzip"));
        let gzip = header_gzip || ContentEncoding::from_asset_name(artifact_name) == ContentEncoding::Gzip;

        let file_name = local_file_name(artifact_name, gzip);
        let local_path = dir.join(&file_name);
        let file = File::create(&local_path).await?;
        let mut sink = if gzip {
            Sink::Gzip(GzDecoder::new(Vec::new()), file)
        } else {
            Sink::Plain(file)
        };

        let mut tracker = ProgressTracker::new(response.content_length());
        let mut hasher = Sha256::new();

        loop {
            let chunk = tokio::select! {
                biased;
                () = self.connectivity.went_offline() => {
                    warn!("Went offline while downloading {}", artifact_name);
                    return Err(UpdateError::Offline);
                }
                chunk = response.chunk() => chunk.map_err(|e| UpdateError::network("download", e))?,
            };
            let Some(chunk) = chunk else {
                break;
            };

            hasher.update(&chunk);
            sink.write(&chunk).await.map_err(|e| decode_error(gzip, e))?;
            if let Some(percentage) = tracker.advance(chunk.len() as u64) {
                on_progress(percentage);
            }
        }

        sink.finish().await.map_err(|e| decode_error(gzip, e))?;
        Ok((local_path, hex::encode(hasher.finalize())))
    }
}

fn decode_error(gzip: bool, error: std::io::Error) -> UpdateError {
    if gzip && matches!(error.kind(), std::io::ErrorKind::InvalidInput | std::io::ErrorKind::InvalidData) {
        UpdateError::network("download", format!("corrupt gzip stream: {error}"))
    } else {
        UpdateError::Io(error)
    }
}

fn local_file_name(artifact_name: &str, gzip: bool) -> String {
    let name = Path::new(artifact_name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "artifact".to_string());

    if gzip && let Some(stripped) = name.strip_suffix(".gz").filter(|s| !s.is_empty()) {
        return stripped.to_string();
    }
    name
}
