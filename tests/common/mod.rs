//! Common test utilities and fixtures for binkeeper integration tests
//!
//! Provides an in-process HTTP server standing in for the release index and
//! artifact host, and a fixture that wires an [`UpdateCycle`] to it with the
//! install directory inside a temporary directory.

// Allow dead code because these utilities are used across different test files
// and not all utilities are used in every test file
#![allow(dead_code)]

use binkeeper::config::UpdaterConfig;
use binkeeper::connectivity::Connectivity;
use binkeeper::elevation::ElevationGateway;
use binkeeper::http::build_client;
use binkeeper::platform::{Environment, OsFamily, PlatformTarget};
use binkeeper::test_utils::RecordingGateway;
use binkeeper::updater::UpdateCycle;
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Name of the managed binary in fixtures.
pub const BINARY_NAME: &str = "data";

/// Asset published for the fixture platform.
pub const ASSET_NAME: &str = "data-macos-x64";

/// A canned HTTP response.
#[derive(Debug, Clone)]
pub struct Route {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    stall_after: Option<usize>,
}

impl Route {
    /// `200 OK` with `body`.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
            stall_after: None,
        }
    }

    /// An empty response with `status`.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::ok(Vec::new())
        }
    }

    /// Add a response header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Send the headers and the first `bytes` of the body, then hang.
    pub fn stall_after(mut self, bytes: usize) -> Self {
        self.stall_after = Some(bytes);
        self
    }
}

type Routes = Arc<Mutex<HashMap<String, Route>>>;
type Hits = Arc<Mutex<HashMap<String, usize>>>;

/// Minimal HTTP/1.1 server on a loopback port.
///
/// Every response closes its connection. Unknown paths get `404`.
pub struct TestServer {
    addr: SocketAddr,
    routes: Routes,
    hits: Hits,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Bind to an ephemeral port and start serving.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
        let addr = listener.local_addr().expect("test server address");
        let routes: Routes = Arc::default();
        let hits: Hits = Arc::default();

        let task = tokio::spawn({
            let routes = routes.clone();
            let hits = hits.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve_connection(stream, routes.clone(), hits.clone()));
                }
            }
        });

        Self {
            addr,
            routes,
            hits,
            task,
        }
    }

    /// Absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Serve `route` at `path`, replacing any previous route.
    pub fn route(&self, path: &str, route: Route) {
        self.routes.lock().unwrap().insert(path.to_string(), route);
    }

    /// Requests received for `path` so far.
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection(mut stream: TcpStream, routes: Routes, hits: Hits) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    let head = String::from_utf8_lossy(&request);
    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    *hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

    let route = routes.lock().unwrap().get(&path).cloned().unwrap_or_else(|| Route::status(404));

    let mut response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        route.status,
        reason_phrase(route.status),
        route.body.len()
    );
    for (name, value) in &route.headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str("\r\n");
    if stream.write_all(response.as_bytes()).await.is_err() {
        return;
    }

    let limit = route.stall_after.unwrap_or(route.body.len()).min(route.body.len());
    for piece in route.body[..limit].chunks(1024) {
        if stream.write_all(piece).await.is_err() {
            return;
        }
        let _ = stream.flush().await;
    }

    if route.stall_after.is_some() {
        std::future::pending::<()>().await;
    }
    let _ = stream.shutdown().await;
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// GitHub-style latest-release document listing `assets` served by `server`
/// under `/download/<name>`.
pub fn release_json(server: &TestServer, tag: &str, assets: &[&str]) -> String {
    let assets: Vec<_> = assets
        .iter()
        .map(|name| {
            serde_json::json!({
                "name": name,
                "browser_download_url": server.url(&format!("/download/{name}")),
            })
        })
        .collect();
    serde_json::json!({
        "tag_name": tag,
        "html_url": format!("https://example.com/releases/tag/{tag}"),
        "assets": assets,
    })
    .to_string()
}

/// Script contents of a managed binary that reports `version`.
pub fn binary_script(version: &str) -> Vec<u8> {
    format!("#!/bin/sh\necho {version}\n").into_bytes()
}

/// A working script padded to roughly `size` bytes with a comment.
pub fn padded_binary_script(version: &str, size: usize) -> Vec<u8> {
    format!("#!/bin/sh\n# {}\necho {version}\n", "x".repeat(size)).into_bytes()
}

/// Gzip `bytes`.
pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Names of download scratch directories currently in the system temp dir.
pub fn scratch_dirs() -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(std::env::temp_dir())
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .filter(|name| name.starts_with("binkeeper-download-"))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// A release server and an install directory wired together.
pub struct Fixture {
    pub dir: TempDir,
    pub server: TestServer,
    pub config: UpdaterConfig,
    pub gateway: Arc<RecordingGateway>,
}

impl Fixture {
    /// Fresh server and empty install directory; the release index is served
    /// at `/latest`.
    pub async fn new() -> Self {
        binkeeper::test_utils::init_test_logging(None);

        let dir = TempDir::new().unwrap();
        let install_dir = dir.path().join("bin");
        std::fs::create_dir_all(&install_dir).unwrap();
        let server = TestServer::start().await;

        let config = UpdaterConfig {
            release_url: server.url("/latest"),
            binary_name: BINARY_NAME.to_string(),
            install_dir: Some(install_dir.to_string_lossy().into_owned()),
            probe_timeout_secs: 10,
            ..UpdaterConfig::default()
        };

        Self {
            dir,
            server,
            config,
            gateway: Arc::new(RecordingGateway::default()),
        }
    }

    /// The install target, resolved as macOS so the search path is never
    /// touched.
    pub fn target(&self) -> PlatformTarget {
        PlatformTarget::resolve(OsFamily::MacOs, &Environment::default(), &self.config).unwrap()
    }

    /// Canonical path of the managed binary.
    pub fn binary_path(&self) -> PathBuf {
        self.target().binary_path().to_path_buf()
    }

    /// Put a managed binary reporting `version` at the canonical path.
    #[cfg(unix)]
    pub fn install_existing(&self, version: &str) -> PathBuf {
        let path = self.binary_path();
        let dir = path.parent().unwrap();
        binkeeper::test_utils::write_script(
            dir,
            BINARY_NAME,
            &binkeeper::test_utils::fake_binary_body(version),
        )
    }

    /// Publish `tag` with the platform asset serving `artifact`.
    pub fn publish(&self, tag: &str, artifact: Vec<u8>) {
        self.publish_as(tag, ASSET_NAME, Route::ok(artifact), None);
    }

    /// Publish `tag` with `route` served as asset `name`, plus a checksum
    /// manifest when `checksums` is given.
    pub fn publish_as(&self, tag: &str, name: &str, route: Route, checksums: Option<String>) {
        let mut assets = vec![name];
        if let Some(manifest) = checksums {
            assets.push("checksums.txt");
            self.server.route("/download/checksums.txt", Route::ok(manifest));
        }
        self.server.route(&format!("/download/{name}"), route);
        self.server.route("/latest", Route::ok(release_json(&self.server, tag, &assets)));
    }

    /// A cycle talking to this fixture's server.
    pub fn cycle(&self, connectivity: Connectivity) -> UpdateCycle {
        self.cycle_with_gateway(connectivity, self.gateway.clone())
    }

    /// A cycle escalating through `gateway` instead of the recording one.
    pub fn cycle_with_gateway(
        &self,
        connectivity: Connectivity,
        gateway: Arc<dyn ElevationGateway>,
    ) -> UpdateCycle {
        UpdateCycle::from_config(
            &self.config,
            self.target(),
            build_client().unwrap(),
            connectivity,
            gateway,
        )
    }

    /// Hidden staging copies left in the install directory.
    pub fn staging_leftovers(&self) -> Vec<String> {
        let dir = self.binary_path().parent().unwrap().to_path_buf();
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect()
    }

    /// Path inside the fixture's temporary directory.
    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }
}

/// Whether `path` exists and is a regular file.
pub fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}
