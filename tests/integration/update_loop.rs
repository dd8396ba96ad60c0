//! Scheduling behavior of the update loop, run on paused time.

use async_trait::async_trait;
use binkeeper::config::UpdaterConfig;
use binkeeper::connectivity::Connectivity;
use binkeeper::core::UpdateError;
use binkeeper::http::build_client;
use binkeeper::platform::{Environment, OsFamily, PlatformTarget};
use binkeeper::release::{ReleaseInfo, ReleaseSource};
use binkeeper::test_utils::RecordingGateway;
use binkeeper::updater::{
    LoopState, SilentReporter, StateRecord, UpdateCycle, UpdateEvent, UpdateLoop, UpdateOutcome,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Release source that always fails, recording when it was asked.
struct FailingReleases {
    start: Instant,
    calls: Mutex<Vec<u64>>,
    error: fn() -> UpdateError,
}

impl FailingReleases {
    fn new(error: fn() -> UpdateError) -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            calls: Mutex::default(),
            error,
        })
    }

    /// Seconds since creation at which each query arrived.
    fn call_offsets(&self) -> Vec<u64> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReleaseSource for FailingReleases {
    async fn latest_release(&self, _os: OsFamily) -> Result<ReleaseInfo, UpdateError> {
        self.calls.lock().unwrap().push(self.start.elapsed().as_secs());
        Err((self.error)())
    }
}

fn network_error() -> UpdateError {
    UpdateError::Network {
        operation: "release query".to_string(),
        reason: "connection refused".to_string(),
    }
}

fn config_error() -> UpdateError {
    UpdateError::Config {
        message: "bad release index".to_string(),
    }
}

fn loop_config(dir: &TempDir) -> UpdaterConfig {
    UpdaterConfig {
        install_dir: Some(dir.path().to_string_lossy().into_owned()),
        initial_delay_secs: 2,
        check_interval_secs: 600,
        retry_interval_secs: Some(60),
        ..UpdaterConfig::default()
    }
}

fn cycle_for(
    os: OsFamily,
    config: &UpdaterConfig,
    connectivity: Connectivity,
    releases: Arc<FailingReleases>,
) -> UpdateCycle {
    let target = PlatformTarget::resolve(os, &Environment::default(), config).unwrap();
    UpdateCycle::from_config(
        config,
        target,
        build_client().unwrap(),
        connectivity,
        Arc::new(RecordingGateway::default()),
    )
    .with_release_source(releases)
}

#[tokio::test(start_paused = true)]
async fn test_failed_cycles_retry_after_retry_interval() {
    let dir = TempDir::new().unwrap();
    let config = loop_config(&dir);
    let releases = FailingReleases::new(network_error);
    let update_loop = UpdateLoop::new(
        cycle_for(OsFamily::MacOs, &config, Connectivity::always_online(), releases.clone()),
        &config,
        Arc::new(SilentReporter),
    );

    update_loop.run(tokio::time::sleep(Duration::from_secs(2 + 60 + 60 + 30))).await.unwrap();

    assert_eq!(releases.call_offsets(), vec![2, 62, 122]);
}

#[tokio::test(start_paused = true)]
async fn test_config_errors_wait_for_regular_interval() {
    let dir = TempDir::new().unwrap();
    let config = loop_config(&dir);
    let releases = FailingReleases::new(config_error);
    let update_loop = UpdateLoop::new(
        cycle_for(OsFamily::MacOs, &config, Connectivity::always_online(), releases.clone()),
        &config,
        Arc::new(SilentReporter),
    );

    update_loop.run(tokio::time::sleep(Duration::from_secs(2 + 600 + 120))).await.unwrap();

    assert_eq!(releases.call_offsets(), vec![2, 602]);
}

#[tokio::test(start_paused = true)]
async fn test_offline_cycles_are_skipped_on_the_regular_interval() {
    let dir = TempDir::new().unwrap();
    let config = loop_config(&dir);
    let releases = FailingReleases::new(network_error);
    let (_handle, connectivity) = Connectivity::new(false);
    let (tx, mut rx) = mpsc::unbounded_channel::<UpdateEvent>();
    let update_loop = UpdateLoop::new(
        cycle_for(OsFamily::MacOs, &config, connectivity, releases.clone()),
        &config,
        Arc::new(tx),
    );

    update_loop.run(tokio::time::sleep(Duration::from_secs(2 + 600 + 120))).await.unwrap();
    drop(update_loop);

    let mut finished = Vec::new();
    while let Some(event) = rx.recv().await {
        if let UpdateEvent::Finished(outcome) = event {
            finished.push(outcome);
        }
    }
    assert_eq!(finished.len(), 2);
    assert!(finished.iter().all(|outcome| matches!(outcome, UpdateOutcome::SkippedOffline)));
    assert!(releases.call_offsets().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_first_check() {
    let dir = TempDir::new().unwrap();
    let config = loop_config(&dir);
    let releases = FailingReleases::new(network_error);
    let update_loop = UpdateLoop::new(
        cycle_for(OsFamily::MacOs, &config, Connectivity::always_online(), releases.clone()),
        &config,
        Arc::new(SilentReporter),
    );

    update_loop.run(tokio::time::sleep(Duration::from_secs(1))).await.unwrap();

    assert!(releases.call_offsets().is_empty());
    assert_eq!(*update_loop.subscribe().borrow(), LoopState::Idle);
}

#[tokio::test]
async fn test_loop_disabled_on_package_managed_platform() {
    let dir = TempDir::new().unwrap();
    let config = loop_config(&dir);
    let releases = FailingReleases::new(network_error);
    let update_loop = UpdateLoop::new(
        cycle_for(OsFamily::Linux, &config, Connectivity::always_online(), releases.clone()),
        &config,
        Arc::new(SilentReporter),
    );

    assert!(!update_loop.is_enabled());
    let result =
        tokio::time::timeout(Duration::from_secs(5), update_loop.run(std::future::pending())).await;
    assert!(matches!(result, Ok(Ok(()))), "disabled loop must return immediately");
    assert!(releases.call_offsets().is_empty());

    let forced = UpdaterConfig {
        run_on_package_managed_platforms: true,
        ..config
    };
    assert!(UpdateLoop::is_enabled_for(OsFamily::Linux, &forced));
}

#[tokio::test]
async fn test_run_once_records_state() {
    let dir = TempDir::new().unwrap();
    let config = loop_config(&dir);
    let state_path = dir.path().join("state.json");
    let update_loop = UpdateLoop::new(
        cycle_for(
            OsFamily::MacOs,
            &config,
            Connectivity::always_online(),
            FailingReleases::new(network_error),
        ),
        &config,
        Arc::new(SilentReporter),
    )
    .with_state_file(state_path.clone());
    let mut states = update_loop.subscribe();

    let outcome = update_loop.run_once().await;

    assert!(matches!(outcome.error(), Some(UpdateError::Network { .. })));
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), LoopState::Idle);

    let record = StateRecord::load(&state_path).unwrap().expect("state record written");
    assert!(!record.success);
    assert_eq!(record.error_kind.as_deref(), Some("network"));
    assert_eq!(record.next_check_at, None);
    assert!(record.outcome.starts_with("Update failed: Network error"));
}
