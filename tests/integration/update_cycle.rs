//! Single update cycles against the in-process release server.

use crate::common::{
    ASSET_NAME, Fixture, Route, binary_script, gzip, padded_binary_script, scratch_dirs,
    sha256_hex,
};
use binkeeper::connectivity::Connectivity;
use binkeeper::core::UpdateError;
use async_trait::async_trait;
use binkeeper::elevation::{ElevatedCommand, ElevationGateway, REPLACE_JUSTIFICATION};
use binkeeper::updater::{
    InstalledState, LoopState, SchedulePolicy, UpdateCycle, UpdateEvent, UpdateOutcome,
    UpdateReason,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use semver::Version;
use serial_test::serial;
use tokio::sync::{mpsc, watch};

/// Gateway standing in for an administrator shell: it can also remove
/// directories, which the user's own `rm -f` cannot.
#[derive(Default)]
struct AdminShell {
    justifications: Mutex<Vec<String>>,
}

#[async_trait]
impl ElevationGateway for AdminShell {
    async fn run_elevated(
        &self,
        command: &ElevatedCommand,
        justification: &str,
    ) -> Result<(), UpdateError> {
        self.justifications.lock().unwrap().push(justification.to_string());
        let line = command.as_str().replacen("rm -f ", "rm -rf ", 1);
        let output = tokio::process::Command::new("sh").arg("-c").arg(&line).output().await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(UpdateError::PermissionDenied {
                operation: line,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Occupy the canonical path with a directory that ordinary removal fails on.
fn squat(path: &Path) {
    std::fs::create_dir_all(path).unwrap();
    std::fs::write(path.join("keep"), "in use").unwrap();
}

fn v(version: &str) -> Version {
    Version::parse(version).unwrap()
}

fn artifact_path() -> String {
    format!("/download/{ASSET_NAME}")
}

async fn run_cycle(fixture: &Fixture) -> (UpdateOutcome, Vec<UpdateEvent>) {
    run(&fixture.cycle(Connectivity::always_online())).await
}

async fn run(cycle: &UpdateCycle) -> (UpdateOutcome, Vec<UpdateEvent>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<UpdateEvent>();
    let state = watch::Sender::new(LoopState::Idle);

    let outcome = cycle.run(&tx, &state).await;
    drop(tx);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (outcome, events)
}

#[tokio::test]
#[serial]
async fn test_outdated_binary_is_replaced() {
    let fixture = Fixture::new().await;
    fixture.install_existing("2.1.0");
    fixture.publish("v2.3.0", binary_script("2.3.0"));
    let before = scratch_dirs();

    let (outcome, events) = run_cycle(&fixture).await;

    assert_eq!(scratch_dirs(), before, "scratch directory must be removed after install");
    match &outcome {
        UpdateOutcome::UpdateInstalled {
            previous,
            new_version,
            reason,
            release_page,
            ..
        } => {
            assert_eq!(previous.as_ref(), Some(&v("2.1.0")));
            assert_eq!(new_version, &v("2.3.0"));
            assert_eq!(*reason, UpdateReason::Outdated);
            assert_eq!(release_page.as_deref(), Some("https://example.com/releases/tag/v2.3.0"));
        }
        other => panic!("expected an installed update, got {other:?}"),
    }
    assert_eq!(outcome.to_string(), "Updated from 2.1.0 to 2.3.0");

    assert!(events.iter().any(|event| matches!(
        event,
        UpdateEvent::UpdateAvailable { current, remote } if *current == v("2.1.0") && *remote == v("2.3.0")
    )));

    let cycle = fixture.cycle(Connectivity::always_online());
    assert_eq!(cycle.inspect_installed().await, InstalledState::Version(v("2.3.0")));
    assert!(fixture.gateway.requests().is_empty(), "plain rename needs no elevation");
}

#[tokio::test]
#[serial]
async fn test_missing_binary_is_installed() {
    let fixture = Fixture::new().await;
    fixture.publish("v2.3.0", binary_script("2.3.0"));

    let (outcome, events) = run_cycle(&fixture).await;

    match &outcome {
        UpdateOutcome::UpdateInstalled {
            previous: None,
            new_version,
            reason: UpdateReason::NotInstalled,
            ..
        } => assert_eq!(new_version, &v("2.3.0")),
        other => panic!("expected a fresh install, got {other:?}"),
    }
    assert!(matches!(events.first(), Some(UpdateEvent::NotInstalled)));
    assert!(crate::common::is_file(&fixture.binary_path()));
}

#[tokio::test]
#[serial]
async fn test_broken_binary_is_reinstalled() {
    let fixture = Fixture::new().await;
    let binary = fixture.binary_path();
    binkeeper::test_utils::write_script(binary.parent().unwrap(), "data", "exit 1");
    fixture.publish("v2.3.0", binary_script("2.3.0"));

    let (outcome, events) = run_cycle(&fixture).await;

    assert!(matches!(
        outcome,
        UpdateOutcome::UpdateInstalled {
            previous: None,
            reason: UpdateReason::ProbeFailed,
            ..
        }
    ));
    assert!(matches!(events.first(), Some(UpdateEvent::NotInstalled)));
}

#[tokio::test]
#[serial]
async fn test_current_binary_skips_download() {
    let fixture = Fixture::new().await;
    fixture.install_existing("2.3.0");
    fixture.publish("v2.3.0", binary_script("2.3.0"));

    let (outcome, events) = run_cycle(&fixture).await;

    assert!(matches!(
        &outcome,
        UpdateOutcome::NoUpdateAvailable { current } if *current == v("2.3.0")
    ));
    assert_eq!(outcome.to_string(), "No update found, 2.3.0 is the latest version");
    assert!(matches!(events.as_slice(), [UpdateEvent::NoUpdate { .. }]));
    assert_eq!(fixture.server.hits("/latest"), 1);
    assert_eq!(fixture.server.hits(&artifact_path()), 0);
}

#[tokio::test]
#[serial]
async fn test_newer_local_binary_is_kept() {
    let fixture = Fixture::new().await;
    fixture.install_existing("3.0.0");
    fixture.publish("v2.3.0", binary_script("2.3.0"));

    let (outcome, _) = run_cycle(&fixture).await;

    assert!(matches!(outcome, UpdateOutcome::NoUpdateAvailable { .. }));
    assert_eq!(fixture.server.hits(&artifact_path()), 0);
}

#[tokio::test]
#[serial]
async fn test_non_working_artifact_is_rejected() {
    let fixture = Fixture::new().await;
    fixture.install_existing("2.1.0");
    fixture.publish("v2.3.0", b"#!/bin/sh\necho boom >&2\nexit 3\n".to_vec());
    let before = scratch_dirs();

    let (outcome, _) = run_cycle(&fixture).await;

    assert!(
        matches!(outcome.error(), Some(UpdateError::Functional { .. })),
        "expected a functional error, got {outcome:?}"
    );
    let cycle = fixture.cycle(Connectivity::always_online());
    assert_eq!(cycle.inspect_installed().await, InstalledState::Version(v("2.1.0")));
    assert_eq!(scratch_dirs(), before, "rejected candidate must be cleaned up");
}

#[tokio::test]
#[serial]
async fn test_missing_platform_asset_is_not_found() {
    let fixture = Fixture::new().await;
    fixture.publish_as("v2.3.0", "data-linux-x64", Route::ok(binary_script("2.3.0")), None);

    let (outcome, _) = run_cycle(&fixture).await;

    assert!(matches!(outcome.error(), Some(UpdateError::NotFound { .. })));
    assert!(!fixture.binary_path().exists());
}

#[tokio::test]
#[serial]
async fn test_release_index_outage_is_network_error() {
    let fixture = Fixture::new().await;
    fixture.install_existing("2.1.0");
    fixture.server.route("/latest", Route::status(500));

    let (outcome, _) = run_cycle(&fixture).await;

    let error = outcome.error().expect("cycle should fail");
    assert!(matches!(error, UpdateError::Network { .. }), "got {error:?}");
    assert_eq!(
        SchedulePolicy::from_config(&fixture.config).next_delay(&outcome),
        fixture.config.retry_interval()
    );
}

#[tokio::test]
#[serial]
async fn test_going_offline_mid_download_cancels_and_cleans_up() {
    let fixture = Fixture::new().await;
    fixture.install_existing("2.1.0");
    let artifact = padded_binary_script("2.3.0", 64 * 1024);
    fixture.publish_as("v2.3.0", ASSET_NAME, Route::ok(artifact).stall_after(8 * 1024), None);
    let before = scratch_dirs();

    let (handle, connectivity) = Connectivity::new(true);
    let cycle = fixture.cycle(connectivity);
    let (tx, mut rx) = mpsc::unbounded_channel::<UpdateEvent>();
    let state = watch::Sender::new(LoopState::Idle);

    let cut_connection = async {
        while let Some(event) = rx.recv().await {
            if matches!(event, UpdateEvent::Progress(_)) {
                handle.set_online(false);
                break;
            }
        }
    };
    let (outcome, ()) = tokio::join!(cycle.run(&tx, &state), cut_connection);

    assert!(matches!(outcome.error(), Some(UpdateError::Offline)), "got {outcome:?}");
    assert_eq!(
        SchedulePolicy::from_config(&fixture.config).next_delay(&outcome),
        fixture.config.retry_interval()
    );
    assert_eq!(scratch_dirs(), before, "scratch directory must be removed");
    assert_eq!(cycle.inspect_installed().await, InstalledState::Version(v("2.1.0")));
}

#[tokio::test]
#[serial]
async fn test_offline_cycle_is_skipped() {
    let fixture = Fixture::new().await;
    fixture.publish("v2.3.0", binary_script("2.3.0"));

    let (_handle, connectivity) = Connectivity::new(false);
    let cycle = fixture.cycle(connectivity);
    let state = watch::Sender::new(LoopState::Idle);
    let outcome = cycle.run(&binkeeper::updater::SilentReporter, &state).await;

    assert!(matches!(outcome, UpdateOutcome::SkippedOffline));
    assert!(outcome.is_success());
    assert_eq!(fixture.server.hits("/latest"), 0);
}

#[tokio::test]
#[serial]
async fn test_checksum_mismatch_is_rejected() {
    let fixture = Fixture::new().await;
    fixture.install_existing("2.1.0");
    let manifest = format!("{}  {ASSET_NAME}\n", "0".repeat(64));
    fixture.publish_as("v2.3.0", ASSET_NAME, Route::ok(binary_script("2.3.0")), Some(manifest));

    let (outcome, _) = run_cycle(&fixture).await;

    assert!(matches!(outcome.error(), Some(UpdateError::Functional { .. })), "got {outcome:?}");
    let cycle = fixture.cycle(Connectivity::always_online());
    assert_eq!(cycle.inspect_installed().await, InstalledState::Version(v("2.1.0")));
}

#[tokio::test]
#[serial]
async fn test_checksum_match_is_accepted() {
    let fixture = Fixture::new().await;
    let artifact = binary_script("2.3.0");
    let manifest = format!("{}  {ASSET_NAME}\n", sha256_hex(&artifact));
    fixture.publish_as("v2.3.0", ASSET_NAME, Route::ok(artifact), Some(manifest));

    let (outcome, _) = run_cycle(&fixture).await;

    assert_eq!(outcome.installed_version(), Some(&v("2.3.0")));
    assert_eq!(fixture.server.hits("/download/checksums.txt"), 1);
}

#[tokio::test]
#[serial]
async fn test_gzip_asset_is_decompressed() {
    let fixture = Fixture::new().await;
    fixture.install_existing("2.1.0");
    let name = format!("{ASSET_NAME}.gz");
    let compressed = gzip(&binary_script("2.3.0"));
    let manifest = format!("{}  {name}\n", sha256_hex(&compressed));
    fixture.publish_as("v2.3.0", &name, Route::ok(compressed), Some(manifest));

    let (outcome, _) = run_cycle(&fixture).await;

    assert_eq!(outcome.installed_version(), Some(&v("2.3.0")), "got {outcome:?}");
    let installed = std::fs::read(fixture.binary_path()).unwrap();
    assert_eq!(installed, binary_script("2.3.0"));
}

#[tokio::test]
#[serial]
async fn test_progress_is_monotonic() {
    let fixture = Fixture::new().await;
    fixture.publish("v2.3.0", padded_binary_script("2.3.0", 256 * 1024));

    let (outcome, events) = run_cycle(&fixture).await;
    assert!(outcome.is_success(), "got {outcome:?}");

    let progress: Vec<u8> = events
        .iter()
        .filter_map(|event| match event {
            UpdateEvent::Progress(percentage) => Some(*percentage),
            _ => None,
        })
        .collect();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|pair| pair[0] < pair[1]), "not monotonic: {progress:?}");
    assert_eq!(progress.last(), Some(&100));
}

#[tokio::test]
#[serial]
async fn test_failed_elevated_removal_fails_cycle_and_cleans_up() {
    let fixture = Fixture::new().await;
    let binary = fixture.binary_path();
    squat(&binary);
    fixture.publish("v2.3.0", binary_script("2.3.0"));
    let before = scratch_dirs();

    let (outcome, _) = run_cycle(&fixture).await;

    assert!(
        matches!(outcome.error(), Some(UpdateError::PermissionDenied { .. })),
        "expected a permission error, got {outcome:?}"
    );
    assert_eq!(scratch_dirs(), before, "scratch directory must be removed");
    assert!(fixture.staging_leftovers().is_empty(), "staged copy must be removed");
    assert_eq!(std::fs::read_to_string(binary.join("keep")).unwrap(), "in use");

    let requests = fixture.gateway.requests();
    assert_eq!(requests.len(), 1, "got {requests:?}");
    assert!(requests[0].0.starts_with("rm -f "));
    assert_eq!(requests[0].1, REPLACE_JUSTIFICATION);
}

#[tokio::test]
#[serial]
async fn test_elevated_removal_lets_install_complete() {
    let fixture = Fixture::new().await;
    squat(&fixture.binary_path());
    fixture.publish("v2.3.0", binary_script("2.3.0"));
    let before = scratch_dirs();
    let gateway = Arc::new(AdminShell::default());

    let cycle = fixture.cycle_with_gateway(Connectivity::always_online(), gateway.clone());
    let (outcome, _) = run(&cycle).await;

    match &outcome {
        UpdateOutcome::UpdateInstalled {
            previous: None,
            new_version,
            reason: UpdateReason::ProbeFailed,
            ..
        } => assert_eq!(new_version, &v("2.3.0")),
        other => panic!("expected an install over the broken entry, got {other:?}"),
    }
    assert_eq!(*gateway.justifications.lock().unwrap(), vec![REPLACE_JUSTIFICATION.to_string()]);
    assert_eq!(cycle.inspect_installed().await, InstalledState::Version(v("2.3.0")));
    assert_eq!(scratch_dirs(), before, "scratch directory must be removed");
    assert!(fixture.staging_leftovers().is_empty());
}
