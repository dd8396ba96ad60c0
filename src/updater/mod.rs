//! The long-running update loop.
//!
//! The loop waits for the initial delay, runs one [`UpdateCycle`], reports
//! its [`UpdateOutcome`], persists a [`StateRecord`] and re-arms the timer:
//! the regular interval after a successful cycle, the retry interval after a
//! failure. Cycles never overlap.
//!
//! ```text
//! Idle -> Checking -> Downloading -> Verifying -> Installing -> Idle
//!            \______________\_____________\____________\--> Failed -> Idle
//! ```
//!
//! On platforms where a system package manager provides the managed binary
//! the loop returns immediately unless explicitly enabled.
//!
//! # Examples
//!
//! ```rust,no_run
//! use binkeeper::updater::UpdateLoop;
//! # async fn example(update_loop: UpdateLoop) -> Result<(), binkeeper::core::UpdateError> {
//! update_loop.run(async { tokio::signal::ctrl_c().await.ok(); }).await
//! # }
//! ```

pub mod cycle;
pub mod outcome;
pub mod schedule;
pub mod state;

pub use cycle::{InstalledState, UpdateCycle};
pub use outcome::{Reporter, SilentReporter, UpdateEvent, UpdateOutcome, UpdateReason};
pub use schedule::SchedulePolicy;
pub use state::StateRecord;

use crate::config::UpdaterConfig;
use crate::core::UpdateError;
use crate::platform::OsFamily;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Where the loop is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the next cycle.
    Idle,
    /// Probing the installed binary and querying the release index.
    Checking,
    /// Fetching the artifact.
    Downloading,
    /// Checking the artifact.
    Verifying,
    /// Placing the artifact.
    Installing,
    /// The cycle failed; reported, then back to idle.
    Failed,
}

pub(crate) fn transition(state: &watch::Sender<LoopState>, next: LoopState) {
    let previous = state.send_replace(next);
    if previous != next {
        debug!("Update loop: {:?} -> {:?}", previous, next);
    }
}

/// Drives [`UpdateCycle`]s on a timer.
pub struct UpdateLoop {
    cycle: UpdateCycle,
    policy: SchedulePolicy,
    reporter: Arc<dyn Reporter>,
    state: watch::Sender<LoopState>,
    state_file: Option<PathBuf>,
    enabled: bool,
}

impl UpdateLoop {
    /// Loop running `cycle` with timings from `config`.
    #[must_use]
    pub fn new(cycle: UpdateCycle, config: &UpdaterConfig, reporter: Arc<dyn Reporter>) -> Self {
        let enabled = Self::is_enabled_for(cycle.target().os(), config);
        Self {
            cycle,
            policy: SchedulePolicy::from_config(config),
            reporter,
            state: watch::Sender::new(LoopState::Idle),
            state_file: None,
            enabled,
        }
    }

    /// Whether the loop runs on `os` with `config`.
    #[must_use]
    pub const fn is_enabled_for(os: OsFamily, config: &UpdaterConfig) -> bool {
        !os.is_package_managed() || config.run_on_package_managed_platforms
    }

    /// Replace the schedule.
    #[must_use]
    pub const fn with_policy(mut self, policy: SchedulePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Persist a [`StateRecord`] at `path` after every cycle.
    #[must_use]
    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_file = Some(path);
        self
    }

    /// Whether [`run`](Self::run) will schedule cycles.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The cycle this loop drives.
    #[must_use]
    pub const fn cycle(&self) -> &UpdateCycle {
        &self.cycle
    }

    /// Observe state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// Run one cycle now and report it.
    pub async fn run_once(&self) -> UpdateOutcome {
        self.cycle_and_report(false).await.0
    }

    /// Run cycles until `shutdown` resolves.
    ///
    /// A cycle in progress is finished before shutting down.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), UpdateError>
    where
        F: Future<Output = ()>,
    {
        if !self.enabled {
            info!(
                "The managed binary is provided by the system package manager on {}, update loop disabled",
                self.cycle.target().os().release_name()
            );
            return Ok(());
        }

        tokio::pin!(shutdown);
        let mut delay = self.policy.initial_delay();
        info!("Update loop started, first check in {:?}", delay);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                () = tokio::time::sleep(delay) => {}
            }

            let (_, next) = self.cycle_and_report(true).await;
            delay = next;
            info!("Next update check in {:?}", delay);
        }

        info!("Update loop stopped");
        Ok(())
    }

    async fn cycle_and_report(&self, scheduled: bool) -> (UpdateOutcome, Duration) {
        let outcome = self.cycle.run(self.reporter.as_ref(), &self.state).await;

        match &outcome {
            UpdateOutcome::Failed(error) if error.is_user_facing() => {
                transition(&self.state, LoopState::Failed);
                error!("Update cycle failed: {}", error);
            }
            UpdateOutcome::Failed(error) => {
                transition(&self.state, LoopState::Failed);
                info!("Update cycle interrupted: {}", error);
            }
            other => info!("{}", other),
        }

        let delay = self.policy.next_delay(&outcome);
        self.reporter.report(UpdateEvent::Finished(outcome.clone()));

        if let Some(path) = &self.state_file {
            let record = StateRecord::from_outcome(&outcome, scheduled.then_some(delay));
            if let Err(e) = record.save(path) {
                warn!("Failed to record update state at {}: {}", path.display(), e);
            }
        }

        transition(&self.state, LoopState::Idle);
        (outcome, delay)
    }
}
