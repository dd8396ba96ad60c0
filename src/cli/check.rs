//! Run a single update cycle immediately.

use crate::cli::{ConsoleReporter, GlobalOptions, HostContext};
use crate::connectivity::Connectivity;
use crate::updater::{UpdateLoop, UpdateOutcome};
use anyhow::Result;
use clap::Args;
use std::sync::Arc;

/// Check for an update once and install it.
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Run even where the system package manager provides the binary
    #[arg(long)]
    force: bool,
}

impl CheckCommand {
    pub async fn execute(self, options: &GlobalOptions) -> Result<()> {
        let mut context = HostContext::load(options).await?;
        if self.force {
            context.config.updater.run_on_package_managed_platforms = true;
        }

        let reporter = ConsoleReporter::new(options.no_progress).without_failure_output();
        let update_loop = UpdateLoop::new(
            context.cycle(Connectivity::always_online()),
            &context.config.updater,
            Arc::new(reporter),
        )
        .with_state_file(context.state_path());

        if !update_loop.is_enabled() {
            println!(
                "The managed binary is provided by the system package manager on {}; pass --force to check anyway",
                context.target.os().release_name()
            );
            return Ok(());
        }

        match update_loop.run_once().await {
            UpdateOutcome::Failed(error) => Err(error.into()),
            _ => Ok(()),
        }
    }
}
