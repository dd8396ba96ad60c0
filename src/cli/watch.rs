//! Run the update loop until interrupted.

use crate::cli::{ConsoleReporter, GlobalOptions, HostContext};
use crate::connectivity::{self, Connectivity};
use crate::constants::CONNECTIVITY_PROBE_INTERVAL;
use crate::updater::{Reporter, UpdateEvent, UpdateLoop};
use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Run the update loop until Ctrl-C.
#[derive(Args, Debug)]
pub struct WatchCommand {
    /// Skip connectivity probing and assume the network is always up
    #[arg(long)]
    assume_online: bool,
}

impl WatchCommand {
    pub async fn execute(self, options: &GlobalOptions) -> Result<()> {
        let context = HostContext::load(options).await?;

        let (handle, connectivity) = Connectivity::new(true);
        let probe = match connectivity::probe_address(&context.config.updater.release_url) {
            Some(address) if !self.assume_online => {
                Some(connectivity::spawn_probe(handle, address, CONNECTIVITY_PROBE_INTERVAL))
            }
            Some(_) => None,
            None => {
                warn!("Cannot derive a connectivity probe address, assuming online");
                None
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<UpdateEvent>();
        let console = ConsoleReporter::new(options.no_progress);
        let presenter = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                console.report(event);
            }
        });

        let update_loop =
            UpdateLoop::new(context.cycle(connectivity), &context.config.updater, Arc::new(tx))
                .with_state_file(context.state_path());

        info!("Watching {}", context.target.binary_path().display());
        update_loop
            .run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            })
            .await?;

        if let Some(probe) = probe {
            probe.abort();
        }
        drop(update_loop);
        let _ = presenter.await;
        Ok(())
    }
}
