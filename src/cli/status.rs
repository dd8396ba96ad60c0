//! Show where the managed binary lives and how current it is.

use crate::cli::{GlobalOptions, HostContext};
use crate::connectivity::Connectivity;
use crate::updater::{InstalledState, StateRecord, UpdateLoop};
use anyhow::Result;
use clap::Args;
use colored::Colorize;

/// Show the install target, versions and the last recorded cycle.
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Do not query the release index
    #[arg(long)]
    offline: bool,
}

impl StatusCommand {
    pub async fn execute(self, options: &GlobalOptions) -> Result<()> {
        let context = HostContext::load(options).await?;
        let target = &context.target;
        let cycle = context.cycle(Connectivity::always_online());

        println!("{}", "Install target".bold());
        println!("  Platform:       {}", target.os().release_name());
        println!("  Binary:         {}", target.binary_path().display());
        println!(
            "  On PATH:        {}",
            if target.on_search_path() { "yes".green() } else { "no".yellow() }
        );
        println!(
            "  Update loop:    {}",
            if UpdateLoop::is_enabled_for(target.os(), &context.config.updater) {
                "enabled".green()
            } else {
                "disabled (package managed)".yellow()
            }
        );

        let installed = match cycle.inspect_installed().await {
            InstalledState::Missing => "not installed".yellow(),
            InstalledState::Broken => "installed, not working".red(),
            InstalledState::Version(version) => version.to_string().green(),
        };
        println!("  Installed:      {installed}");

        if !self.offline {
            match cycle.releases().latest_release(target.os()).await {
                Ok(release) => println!("  Latest release: {}", release.version),
                Err(e) => println!("  Latest release: {}", format!("unavailable ({e})").red()),
            }
        }

        match StateRecord::load(&context.state_path()) {
            Ok(Some(record)) => {
                println!("{}", "Last check".bold());
                println!("  At:             {}", record.checked_at.to_rfc3339());
                println!("  Result:         {}", record.outcome);
                if let Some(next) = record.next_check_at {
                    println!("  Next check:     {}", next.to_rfc3339());
                }
            }
            Ok(None) => println!("{}", "No check recorded yet".dimmed()),
            Err(e) => println!("{}", format!("Could not read the last check: {e}").yellow()),
        }

        Ok(())
    }
}
