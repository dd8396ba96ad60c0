//! Put the install directory on the persistent search path.

use crate::cli::{GlobalOptions, HostContext};
use crate::platform::SearchPathManager;
use crate::platform::search_path::PathChange;
use anyhow::Result;
use clap::Args;
use colored::Colorize;

/// Add the install directory to the persistent search path.
#[derive(Args, Debug)]
pub struct EnsurePathCommand {}

impl EnsurePathCommand {
    pub async fn execute(self, options: &GlobalOptions) -> Result<()> {
        let context = HostContext::load(options).await?;
        let dir = context.target.install_directory();

        let change = SearchPathManager::new(context.target.os()).ensure_on_path(dir).await?;
        match change {
            PathChange::Added => {
                println!("{} Added {} to your PATH", "✓".green().bold(), dir.display());
                println!("  Open a new terminal to pick up the change.");
            }
            PathChange::AlreadyPresent => println!("{} is already on your PATH", dir.display()),
            PathChange::NotApplicable if context.target.on_search_path() => {
                println!("{} is on your PATH", dir.display());
            }
            PathChange::NotApplicable => println!(
                "{} {} is not on your PATH; add it in your shell profile",
                "Note:".yellow(),
                dir.display()
            ),
        }
        Ok(())
    }
}
