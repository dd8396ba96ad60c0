//! Shared set-up for CLI commands.

use crate::cli::GlobalOptions;
use crate::config::GlobalConfig;
use crate::connectivity::Connectivity;
use crate::elevation::{
    AssumeYes, ConsentPrompt, ElevationGateway, PromptingGateway, TerminalConsent,
};
use crate::http::build_client;
use crate::platform::PlatformTarget;
use crate::updater::{StateRecord, UpdateCycle};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Everything a command needs, loaded once.
#[derive(Debug)]
pub struct HostContext {
    /// Loaded configuration.
    pub config: GlobalConfig,
    /// Where the configuration was read from.
    pub config_path: PathBuf,
    /// Resolved install target.
    pub target: PlatformTarget,
    /// Shared HTTP client.
    pub client: reqwest::Client,
    /// Approve elevation prompts without asking.
    pub assume_yes: bool,
}

impl HostContext {
    /// Load configuration and resolve the platform target.
    pub async fn load(options: &GlobalOptions) -> Result<Self> {
        let config_path = match &options.config_path {
            Some(path) => path.clone(),
            None => GlobalConfig::default_path()?,
        };
        let config = GlobalConfig::load_with_optional(Some(config_path.clone())).await?;
        debug!("Loaded configuration from {}", config_path.display());

        let target = PlatformTarget::detect(&config.updater)
            .context("Failed to resolve the install location")?;
        let client = build_client()?;

        Ok(Self {
            assume_yes: options.assume_yes || config.elevation.assume_yes,
            config,
            config_path,
            target,
            client,
        })
    }

    /// Gateway asking on the terminal unless prompts are pre-approved.
    #[must_use]
    pub fn gateway(&self) -> Arc<dyn ElevationGateway> {
        let consent: Arc<dyn ConsentPrompt> =
            if self.assume_yes { Arc::new(AssumeYes) } else { Arc::new(TerminalConsent) };
        Arc::new(PromptingGateway::new(self.target.os(), consent))
    }

    /// A cycle wired to the production components.
    #[must_use]
    pub fn cycle(&self, connectivity: Connectivity) -> UpdateCycle {
        UpdateCycle::from_config(
            &self.config.updater,
            self.target.clone(),
            self.client.clone(),
            connectivity,
            self.gateway(),
        )
    }

    /// Location of the persisted cycle record.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        StateRecord::path_for(&self.config_path)
    }
}
