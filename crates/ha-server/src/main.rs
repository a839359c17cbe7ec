//! MasterTherm runner
//!
//! Loads configuration.yaml, sets up one config entry per MasterTherm
//! account and polls the resulting climate entities until Ctrl-C.

mod runner;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ha_config::Configuration;
use ha_config_entries::ConfigEntries;
use mastertherm::Mastertherm;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::runner::{entry_for_account, Runner};

const DEFAULT_CONFIG_DIR: &str = "config";

fn config_dir() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("HA_CONFIG_DIR"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_dir = config_dir();
    let config = Configuration::load(&config_dir)
        .with_context(|| format!("loading configuration from {}", config_dir.display()))?;

    // RUST_LOG wins over logger.default
    let default_level = config.logger.default.as_deref().unwrap_or("info");
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting MasterTherm runner");

    let mut integration = Mastertherm::new();
    if let Some(base_url) = &config.mastertherm.base_url {
        integration = integration.with_base_url(base_url.clone());
    }

    let entries = Arc::new(ConfigEntries::new(integration));
    for account in &config.mastertherm.accounts {
        entries
            .add(entry_for_account(account))
            .with_context(|| format!("adding account {}", account.username))?;
    }
    if entries.is_empty() {
        warn!("No MasterTherm accounts configured");
    }

    let mut runner = Runner::new(Arc::clone(&entries));
    runner.setup_all().await;

    let scan_interval = config.mastertherm.scan_interval();
    info!("Polling every {:?}", scan_interval);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
        }
    };
    runner
        .run(scan_interval, shutdown)
        .await
        .context("scan_interval is out of range")?;

    Ok(())
}
