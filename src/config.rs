use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::entity::NetworkConfig;

pub const DEFAULT_CONFIG_FILE: &str = "ledger.toml";
pub const ENV_PREFIX: &str = "LEDGER";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// JSON-RPC endpoint holding the wallet accounts.
    Rpc,
    /// In-process wallet, nothing leaves the machine.
    Simulated,
}

/// Application configuration
///
/// Built-in defaults, overridden by an optional `ledger.toml`, overridden by
/// `LEDGER_*` environment variables (e.g. `LEDGER_RPC_URL`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Endpoint for the `rpc` provider
    pub rpc_url: String,

    /// Directory holding the ledger storage
    pub data_dir: PathBuf,

    pub provider: ProviderKind,

    /// Maximum number of records shown for an address
    pub history_limit: usize,

    pub fee_debounce_ms: u64,
    pub confirmation_poll_ms: u64,
    pub confirmation_timeout_secs: u64,

    /// How often the file storage looks for writes by other processes
    pub storage_poll_ms: u64,

    /// Account and balance (in whole coins) of the `simulated` provider
    pub simulated_account: String,
    pub simulated_balance: String,

    pub network: NetworkConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let network = NetworkConfig::shardeum();
        Self {
            rpc_url: network
                .rpc_urls
                .first()
                .cloned()
                .unwrap_or_else(|| "http://127.0.0.1:8545".to_string()),
            data_dir: PathBuf::from(".shardeum-ledger"),
            provider: ProviderKind::Rpc,
            history_limit: 100,
            fee_debounce_ms: 500,
            confirmation_poll_ms: 2_000,
            confirmation_timeout_secs: 300,
            storage_poll_ms: 500,
            simulated_account: "0x00000000000000000000000000000000000a11ce".to_string(),
            simulated_balance: "100".to_string(),
            network,
        }
    }
}

impl AppConfig {
    /// Loads the configuration. Without an explicit `path`, `ledger.toml` in the
    /// working directory is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        let config: AppConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    fn validate(&self) -> Result<()> {
        if self.history_limit == 0 {
            anyhow::bail!("history_limit must be greater than zero");
        }
        if self.confirmation_poll_ms == 0 || self.storage_poll_ms == 0 {
            anyhow::bail!("poll intervals must be greater than zero");
        }
        Ok(())
    }

    pub fn fee_debounce(&self) -> Duration {
        Duration::from_millis(self.fee_debounce_ms)
    }

    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn storage_poll_interval(&self) -> Duration {
        Duration::from_millis(self.storage_poll_ms)
    }
}
