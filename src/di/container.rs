use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;

use crate::config::{AppConfig, ProviderKind};
use crate::provider::{JsonRpcProvider, SimulatedProvider, WalletProvider, WalletService};
use crate::repository::{LedgerTransactionRepository, TransactionRepository};
use crate::storage::{FileStorage, KeyValueStorage, LedgerStore};
use crate::sync::{FeeEstimator, LedgerSync, WalletSession};
use crate::utils::parse_amount;

/// ServiceContainer provides access to core application dependencies
pub struct ServiceContainer {
    config: AppConfig,

    // Persistence
    storage: Arc<dyn KeyValueStorage>,
    store: LedgerStore,
    repository: Arc<dyn TransactionRepository>,

    // Wallet
    provider: Arc<dyn WalletProvider>,
    wallet_service: Arc<WalletService>,
}

impl ServiceContainer {
    /// Opens the storage and the wallet provider named by `config`.
    pub async fn build(config: AppConfig) -> Result<Self> {
        let storage = FileStorage::open(&config.data_dir, config.storage_poll_interval())
            .await
            .context("Failed to open ledger storage")?;
        let storage = Arc::new(storage) as Arc<dyn KeyValueStorage>;

        let provider = match config.provider {
            ProviderKind::Rpc => {
                info!("Using JSON-RPC wallet at {}", config.rpc_url);
                Arc::new(JsonRpcProvider::new(
                    &config.rpc_url,
                    config.confirmation_poll_interval(),
                    config.confirmation_timeout(),
                )) as Arc<dyn WalletProvider>
            }
            ProviderKind::Simulated => {
                info!("Using simulated wallet {}", config.simulated_account);
                let balance = parse_amount(&config.simulated_balance, config.network.decimals())
                    .context("Invalid simulated_balance")?;
                Arc::new(
                    SimulatedProvider::new()
                        .with_account(&config.simulated_account, balance)
                        .on_network(&config.network)
                        .authorized(),
                ) as Arc<dyn WalletProvider>
            }
        };

        Ok(Self::with_parts(config, storage, provider))
    }

    /// Wires the services around an existing storage and provider.
    pub fn with_parts(
        config: AppConfig,
        storage: Arc<dyn KeyValueStorage>,
        provider: Arc<dyn WalletProvider>,
    ) -> Self {
        let store = LedgerStore::new(storage.clone());
        let repository = Arc::new(LedgerTransactionRepository::new(store.clone()))
            as Arc<dyn TransactionRepository>;
        let wallet_service = Arc::new(WalletService::new(
            provider.clone(),
            config.network.clone(),
        ));

        Self {
            config,
            storage,
            store,
            repository,
            provider,
            wallet_service,
        }
    }

    // Accessor methods

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn storage(&self) -> Arc<dyn KeyValueStorage> {
        self.storage.clone()
    }

    pub fn ledger_store(&self) -> LedgerStore {
        self.store.clone()
    }

    pub fn repository(&self) -> Arc<dyn TransactionRepository> {
        self.repository.clone()
    }

    pub fn provider(&self) -> Arc<dyn WalletProvider> {
        self.provider.clone()
    }

    pub fn wallet_service(&self) -> Arc<WalletService> {
        self.wallet_service.clone()
    }

    // Factories, one instance per consumer

    pub fn wallet_session(&self) -> WalletSession {
        WalletSession::new(self.wallet_service.clone())
    }

    /// Ledger sync for this container's repository. Not started.
    pub fn ledger_sync(&self) -> LedgerSync {
        LedgerSync::new(
            self.repository.clone(),
            self.provider.clone(),
            self.config.history_limit,
            self.config.network.decimals(),
        )
    }

    pub fn fee_estimator(&self) -> FeeEstimator {
        FeeEstimator::new(self.wallet_service.clone(), self.config.fee_debounce())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{NetworkConfig, Wei};
    use crate::storage::MemoryOrigin;

    const ACCOUNT: &str = "0x00000000000000000000000000000000000a11ce";

    #[tokio::test]
    async fn test_build_simulated() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            provider: ProviderKind::Simulated,
            data_dir: dir.path().to_path_buf(),
            simulated_balance: "2.5".to_string(),
            ..AppConfig::default()
        };

        let container = ServiceContainer::build(config).await.unwrap();
        let user = container.wallet_service().connect().await.unwrap();
        assert_eq!(user.address, ACCOUNT);
        assert_eq!(user.balance, Wei::from(25u64) * Wei::exp10(17));
        assert_eq!(user.network, "Shardeum Testnet");
        assert!(container.ledger_store().read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_rejects_bad_balance() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            provider: ProviderKind::Simulated,
            data_dir: dir.path().to_path_buf(),
            simulated_balance: "lots".to_string(),
            ..AppConfig::default()
        };
        assert!(ServiceContainer::build(config).await.is_err());
    }

    #[tokio::test]
    async fn test_factories_share_repository() {
        let origin = MemoryOrigin::new();
        let provider = SimulatedProvider::new()
            .with_account(ACCOUNT, Wei::exp10(18))
            .on_network(&NetworkConfig::shardeum())
            .authorized();
        let container = ServiceContainer::with_parts(
            AppConfig::default(),
            Arc::new(origin.context()),
            Arc::new(provider),
        );

        let session = container.wallet_session();
        session.connect().await.unwrap();
        let sync = container.ledger_sync();
        sync.set_address(session.address().await).await;

        let id = sync.send(ACCOUNT, "0.1").await.unwrap();
        let stored = container.repository().find_by_id(&id).await.unwrap();
        assert!(stored.is_some());
    }
}
