use log::{debug, error, info, warn};
use std::sync::Arc;

use super::WalletProvider;
use crate::entity::{FeeEstimate, LedgerError, NetworkConfig, Result, WalletUser, Wei};
use crate::utils::parse_transfer;

/// Wallet flows built on a [`WalletProvider`] for one target network.
pub struct WalletService {
    provider: Arc<dyn WalletProvider>,
    network: NetworkConfig,
}

impl WalletService {
    pub fn new(provider: Arc<dyn WalletProvider>, network: NetworkConfig) -> Self {
        Self { provider, network }
    }

    pub fn provider(&self) -> Arc<dyn WalletProvider> {
        self.provider.clone()
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Connects the first wallet account and moves the wallet onto the target network.
    pub async fn connect(&self) -> Result<WalletUser> {
        if !self.provider.detect().await {
            error!("No wallet provider detected");
            return Err(LedgerError::ProviderUnavailable);
        }

        let accounts = self.provider.request_accounts().await?;
        let address = accounts.into_iter().next().ok_or_else(|| {
            LedgerError::Unknown("No accounts found. Please connect your wallet.".to_string())
        })?;

        self.ensure_network().await?;
        let balance = self.provider.get_balance(&address).await?;
        let chain_id = self.provider.chain_id().await?;

        let network = if self.network.is_chain(&chain_id) {
            self.network.chain_name.clone()
        } else {
            "Unknown".to_string()
        };

        info!("Connected {} on chain {}", address, chain_id);
        Ok(WalletUser {
            address,
            balance,
            connected: true,
            chain_id,
            network,
        })
    }

    /// Reconnects silently when the wallet still exposes an account from an
    /// earlier session. Returns `None` when there is nothing to restore.
    pub async fn restore(&self) -> Result<Option<WalletUser>> {
        if !self.provider.detect().await {
            return Ok(None);
        }
        if self.provider.accounts().await?.is_empty() {
            debug!("No previous connection found");
            return Ok(None);
        }
        self.connect().await.map(Some)
    }

    pub async fn balance(&self, address: &str) -> Result<Wei> {
        self.provider.get_balance(address).await
    }

    /// Validates the send form input and asks the wallet for a fee prediction.
    pub async fn estimate_fee(&self, to: &str, amount_text: &str) -> Result<FeeEstimate> {
        let (to, value) = parse_transfer(to, amount_text, self.network.decimals())?;
        self.provider.estimate_fee(&to, value).await
    }

    async fn ensure_network(&self) -> Result<()> {
        match self.provider.switch_network(&self.network).await {
            Err(LedgerError::UnsupportedChain(chain_id)) => {
                warn!(
                    "Wallet does not know chain {}, adding {}",
                    chain_id, self.network.chain_name
                );
                self.provider.add_network(&self.network).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SimulatedProvider;

    const ALICE: &str = "0xAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAa";
    const BOB: &str = "0xBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBb";

    fn service(provider: SimulatedProvider) -> (Arc<SimulatedProvider>, WalletService) {
        let provider = Arc::new(provider);
        let service = WalletService::new(provider.clone(), NetworkConfig::shardeum());
        (provider, service)
    }

    #[tokio::test]
    async fn test_connect_adds_missing_network() {
        let (provider, service) =
            service(SimulatedProvider::new().with_account(ALICE, Wei::exp10(18)));

        let user = service.connect().await.unwrap();
        assert_eq!(user.address, ALICE);
        assert_eq!(user.balance, Wei::exp10(18));
        assert!(user.connected);
        assert_eq!(user.chain_id, "0x1F93");
        assert_eq!(user.network, "Shardeum Testnet");
        assert_eq!(provider.current_chain(), "0x1F93");
    }

    #[tokio::test]
    async fn test_connect_failures() {
        let (_provider, missing) = service(SimulatedProvider::new().not_installed());
        assert_eq!(missing.connect().await.unwrap_err(), LedgerError::ProviderUnavailable);

        let (_provider, empty) = service(SimulatedProvider::new());
        assert!(matches!(empty.connect().await, Err(LedgerError::Unknown(_))));

        let (provider, rejecting) =
            service(SimulatedProvider::new().with_account(ALICE, Wei::zero()));
        provider.fail_next(LedgerError::UserRejected);
        assert_eq!(rejecting.connect().await.unwrap_err(), LedgerError::UserRejected);
    }

    #[tokio::test]
    async fn test_restore_only_when_previously_authorized() {
        let (_provider, fresh) =
            service(SimulatedProvider::new().with_account(ALICE, Wei::zero()));
        assert_eq!(fresh.restore().await.unwrap(), None);

        let (_provider, returning) = service(
            SimulatedProvider::new()
                .with_account(ALICE, Wei::zero())
                .authorized(),
        );
        let user = returning.restore().await.unwrap().unwrap();
        assert_eq!(user.address, ALICE);
    }

    #[tokio::test]
    async fn test_estimate_fee_validates_first() {
        let (provider, service) = service(
            SimulatedProvider::new()
                .with_account(ALICE, Wei::exp10(18))
                .with_gas(Wei::from(21_000u64), Wei::from(2u64))
                .authorized(),
        );
        provider.fail_next(LedgerError::UserRejected);

        let err = service.estimate_fee("not-an-address", "1").await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        // The injected failure was not consumed by the invalid request
        assert_eq!(
            service.estimate_fee(BOB, "0.5").await.unwrap_err(),
            LedgerError::UserRejected
        );
        let fee = service.estimate_fee(BOB, "0.5").await.unwrap();
        assert_eq!(fee.estimated_cost, Wei::from(42_000u64));
    }
}
