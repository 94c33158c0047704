use log::{error, info};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

use crate::entity::{Result, WalletUser};
use crate::provider::WalletService;
use crate::utils::same_address;

/// The connected wallet of one context.
///
/// The connected address is published on [`WalletSession::subscribe_address`],
/// which is what a [`crate::LedgerSync`] follows.
pub struct WalletSession {
    wallet: Arc<WalletService>,
    user: RwLock<Option<WalletUser>>,
    address_tx: watch::Sender<Option<String>>,
}

impl WalletSession {
    pub fn new(wallet: Arc<WalletService>) -> Self {
        Self {
            wallet,
            user: RwLock::new(None),
            address_tx: watch::channel(None).0,
        }
    }

    pub async fn connect(&self) -> Result<WalletUser> {
        let user = match self.wallet.connect().await {
            Ok(user) => user,
            Err(e) => {
                error!("Wallet connection failed: {}", e);
                return Err(e);
            }
        };
        self.set_user(Some(user.clone())).await;
        Ok(user)
    }

    /// Silent reconnect on startup. Never fails, a wallet that cannot be
    /// restored just leaves the session disconnected.
    pub async fn restore(&self) -> Option<WalletUser> {
        match self.wallet.restore().await {
            Ok(Some(user)) => {
                self.set_user(Some(user.clone())).await;
                Some(user)
            }
            Ok(None) => None,
            Err(e) => {
                info!("No previous connection restored: {}", e);
                None
            }
        }
    }

    pub async fn disconnect(&self) {
        self.set_user(None).await;
        info!("Wallet disconnected");
    }

    pub async fn refresh_balance(&self) -> Result<()> {
        let address = match self.address().await {
            Some(address) => address,
            None => return Ok(()),
        };

        let balance = self.wallet.balance(&address).await.map_err(|e| {
            error!("Failed to refresh balance: {}", e);
            e
        })?;

        if let Some(user) = self.user.write().await.as_mut() {
            if same_address(&user.address, &address) {
                user.balance = balance;
            }
        }
        Ok(())
    }

    /// Reacts to the wallet reporting a new account list.
    pub async fn handle_accounts_changed(&self, accounts: &[String]) -> Result<()> {
        let current = self.address().await;
        match (accounts.first(), current) {
            (None, _) => {
                self.disconnect().await;
                Ok(())
            }
            (Some(next), Some(current)) if !same_address(next, &current) => {
                info!("Wallet account changed to {}, reconnecting", next);
                self.connect().await.map(|_| ())
            }
            _ => Ok(()),
        }
    }

    pub async fn user(&self) -> Option<WalletUser> {
        self.user.read().await.clone()
    }

    pub async fn address(&self) -> Option<String> {
        self.user.read().await.as_ref().map(|user| user.address.clone())
    }

    pub fn subscribe_address(&self) -> watch::Receiver<Option<String>> {
        self.address_tx.subscribe()
    }

    pub fn wallet(&self) -> &Arc<WalletService> {
        &self.wallet
    }

    async fn set_user(&self, user: Option<WalletUser>) {
        let address = user.as_ref().map(|user| user.address.clone());
        *self.user.write().await = user;
        self.address_tx.send_if_modified(|current| {
            if *current == address {
                false
            } else {
                *current = address;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{LedgerError, NetworkConfig, Wei};
    use crate::provider::SimulatedProvider;

    const ALICE: &str = "0xAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAa";
    const BOB: &str = "0xBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBb";

    fn session(provider: SimulatedProvider) -> (Arc<SimulatedProvider>, WalletSession) {
        let provider = Arc::new(provider);
        let wallet = Arc::new(WalletService::new(provider.clone(), NetworkConfig::shardeum()));
        (provider, WalletSession::new(wallet))
    }

    #[tokio::test]
    async fn test_connect_publishes_address() {
        let (_provider, session) =
            session(SimulatedProvider::new().with_account(ALICE, Wei::exp10(18)));
        let mut addresses = session.subscribe_address();

        session.connect().await.unwrap();
        assert!(addresses.has_changed().unwrap());
        assert_eq!(addresses.borrow_and_update().as_deref(), Some(ALICE));

        session.disconnect().await;
        assert_eq!(addresses.borrow_and_update().as_deref(), None);
        assert_eq!(session.user().await, None);
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_session_disconnected() {
        let (provider, session) =
            session(SimulatedProvider::new().with_account(ALICE, Wei::zero()));
        provider.fail_next(LedgerError::RequestPending);
        assert_eq!(session.connect().await.unwrap_err(), LedgerError::RequestPending);
        assert_eq!(session.address().await, None);
    }

    #[tokio::test]
    async fn test_restore_never_fails() {
        let (_provider, session) = session(SimulatedProvider::new().not_installed());
        assert_eq!(session.restore().await, None);
    }

    #[tokio::test]
    async fn test_accounts_changed() {
        let (provider, session) = session(
            SimulatedProvider::new()
                .with_account(ALICE, Wei::one())
                .with_account(BOB, Wei::from(2u64)),
        );
        session.connect().await.unwrap();

        session
            .handle_accounts_changed(&[ALICE.to_lowercase()])
            .await
            .unwrap();
        assert_eq!(session.address().await.as_deref(), Some(ALICE));

        provider.set_accounts(vec![BOB.to_string(), ALICE.to_string()]);
        session
            .handle_accounts_changed(&[BOB.to_string()])
            .await
            .unwrap();
        let user = session.user().await.unwrap();
        assert_eq!(user.address, BOB);
        assert_eq!(user.balance, Wei::from(2u64));

        session.handle_accounts_changed(&[]).await.unwrap();
        assert_eq!(session.address().await, None);
    }

    #[tokio::test]
    async fn test_refresh_balance() {
        let (provider, session) =
            session(SimulatedProvider::new().with_account(ALICE, Wei::one()));
        session.refresh_balance().await.unwrap();

        session.connect().await.unwrap();
        provider.set_balance(ALICE, Wei::from(7u64));
        session.refresh_balance().await.unwrap();
        assert_eq!(session.user().await.unwrap().balance, Wei::from(7u64));
    }
}
