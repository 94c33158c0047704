use async_trait::async_trait;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use uuid::Uuid;

use super::WalletProvider;
use crate::entity::{
    ConfirmationOutcome, FeeEstimate, LedgerError, NetworkConfig, Result, Submission, Wei,
};

const DEFAULT_CHAIN_ID: &str = "0x1";
const DEFAULT_GAS_LIMIT: u64 = 21_000;
const DEFAULT_GAS_PRICE: u64 = 1_000_000_000;

/// A transfer accepted by the [`SimulatedProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTransfer {
    pub id: String,
    pub from: String,
    pub to: String,
    pub value: Wei,
}

struct SimulatedState {
    installed: bool,
    authorized: bool,
    accounts: Vec<String>,
    chain_id: String,
    known_chains: Vec<String>,
    balances: HashMap<String, Wei>,
    gas_limit: Wei,
    gas_price: Wei,
    auto_confirm: bool,
    next_failure: Option<LedgerError>,
    submitted: Vec<SubmittedTransfer>,
    outcomes: HashMap<String, watch::Sender<Option<ConfirmationOutcome>>>,
    instance: Uuid,
}

impl SimulatedState {
    fn take_failure(&mut self) -> Result<()> {
        match self.next_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn ensure_installed(&self) -> Result<()> {
        if self.installed {
            Ok(())
        } else {
            Err(LedgerError::ProviderUnavailable)
        }
    }

    fn selected_account(&self) -> Result<String> {
        if !self.authorized {
            return Err(LedgerError::WalletNotConnected);
        }
        self.accounts
            .first()
            .cloned()
            .ok_or(LedgerError::WalletNotConnected)
    }

    fn balance_mut(&mut self, address: &str) -> &mut Wei {
        self.balances.entry(address.to_lowercase()).or_default()
    }
}

/// In-process wallet for tests and offline use.
///
/// Submitted transfers move balances immediately. Confirmation is either
/// automatic (with the configured gas) or left to [`SimulatedProvider::resolve`].
pub struct SimulatedProvider {
    state: Mutex<SimulatedState>,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimulatedState {
                installed: true,
                authorized: false,
                accounts: Vec::new(),
                chain_id: DEFAULT_CHAIN_ID.to_string(),
                known_chains: vec![DEFAULT_CHAIN_ID.to_string()],
                balances: HashMap::new(),
                gas_limit: Wei::from(DEFAULT_GAS_LIMIT),
                gas_price: Wei::from(DEFAULT_GAS_PRICE),
                auto_confirm: true,
                next_failure: None,
                submitted: Vec::new(),
                outcomes: HashMap::new(),
                instance: Uuid::new_v4(),
            }),
        }
    }

    /// Adds an account holding `balance`.
    pub fn with_account(self, address: &str, balance: Wei) -> Self {
        {
            let mut state = self.lock();
            state.accounts.push(address.to_string());
            *state.balance_mut(address) = balance;
        }
        self
    }

    /// Wallet already knowing and using `network`.
    pub fn on_network(self, network: &NetworkConfig) -> Self {
        {
            let mut state = self.lock();
            state.chain_id = network.chain_id.clone();
            state.known_chains.push(network.chain_id.clone());
        }
        self
    }

    pub fn with_gas(self, gas_limit: Wei, gas_price: Wei) -> Self {
        {
            let mut state = self.lock();
            state.gas_limit = gas_limit;
            state.gas_price = gas_price;
        }
        self
    }

    /// Accounts are exposed without prompting, as after an earlier session.
    pub fn authorized(self) -> Self {
        self.lock().authorized = true;
        self
    }

    /// Leaves submitted transfers pending until [`SimulatedProvider::resolve`].
    pub fn manual_confirmation(self) -> Self {
        self.lock().auto_confirm = false;
        self
    }

    pub fn not_installed(self) -> Self {
        self.lock().installed = false;
        self
    }

    /// Makes the next wallet request fail with `err`.
    pub fn fail_next(&self, err: LedgerError) {
        self.lock().next_failure = Some(err);
    }

    pub fn set_accounts(&self, accounts: Vec<String>) {
        self.lock().accounts = accounts;
    }

    pub fn set_balance(&self, address: &str, balance: Wei) {
        *self.lock().balance_mut(address) = balance;
    }

    pub fn current_chain(&self) -> String {
        self.lock().chain_id.clone()
    }

    pub fn submitted(&self) -> Vec<SubmittedTransfer> {
        self.lock().submitted.clone()
    }

    /// Reports the final status of a submitted transfer.
    /// Returns false for unknown or already resolved transfers.
    pub fn resolve(&self, id: &str, outcome: ConfirmationOutcome) -> bool {
        let state = self.lock();
        let Some(sender) = state.outcomes.get(id) else {
            return false;
        };
        if sender.borrow().is_some() {
            return false;
        }
        sender.send_replace(Some(outcome));
        true
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletProvider for SimulatedProvider {
    async fn detect(&self) -> bool {
        self.lock().installed
    }

    async fn request_accounts(&self) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.ensure_installed()?;
        state.take_failure()?;
        state.authorized = true;
        Ok(state.accounts.clone())
    }

    async fn accounts(&self) -> Result<Vec<String>> {
        let state = self.lock();
        state.ensure_installed()?;
        if state.authorized {
            Ok(state.accounts.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn chain_id(&self) -> Result<String> {
        let state = self.lock();
        state.ensure_installed()?;
        Ok(state.chain_id.clone())
    }

    async fn switch_network(&self, network: &NetworkConfig) -> Result<()> {
        let mut state = self.lock();
        state.ensure_installed()?;
        state.take_failure()?;
        if !state.known_chains.iter().any(|chain| network.is_chain(chain)) {
            return Err(LedgerError::UnsupportedChain(network.chain_id.clone()));
        }
        state.chain_id = network.chain_id.clone();
        Ok(())
    }

    async fn add_network(&self, network: &NetworkConfig) -> Result<()> {
        let mut state = self.lock();
        state.ensure_installed()?;
        state.take_failure()?;
        state.known_chains.push(network.chain_id.clone());
        state.chain_id = network.chain_id.clone();
        info!("Simulated wallet added {}", network.chain_name);
        Ok(())
    }

    async fn get_balance(&self, address: &str) -> Result<Wei> {
        let state = self.lock();
        state.ensure_installed()?;
        Ok(state
            .balances
            .get(&address.to_lowercase())
            .copied()
            .unwrap_or_default())
    }

    async fn estimate_fee(&self, _to: &str, _value: Wei) -> Result<FeeEstimate> {
        let mut state = self.lock();
        state.ensure_installed()?;
        state.take_failure()?;
        state.selected_account()?;
        Ok(FeeEstimate::new(state.gas_limit, state.gas_price))
    }

    async fn submit(&self, to: &str, value: Wei) -> Result<Submission> {
        let mut state = self.lock();
        state.ensure_installed()?;
        state.take_failure()?;
        let from = state.selected_account()?;

        let fee = state.gas_limit.saturating_mul(state.gas_price);
        let available = *state.balance_mut(&from);
        let total = value.saturating_add(fee);
        if total > available {
            return Err(LedgerError::Unknown(
                "insufficient funds for gas * price + value".to_string(),
            ));
        }
        *state.balance_mut(&from) = available - total;
        let credited = state.balance_mut(to).saturating_add(value);
        *state.balance_mut(to) = credited;

        // Unique across wallet instances sharing one ledger
        let id = format!(
            "0x{}{:032x}",
            state.instance.simple(),
            state.submitted.len() + 1
        );
        let outcome = if state.auto_confirm {
            Some(ConfirmationOutcome::confirmed().with_gas(state.gas_limit, state.gas_price))
        } else {
            None
        };
        state.outcomes.insert(id.clone(), watch::channel(outcome).0);
        state.submitted.push(SubmittedTransfer {
            id: id.clone(),
            from: from.clone(),
            to: to.to_string(),
            value,
        });

        debug!("Simulated wallet accepted transfer {}", id);
        Ok(Submission { id, from })
    }

    async fn await_confirmation(&self, id: &str) -> Result<ConfirmationOutcome> {
        let mut outcome = {
            let state = self.lock();
            state
                .outcomes
                .get(id)
                .map(|sender| sender.subscribe())
                .ok_or_else(|| LedgerError::Unknown(format!("Unknown transaction {}", id)))?
        };

        let resolved = outcome
            .wait_for(|outcome| outcome.is_some())
            .await
            .map_err(|_| LedgerError::Unknown(format!("Transaction {} was dropped", id)))?;
        (*resolved)
            .clone()
            .ok_or_else(|| LedgerError::Unknown(format!("Transaction {} was dropped", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ConfirmationStatus;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    const ALICE: &str = "0xAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAaAa";
    const BOB: &str = "0xBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBbBb";

    #[tokio::test]
    async fn test_submit_requires_authorization() {
        let provider = SimulatedProvider::new().with_account(ALICE, Wei::exp10(18));
        assert_eq!(
            provider.submit(BOB, Wei::one()).await.unwrap_err(),
            LedgerError::WalletNotConnected
        );
        assert!(provider.accounts().await.unwrap().is_empty());

        provider.request_accounts().await.unwrap();
        assert!(provider.submit(BOB, Wei::one()).await.is_ok());
    }

    #[tokio::test]
    async fn test_submit_moves_balances() {
        let provider = SimulatedProvider::new()
            .with_account(ALICE, Wei::from(1_000_000u64))
            .with_gas(Wei::from(10u64), Wei::from(2u64))
            .authorized();

        provider.submit(BOB, Wei::from(500u64)).await.unwrap();
        assert_eq!(provider.get_balance(ALICE).await.unwrap(), Wei::from(999_480u64));
        assert_eq!(provider.get_balance(BOB).await.unwrap(), Wei::from(500u64));

        let err = provider.submit(BOB, Wei::from(10_000_000u64)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Unknown(_)));
        assert_eq!(provider.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_reports_current_account() {
        let provider = SimulatedProvider::new()
            .with_account(ALICE, Wei::exp10(18))
            .with_account(BOB, Wei::exp10(18))
            .authorized();
        assert_eq!(provider.submit(BOB, Wei::one()).await.unwrap().from, ALICE);

        provider.set_accounts(vec![BOB.to_string()]);
        let submission = provider.submit(ALICE, Wei::one()).await.unwrap();
        assert_eq!(submission.from, BOB);
        assert_eq!(provider.submitted()[1].from, BOB);
    }

    #[tokio::test]
    async fn test_auto_confirmation_reports_gas() {
        let provider = SimulatedProvider::new()
            .with_account(ALICE, Wei::exp10(18))
            .authorized();
        let id = provider.submit(BOB, Wei::one()).await.unwrap().id;

        let outcome = provider.await_confirmation(&id).await.unwrap();
        assert_eq!(outcome.status, ConfirmationStatus::Confirmed);
        assert_eq!(outcome.gas_used, Some(Wei::from(DEFAULT_GAS_LIMIT)));
        assert!(!provider.resolve(&id, ConfirmationOutcome::failed()));
    }

    #[tokio::test]
    async fn test_manual_confirmation() {
        let provider = Arc::new(
            SimulatedProvider::new()
                .with_account(ALICE, Wei::exp10(18))
                .authorized()
                .manual_confirmation(),
        );
        let id = provider.submit(BOB, Wei::one()).await.unwrap().id;

        let waiting = {
            let provider = provider.clone();
            let id = id.clone();
            tokio::spawn(async move { provider.await_confirmation(&id).await })
        };
        assert!(timeout(Duration::from_millis(50), provider.await_confirmation(&id))
            .await
            .is_err());

        assert!(provider.resolve(&id, ConfirmationOutcome::failed()));
        let outcome = waiting.await.unwrap().unwrap();
        assert_eq!(outcome.status, ConfirmationStatus::Failed);
    }

    #[tokio::test]
    async fn test_switch_and_add_network() {
        let provider = SimulatedProvider::new();
        let shardeum = NetworkConfig::shardeum();

        assert_eq!(
            provider.switch_network(&shardeum).await.unwrap_err(),
            LedgerError::UnsupportedChain("0x1F93".to_string())
        );
        provider.add_network(&shardeum).await.unwrap();
        provider.switch_network(&shardeum).await.unwrap();
        assert_eq!(provider.current_chain(), "0x1F93");
    }

    #[tokio::test]
    async fn test_injected_failure_and_missing_wallet() {
        let provider = SimulatedProvider::new().with_account(ALICE, Wei::zero());
        provider.fail_next(LedgerError::UserRejected);
        assert_eq!(
            provider.request_accounts().await.unwrap_err(),
            LedgerError::UserRejected
        );
        assert!(provider.request_accounts().await.is_ok());

        let missing = SimulatedProvider::new().not_installed();
        assert!(!missing.detect().await);
        assert_eq!(
            missing.request_accounts().await.unwrap_err(),
            LedgerError::ProviderUnavailable
        );
    }
}
