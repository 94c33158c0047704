//! Wallet provider capability and its implementations.

mod json_rpc;
mod simulated;
mod wallet_service;

use async_trait::async_trait;

use crate::entity::{ConfirmationOutcome, FeeEstimate, NetworkConfig, Result, Submission, Wei};

pub use json_rpc::JsonRpcProvider;
pub use simulated::{SimulatedProvider, SubmittedTransfer};
pub use wallet_service::WalletService;

/// Everything the ledger needs from a wallet: accounts, network selection,
/// balances and the submission of native transfers.
///
/// Transfers are submitted from the account selected by the last
/// [`WalletProvider::request_accounts`] or [`WalletProvider::accounts`] call.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Whether a wallet is reachable at all.
    async fn detect(&self) -> bool;

    /// Asks the wallet for access to its accounts, prompting if needed.
    async fn request_accounts(&self) -> Result<Vec<String>>;

    /// Accounts already exposed to us, without prompting.
    async fn accounts(&self) -> Result<Vec<String>>;

    /// Current chain id as a `0x` quantity.
    async fn chain_id(&self) -> Result<String>;

    /// Fails with `UnsupportedChain` when the wallet does not know the network.
    async fn switch_network(&self, network: &NetworkConfig) -> Result<()>;

    async fn add_network(&self, network: &NetworkConfig) -> Result<()>;

    async fn get_balance(&self, address: &str) -> Result<Wei>;

    async fn estimate_fee(&self, to: &str, value: Wei) -> Result<FeeEstimate>;

    /// Submits a transfer. The returned sender is the account the wallet
    /// actually signed with, which may differ from the last known one.
    async fn submit(&self, to: &str, value: Wei) -> Result<Submission>;

    /// Resolves once the transaction reached a final status.
    async fn await_confirmation(&self, id: &str) -> Result<ConfirmationOutcome>;
}
