//! Long-running per-context state: the connected wallet, the ledger slice
//! of its address and the send form's fee estimate.

mod fee_estimator;
mod ledger_sync;
mod wallet_session;

pub use fee_estimator::{FeeEstimateState, FeeEstimator};
pub use ledger_sync::{LedgerSnapshot, LedgerSync};
pub use wallet_session::WalletSession;
