mod amount;
mod category;
mod fee_estimate;
mod ledger_error;
mod network;
mod transaction;
mod user;

pub use amount::{option_wei_string, parse_wei, wei_string, Wei};
pub use category::{Category, UNCATEGORIZED};
pub use fee_estimate::FeeEstimate;
pub use ledger_error::{
    LedgerError, Result, CODE_INTERNAL_ERROR, CODE_METHOD_NOT_FOUND, CODE_REQUEST_PENDING,
    CODE_UNRECOGNIZED_CHAIN, CODE_USER_REJECTED,
};
pub use network::{NativeCurrency, NetworkConfig};
pub use transaction::{
    Annotation, ConfirmationOutcome, ConfirmationStatus, Submission, TransactionRecord,
    TransactionStatus,
};
pub use user::WalletUser;
