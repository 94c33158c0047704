/// Provider error codes as reported by injected wallets (EIP-1193) and JSON-RPC nodes.
pub const CODE_USER_REJECTED: i64 = 4001;
pub const CODE_UNRECOGNIZED_CHAIN: i64 = 4902;
pub const CODE_REQUEST_PENDING: i64 = -32002;
pub const CODE_INTERNAL_ERROR: i64 = -32603;
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("No wallet provider detected. Please install a compatible wallet.")]
    ProviderUnavailable,

    #[error("User rejected the request")]
    UserRejected,

    #[error("Request already pending. Please check your wallet.")]
    RequestPending,

    #[error("Wrong network: expected chain {expected}, wallet is on {actual}")]
    NetworkMismatch { expected: String, actual: String },

    #[error("Chain {0} has not been added to the wallet")]
    UnsupportedChain(String),

    #[error("Failed to access transaction storage: {0}")]
    StorageUnavailable(String),

    #[error("{0}")]
    Validation(String),

    #[error("Transaction {0} is already recorded")]
    DuplicateTransaction(String),

    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("{0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    /// Maps a provider error code onto the ledger taxonomy.
    pub fn from_provider_code(code: i64, message: &str) -> Self {
        match code {
            CODE_USER_REJECTED => LedgerError::UserRejected,
            CODE_REQUEST_PENDING => LedgerError::RequestPending,
            CODE_UNRECOGNIZED_CHAIN => LedgerError::UnsupportedChain(message.to_string()),
            CODE_INTERNAL_ERROR => {
                LedgerError::Unknown("Internal error. Please try again.".to_string())
            }
            _ if message.is_empty() => {
                LedgerError::Unknown("An unknown error occurred".to_string())
            }
            _ => LedgerError::Unknown(message.to_string()),
        }
    }

    /// Numeric code exposed to consumers, mirroring the provider codes where one exists.
    pub fn code(&self) -> i64 {
        match self {
            LedgerError::UserRejected => CODE_USER_REJECTED,
            LedgerError::RequestPending => CODE_REQUEST_PENDING,
            LedgerError::UnsupportedChain(_) => CODE_UNRECOGNIZED_CHAIN,
            _ => -1,
        }
    }

    /// True when the failure happened before anything reached the network,
    /// i.e. the send form should stay open for correction.
    pub fn is_rejected_before_submission(&self) -> bool {
        matches!(
            self,
            LedgerError::Validation(_)
                | LedgerError::UserRejected
                | LedgerError::RequestPending
                | LedgerError::ProviderUnavailable
                | LedgerError::WalletNotConnected
                | LedgerError::NetworkMismatch { .. }
        )
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    pub(crate) fn storage(message: impl std::fmt::Display) -> Self {
        LedgerError::StorageUnavailable(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_codes_map_to_taxonomy() {
        assert_eq!(
            LedgerError::from_provider_code(4001, "denied"),
            LedgerError::UserRejected
        );
        assert_eq!(
            LedgerError::from_provider_code(-32002, ""),
            LedgerError::RequestPending
        );
        assert!(matches!(
            LedgerError::from_provider_code(4902, "0x1f93"),
            LedgerError::UnsupportedChain(_)
        ));
        assert_eq!(
            LedgerError::from_provider_code(-32603, "boom").to_string(),
            "Internal error. Please try again."
        );
        assert_eq!(
            LedgerError::from_provider_code(-32000, "insufficient funds"),
            LedgerError::Unknown("insufficient funds".to_string())
        );
    }

    #[test]
    fn test_submission_rejections() {
        assert!(LedgerError::validation("bad amount").is_rejected_before_submission());
        assert!(LedgerError::UserRejected.is_rejected_before_submission());
        assert!(!LedgerError::storage("quota").is_rejected_before_submission());
        assert_eq!(LedgerError::UserRejected.code(), 4001);
        assert_eq!(LedgerError::WalletNotConnected.code(), -1);
    }
}
