pub mod analytics;
pub mod config;
pub mod di;
pub mod entity;
pub mod provider;
pub mod repository;
pub mod storage;
pub mod sync;
pub mod utils;
pub mod view;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export commonly used items
pub use analytics::{
    aggregate, category_distribution, category_flows, AnalyticsSummary, CategoryStats, ChartSlice,
    FlowLink, GAS_FEES_LABEL,
};
pub use config::{AppConfig, ProviderKind};
pub use di::ServiceContainer;
pub use entity::*;
pub use provider::{
    JsonRpcProvider, SimulatedProvider, SubmittedTransfer, WalletProvider, WalletService,
};
pub use repository::{LedgerTransactionRepository, TransactionRepository};
pub use storage::{
    FileStorage, KeyValueStorage, LedgerStore, MemoryOrigin, MemoryStorage, StorageEvent,
    StorageSubscription, LEDGER_KEY, LEGACY_NOTES_KEY,
};
pub use sync::{FeeEstimateState, FeeEstimator, LedgerSnapshot, LedgerSync, WalletSession};
