//! Persistence for the ledger.
//!
//! [`KeyValueStorage`] is the raw key-value capability shared by every
//! context of one origin, [`LedgerStore`] is the typed contract on top of
//! it. Writes made by one context are announced to the other contexts
//! through [`StorageSubscription`], never to the writer itself.

mod file;
mod ledger_store;
mod memory;

use async_trait::async_trait;
use log::warn;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::entity::Result;

pub use file::FileStorage;
pub use ledger_store::LedgerStore;
pub use memory::{MemoryOrigin, MemoryStorage};

/// Entry holding the JSON array of transaction records.
pub const LEDGER_KEY: &str = "transactions";

/// Legacy entry mapping transaction hash to a free-text note.
pub const LEGACY_NOTES_KEY: &str = "transaction_notes";

const NOTICE_CAPACITY: usize = 64;

/// A change made to the shared storage by another context.
///
/// `key` is `None` when the change cannot be attributed to a single key,
/// subscribers should then re-read everything they depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: Option<String>,
}

impl StorageEvent {
    pub fn concerns(&self, key: &str) -> bool {
        self.key.as_deref().map_or(true, |changed| changed == key)
    }
}

#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    async fn remove_item(&self, key: &str) -> Result<()>;

    /// Subscribes to changes made by other contexts.
    fn subscribe(&self) -> StorageSubscription;
}

#[derive(Debug, Clone)]
pub(crate) struct ChangeNotice {
    pub key: Option<String>,
    pub source: Uuid,
}

pub(crate) fn notice_channel() -> broadcast::Sender<ChangeNotice> {
    broadcast::channel(NOTICE_CAPACITY).0
}

pub struct StorageSubscription {
    receiver: broadcast::Receiver<ChangeNotice>,
    context: Uuid,
}

impl StorageSubscription {
    pub(crate) fn new(receiver: broadcast::Receiver<ChangeNotice>, context: Uuid) -> Self {
        Self { receiver, context }
    }

    /// Waits for the next change made by another context.
    /// Returns `None` once the storage behind the subscription is gone.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(notice) if notice.source == self.context => continue,
                Ok(notice) => return Some(StorageEvent { key: notice.key }),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Missed {} storage notifications, forcing a full re-read", skipped);
                    return Some(StorageEvent { key: None });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_concerns_key() {
        let event = StorageEvent {
            key: Some(LEDGER_KEY.to_string()),
        };
        assert!(event.concerns(LEDGER_KEY));
        assert!(!event.concerns("wallet_address"));
        assert!(StorageEvent { key: None }.concerns(LEDGER_KEY));
    }
}
