use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{KeyValueStorage, StorageEvent, StorageSubscription, LEDGER_KEY, LEGACY_NOTES_KEY};
use crate::entity::{LedgerError, Result, TransactionRecord};

/// Typed access to the persisted ledger: the full list of records for every
/// address this origin has seen, read and written as a whole.
#[derive(Clone)]
pub struct LedgerStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl LedgerStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Reads the full ledger. An origin that never wrote one has an empty ledger.
    pub async fn read_all(&self) -> Result<Vec<TransactionRecord>> {
        match self.storage.get_item(LEDGER_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| LedgerError::storage(format!("stored ledger is corrupt: {}", e))),
            None => Ok(Vec::new()),
        }
    }

    /// Replaces the full ledger. Other contexts are notified by the storage.
    pub async fn write_all(&self, records: &[TransactionRecord]) -> Result<()> {
        let raw = serde_json::to_string(records)
            .map_err(|e| LedgerError::storage(format!("cannot encode ledger: {}", e)))?;
        self.storage.set_item(LEDGER_KEY, &raw).await?;
        debug!("Wrote {} ledger records", records.len());
        Ok(())
    }

    pub fn subscribe(&self) -> StorageSubscription {
        self.storage.subscribe()
    }

    pub fn is_ledger_event(event: &StorageEvent) -> bool {
        event.concerns(LEDGER_KEY)
    }

    /// Reads the legacy hash → note entry, `None` once it has been removed.
    pub async fn read_legacy_notes(&self) -> Result<Option<BTreeMap<String, String>>> {
        match self.storage.get_item(LEGACY_NOTES_KEY).await? {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
                LedgerError::storage(format!("legacy notes entry is corrupt: {}", e))
            }),
            None => Ok(None),
        }
    }

    pub async fn remove_legacy_notes(&self) -> Result<()> {
        self.storage.remove_item(LEGACY_NOTES_KEY).await?;
        debug!("Removed the legacy notes entry");
        Ok(())
    }
}
