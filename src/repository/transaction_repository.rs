use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use crate::entity::{
    Annotation, Category, ConfirmationOutcome, LedgerError, Result, TransactionRecord,
    TransactionStatus,
};
use crate::storage::LedgerStore;

/// Typed operations over the persisted ledger
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Records involving `address`, newest first, at most `limit` of them.
    async fn try_list_for_address(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>>;

    /// Like [`TransactionRepository::try_list_for_address`] but never fails:
    /// an inaccessible ledger reads as empty.
    async fn list_for_address(&self, address: &str, limit: usize) -> Vec<TransactionRecord> {
        match self.try_list_for_address(address, limit).await {
            Ok(records) => records,
            Err(e) => {
                error!("Error fetching transaction history: {}", e);
                Vec::new()
            }
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<TransactionRecord>>;

    /// Records a freshly submitted transfer as pending.
    async fn insert_optimistic(&self, record: TransactionRecord) -> Result<()>;

    /// Moves a pending record to its final status. Returns whether anything changed.
    async fn apply_confirmation(&self, id: &str, outcome: &ConfirmationOutcome) -> Result<bool>;

    async fn patch_note(&self, id: &str, note: &str) -> Result<bool>;

    async fn patch_category(&self, id: &str, category: Option<Category>) -> Result<bool>;

    /// Applies the note and category of `annotation` in one write.
    async fn patch_annotation(&self, id: &str, annotation: &Annotation) -> Result<bool>;

    /// Folds the legacy hash → note entry into the records' own `note` field
    /// and removes the entry.
    ///
    /// A non-empty embedded note wins over the legacy one. Notes for unknown
    /// hashes are dropped. Returns the number of records that received a note.
    async fn migrate_legacy_notes(&self) -> Result<usize>;
}

/// Repository over a [`LedgerStore`].
///
/// Every mutation is a read-modify-write of the whole ledger against the
/// latest stored snapshot, serialized within this context by `write_lock`.
/// Across contexts the last write wins.
pub struct LedgerTransactionRepository {
    store: LedgerStore,
    write_lock: Mutex<()>,
}

impl LedgerTransactionRepository {
    pub fn new(store: LedgerStore) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Applies `change` to the stored ledger and writes it back if it reports a change.
    async fn mutate<F>(&self, change: F) -> Result<bool>
    where
        F: FnOnce(&mut Vec<TransactionRecord>) -> Result<bool> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut records = self.store.read_all().await?;
        if !change(&mut records)? {
            return Ok(false);
        }
        self.store.write_all(&records).await?;
        Ok(true)
    }
}

#[async_trait]
impl TransactionRepository for LedgerTransactionRepository {
    async fn try_list_for_address(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>> {
        let mut records: Vec<TransactionRecord> = self
            .store
            .read_all()
            .await?
            .into_iter()
            .filter(|record| record.involves(address))
            .collect();

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<TransactionRecord>> {
        Ok(self
            .store
            .read_all()
            .await?
            .into_iter()
            .find(|record| record.id == id))
    }

    async fn insert_optimistic(&self, mut record: TransactionRecord) -> Result<()> {
        record.status = TransactionStatus::Pending;
        let id = record.id.clone();

        self.mutate(move |records| {
            if records.iter().any(|existing| existing.id == record.id) {
                return Err(LedgerError::DuplicateTransaction(record.id));
            }
            records.insert(0, record);
            Ok(true)
        })
        .await?;

        info!("Recorded pending transaction {}", id);
        Ok(())
    }

    async fn apply_confirmation(&self, id: &str, outcome: &ConfirmationOutcome) -> Result<bool> {
        let changed = self
            .mutate(|records| {
                let Some(record) = records.iter_mut().find(|record| record.id == id) else {
                    debug!("Transaction {} is not in the ledger, ignoring confirmation", id);
                    return Ok(false);
                };
                let reported = TransactionStatus::from(outcome.status);
                if record.status.is_final() && record.status != reported {
                    warn!(
                        "Transaction {} is already {}, ignoring {} outcome",
                        id, record.status, reported
                    );
                }
                Ok(record.apply_outcome(outcome))
            })
            .await?;

        if changed {
            info!(
                "Transaction {} is now {}",
                id,
                TransactionStatus::from(outcome.status)
            );
        }
        Ok(changed)
    }

    async fn patch_note(&self, id: &str, note: &str) -> Result<bool> {
        self.mutate(|records| match records.iter_mut().find(|record| record.id == id) {
            Some(record) => {
                record.set_note(note);
                Ok(true)
            }
            None => Ok(false),
        })
        .await
    }

    async fn patch_category(&self, id: &str, category: Option<Category>) -> Result<bool> {
        self.mutate(move |records| match records.iter_mut().find(|record| record.id == id) {
            Some(record) => {
                record.category = category;
                Ok(true)
            }
            None => Ok(false),
        })
        .await
    }

    async fn patch_annotation(&self, id: &str, annotation: &Annotation) -> Result<bool> {
        self.mutate(|records| match records.iter_mut().find(|record| record.id == id) {
            Some(record) => {
                record.annotate(annotation);
                Ok(true)
            }
            None => Ok(false),
        })
        .await
    }

    async fn migrate_legacy_notes(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let Some(legacy) = self.store.read_legacy_notes().await? else {
            return Ok(0);
        };

        let mut records = self.store.read_all().await?;
        let mut migrated = 0;
        for record in records.iter_mut().filter(|record| record.note.is_none()) {
            if let Some(note) = legacy.get(&record.id).filter(|note| !note.trim().is_empty()) {
                record.set_note(note.trim());
                migrated += 1;
            }
        }

        let orphaned = legacy
            .keys()
            .filter(|id| !records.iter().any(|record| &record.id == *id))
            .count();
        if orphaned > 0 {
            warn!("Dropping {} legacy notes without a ledger record", orphaned);
        }

        if migrated > 0 {
            self.store.write_all(&records).await?;
        }
        self.store.remove_legacy_notes().await?;
        info!("Migrated {} legacy transaction notes", migrated);
        Ok(migrated)
    }
}
