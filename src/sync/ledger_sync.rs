use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::select;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;

use crate::entity::{Annotation, LedgerError, Result, TransactionRecord};
use crate::provider::WalletProvider;
use crate::repository::TransactionRepository;
use crate::storage::{LedgerStore, StorageEvent, StorageSubscription};
use crate::utils::{now_timestamp, parse_transfer, same_address};

const LOAD_ERROR: &str = "Failed to load transaction history";

/// What a consumer sees of the ledger for the current address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub address: Option<String>,
    pub transactions: Vec<TransactionRecord>,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Default)]
struct ViewState {
    snapshot: LedgerSnapshot,
    // Ticket of the newest read applied to `snapshot`
    applied_read: u64,
}

struct SyncInner {
    repository: Arc<dyn TransactionRepository>,
    provider: Arc<dyn WalletProvider>,
    history_limit: usize,
    decimals: u32,
    view: RwLock<ViewState>,
    reads: AtomicU64,
    revision: watch::Sender<u64>,
    watchers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl SyncInner {
    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn watchers(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn address(&self) -> Option<String> {
        self.view.read().await.snapshot.address.clone()
    }

    async fn set_address(&self, address: Option<String>) {
        {
            let mut view = self.view.write().await;
            let unchanged = match (&view.snapshot.address, &address) {
                (Some(current), Some(next)) => same_address(current, next),
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                return;
            }

            debug!("Ledger address changed to {:?}", address);
            view.snapshot = LedgerSnapshot {
                address: address.clone(),
                ..LedgerSnapshot::default()
            };
        }
        self.bump();

        if address.is_some() {
            self.refresh().await;
        }
    }

    /// Re-reads the slice for the current address. Failures are recorded in
    /// the snapshot and leave the cached records untouched.
    async fn refresh(&self) {
        let ticket = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        let address = {
            let mut view = self.view.write().await;
            match view.snapshot.address.clone() {
                Some(address) => {
                    view.snapshot.is_loading = true;
                    address
                }
                None => return,
            }
        };
        self.bump();

        let result = self
            .repository
            .try_list_for_address(&address, self.history_limit)
            .await;

        {
            let mut view = self.view.write().await;
            if view.snapshot.address.as_deref() != Some(address.as_str()) {
                debug!("Discarding history read for previous address {}", address);
                return;
            }
            if ticket < view.applied_read {
                debug!("Discarding outdated history read {}", ticket);
                return;
            }
            view.applied_read = ticket;
            view.snapshot.is_loading = false;
            match result {
                Ok(transactions) => {
                    view.snapshot.transactions = transactions;
                    view.snapshot.error = None;
                }
                Err(e) => {
                    error!("Error fetching transaction history: {}", e);
                    view.snapshot.error = Some(LOAD_ERROR.to_string());
                }
            }
        }
        self.bump();
    }

    async fn handle_storage_event(&self, event: &StorageEvent) {
        if LedgerStore::is_ledger_event(event) {
            debug!("Ledger changed in another context, re-reading");
            self.refresh().await;
        }
    }

    async fn confirm(&self, id: &str) {
        let outcome = match self.provider.await_confirmation(id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Error waiting for confirmation of {}: {}", id, e);
                return;
            }
        };
        match self.repository.apply_confirmation(id, &outcome).await {
            Ok(true) => self.refresh().await,
            Ok(false) => debug!("Confirmation of {} changed nothing", id),
            Err(e) => error!("Error updating transaction receipt for {}: {}", id, e),
        }
    }
}

/// Keeps the ledger slice of one address current and routes user
/// mutations through the repository.
///
/// State changes are announced as a new revision on [`LedgerSync::subscribe`],
/// the state itself is read with [`LedgerSync::snapshot`].
pub struct LedgerSync {
    inner: Arc<SyncInner>,
    stop_tx: Option<mpsc::Sender<()>>,
    event_loop: Option<JoinHandle<()>>,
}

impl LedgerSync {
    pub fn new(
        repository: Arc<dyn TransactionRepository>,
        provider: Arc<dyn WalletProvider>,
        history_limit: usize,
        decimals: u32,
    ) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                repository,
                provider,
                history_limit,
                decimals,
                view: RwLock::new(ViewState::default()),
                reads: AtomicU64::new(0),
                revision: watch::channel(0).0,
                watchers: Mutex::new(HashMap::new()),
            }),
            stop_tx: None,
            event_loop: None,
        }
    }

    /// Follows `addresses` and the storage notifications in a background task
    /// until [`LedgerSync::stop`].
    pub fn start(
        &mut self,
        mut storage_events: StorageSubscription,
        mut addresses: watch::Receiver<Option<String>>,
    ) {
        if self.stop_tx.is_some() {
            warn!("Ledger sync is already running");
            return;
        }

        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        self.stop_tx = Some(stop_tx);

        let inner = self.inner.clone();
        self.event_loop = Some(tokio::spawn(async move {
            let initial = addresses.borrow_and_update().clone();
            inner.set_address(initial).await;

            let mut addresses_open = true;
            let mut storage_open = true;
            loop {
                select! {
                    changed = addresses.changed(), if addresses_open => {
                        if changed.is_err() {
                            debug!("Address source closed");
                            addresses_open = false;
                            continue;
                        }
                        let address = addresses.borrow_and_update().clone();
                        inner.set_address(address).await;
                    }
                    event = storage_events.recv(), if storage_open => {
                        match event {
                            Some(event) => inner.handle_storage_event(&event).await,
                            None => {
                                debug!("Storage notifications closed");
                                storage_open = false;
                            }
                        }
                    }
                    _ = stop_rx.recv() => {
                        info!("Stopping ledger sync");
                        break;
                    }
                }
            }
        }));

        info!("Ledger sync started");
    }

    /// Ends the event loop and abandons every outstanding confirmation
    /// watcher. Transfers still pending then stay pending for this context.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.event_loop.take() {
            let _ = handle.await;
        }
        self.abort_watchers();
    }

    pub async fn set_address(&self, address: Option<String>) {
        self.inner.set_address(address).await;
    }

    pub async fn refresh(&self) {
        self.inner.refresh().await;
    }

    pub async fn handle_storage_event(&self, event: &StorageEvent) {
        self.inner.handle_storage_event(event).await;
    }

    pub async fn send(&self, to: &str, amount_text: &str) -> Result<String> {
        self.send_with_annotation(to, amount_text, &Annotation::default())
            .await
    }

    /// Submits a transfer from the current address and records it as
    /// pending, carrying the note and category typed in the send form.
    ///
    /// Resolves on submission. The final status is applied later by a
    /// confirmation watcher.
    pub async fn send_with_annotation(
        &self,
        to: &str,
        amount_text: &str,
        annotation: &Annotation,
    ) -> Result<String> {
        let address = self
            .inner
            .address()
            .await
            .ok_or(LedgerError::WalletNotConnected)?;
        let (to, value) = parse_transfer(to, amount_text, self.inner.decimals)?;

        let submission = self.inner.provider.submit(&to, value).await?;
        if !same_address(&submission.from, &address) {
            warn!(
                "Transaction {} was sent from {}, not from {}",
                submission.id, submission.from, address
            );
        }
        let id = submission.id;
        let record =
            TransactionRecord::pending(id.clone(), submission.from, to, value, now_timestamp())
                .with_annotation(annotation);
        self.inner.repository.insert_optimistic(record).await?;

        self.inner.refresh().await;
        self.watch_confirmation(id.clone());
        Ok(id)
    }

    /// Updates the note and/or category of a record, then patches the cached
    /// slice without re-reading.
    pub async fn annotate(&self, id: &str, annotation: &Annotation) -> Result<()> {
        if annotation.is_empty() {
            return Ok(());
        }
        self.inner.repository.patch_annotation(id, annotation).await?;

        {
            let mut view = self.inner.view.write().await;
            if let Some(record) = view
                .snapshot
                .transactions
                .iter_mut()
                .find(|record| record.id == id)
            {
                record.annotate(annotation);
            }
        }
        self.inner.bump();
        Ok(())
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.inner.view.read().await.snapshot.clone()
    }

    pub async fn address(&self) -> Option<String> {
        self.inner.address().await
    }

    /// Revision counter bumped on every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Number of transfers still awaiting their final status.
    pub fn pending_confirmations(&self) -> usize {
        self.inner.watchers().len()
    }

    fn watch_confirmation(&self, id: String) {
        let inner = self.inner.clone();
        let mut watchers = self.inner.watchers();
        // Registered before the task can deregister itself
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            inner.confirm(&task_id).await;
            inner.watchers().remove(&task_id);
        });
        watchers.insert(id, handle);
    }

    fn abort_watchers(&self) {
        let mut watchers = self.inner.watchers();
        if !watchers.is_empty() {
            debug!("Abandoning {} confirmation watchers", watchers.len());
        }
        for (_, handle) in watchers.drain() {
            handle.abort();
        }
    }
}

impl Drop for LedgerSync {
    fn drop(&mut self) {
        if let Some(handle) = self.event_loop.take() {
            handle.abort();
        }
        self.abort_watchers();
    }
}
