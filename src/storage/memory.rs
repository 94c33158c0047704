use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{notice_channel, ChangeNotice, KeyValueStorage, StorageSubscription};
use crate::entity::{LedgerError, Result};

struct OriginState {
    entries: Mutex<HashMap<String, String>>,
    notices: broadcast::Sender<ChangeNotice>,
    quota_bytes: Option<usize>,
    available: AtomicBool,
}

/// In-memory storage shared by several contexts, the way browser tabs of
/// one origin share their local storage.
#[derive(Clone)]
pub struct MemoryOrigin {
    state: Arc<OriginState>,
}

impl MemoryOrigin {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Origin rejecting writes that would grow the stored data past `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self::build(Some(bytes))
    }

    fn build(quota_bytes: Option<usize>) -> Self {
        Self {
            state: Arc::new(OriginState {
                entries: Mutex::new(HashMap::new()),
                notices: notice_channel(),
                quota_bytes,
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Opens a new context (tab) on this origin.
    pub fn context(&self) -> MemoryStorage {
        MemoryStorage {
            origin: self.clone(),
            context: Uuid::new_v4(),
        }
    }

    /// Makes every read and write fail while `false`.
    pub fn set_available(&self, available: bool) {
        self.state.available.store(available, Ordering::SeqCst);
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        if !self.state.available.load(Ordering::SeqCst) {
            return Err(LedgerError::storage("storage is not accessible"));
        }
        self.state
            .entries
            .lock()
            .map_err(|_| LedgerError::storage("storage lock poisoned"))
    }

    fn announce(&self, key: &str, source: Uuid) {
        // No receivers just means no other context is listening
        let _ = self.state.notices.send(ChangeNotice {
            key: Some(key.to_string()),
            source,
        });
    }
}

impl Default for MemoryOrigin {
    fn default() -> Self {
        Self::new()
    }
}

/// One context's handle on a [`MemoryOrigin`].
#[derive(Clone)]
pub struct MemoryStorage {
    origin: MemoryOrigin,
    context: Uuid,
}

impl MemoryStorage {
    pub fn origin(&self) -> &MemoryOrigin {
        &self.origin
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.origin.entries()?.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        {
            let mut entries = self.origin.entries()?;
            if let Some(quota) = self.origin.state.quota_bytes {
                let used: usize = entries
                    .iter()
                    .filter(|(existing, _)| existing.as_str() != key)
                    .map(|(k, v)| k.len() + v.len())
                    .sum();
                if used + key.len() + value.len() > quota {
                    return Err(LedgerError::storage(format!(
                        "quota of {} bytes exceeded while writing {}",
                        quota, key
                    )));
                }
            }
            entries.insert(key.to_string(), value.to_string());
        }
        debug!("Context {} wrote {} ({} bytes)", self.context, key, value.len());
        self.origin.announce(key, self.context);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let removed = self.origin.entries()?.remove(key).is_some();
        if removed {
            self.origin.announce(key, self.context);
        }
        Ok(())
    }

    fn subscribe(&self) -> StorageSubscription {
        StorageSubscription::new(self.origin.state.notices.subscribe(), self.context)
    }
}
