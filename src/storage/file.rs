use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{debug, error, info};
use regex::Regex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use uuid::Uuid;

use super::{notice_channel, ChangeNotice, KeyValueStorage, StorageSubscription};
use crate::entity::{LedgerError, Result};

const ENTRY_EXTENSION: &str = "json";

lazy_static! {
    static ref KEY_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

/// Content fingerprints of the entries as last seen by this process.
type Fingerprints = Arc<Mutex<HashMap<String, u64>>>;

/// Directory-backed storage: one JSON document per key.
///
/// Every process opening the same directory is a separate context. Writes
/// from other processes are detected by a background poller comparing entry
/// contents against what this context last saw.
pub struct FileStorage {
    dir: PathBuf,
    context: Uuid,
    known: Fingerprints,
    notices: broadcast::Sender<ChangeNotice>,
    poller: JoinHandle<()>,
}

impl FileStorage {
    pub async fn open(dir: impl AsRef<Path>, poll_interval: Duration) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            LedgerError::storage(format!("cannot create {}: {}", dir.display(), e))
        })?;

        let known: Fingerprints = Arc::new(Mutex::new(scan(&dir).await?));
        let notices = notice_channel();
        let poller = tokio::spawn(poll_changes(
            dir.clone(),
            known.clone(),
            notices.clone(),
            poll_interval,
        ));

        info!("Opened ledger storage at {}", dir.display());
        Ok(Self {
            dir,
            context: Uuid::new_v4(),
            known,
            notices,
            poller,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        if !KEY_RE.is_match(key) {
            return Err(LedgerError::storage(format!("invalid storage key: {}", key)));
        }
        Ok(self.dir.join(format!("{}.{}", key, ENTRY_EXTENSION)))
    }
}

impl Drop for FileStorage {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

#[async_trait]
impl KeyValueStorage for FileStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LedgerError::storage(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let path = self.entry_path(key)?;
        let tmp_path = self
            .dir
            .join(format!(".{}.{}.tmp", key, Uuid::new_v4().simple()));

        // Hold the fingerprints so the poller cannot mistake our own write for a foreign one
        let mut known = self.known.lock().await;
        tokio::fs::write(&tmp_path, value).await.map_err(|e| {
            LedgerError::storage(format!("cannot write {}: {}", tmp_path.display(), e))
        })?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(LedgerError::storage(format!(
                "cannot replace {}: {}",
                path.display(),
                e
            )));
        }
        known.insert(key.to_string(), fingerprint(value));
        debug!("Context {} wrote {} ({} bytes)", self.context, key, value.len());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key)?;
        let mut known = self.known.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(LedgerError::storage(format!(
                    "cannot remove {}: {}",
                    path.display(),
                    e
                )))
            }
        }
        known.remove(key);
        Ok(())
    }

    fn subscribe(&self) -> StorageSubscription {
        StorageSubscription::new(self.notices.subscribe(), self.context)
    }
}

fn fingerprint(contents: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    contents.hash(&mut hasher);
    hasher.finish()
}

async fn scan(dir: &Path) -> Result<HashMap<String, u64>> {
    let mut entries = HashMap::new();
    let mut listing = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| LedgerError::storage(format!("cannot list {}: {}", dir.display(), e)))?;

    while let Some(entry) = listing
        .next_entry()
        .await
        .map_err(|e| LedgerError::storage(format!("cannot list {}: {}", dir.display(), e)))?
    {
        let path = entry.path();
        let key = match (path.file_stem(), path.extension()) {
            (Some(stem), Some(ext)) if ext == ENTRY_EXTENSION => stem.to_string_lossy().to_string(),
            _ => continue,
        };
        if !KEY_RE.is_match(&key) {
            continue;
        }
        // The entry may vanish between listing and reading
        if let Ok(contents) = tokio::fs::read_to_string(&path).await {
            entries.insert(key, fingerprint(&contents));
        }
    }
    Ok(entries)
}

async fn poll_changes(
    dir: PathBuf,
    known: Fingerprints,
    notices: broadcast::Sender<ChangeNotice>,
    poll_interval: Duration,
) {
    let mut ticker = interval(poll_interval);
    loop {
        ticker.tick().await;

        // Scan under the lock so a concurrent local write is never half-observed
        let mut known = known.lock().await;
        let current = match scan(&dir).await {
            Ok(current) => current,
            Err(e) => {
                error!("Error polling ledger storage: {}", e);
                continue;
            }
        };

        let mut changed: Vec<String> = current
            .iter()
            .filter(|(key, print)| known.get(*key) != Some(*print))
            .map(|(key, _)| key.clone())
            .collect();
        changed.extend(known.keys().filter(|key| !current.contains_key(*key)).cloned());
        *known = current;
        drop(known);

        for key in changed {
            debug!("Detected external change to {}", key);
            // Foreign writes carry the nil context so every local subscriber sees them
            let _ = notices.send(ChangeNotice {
                key: Some(key),
                source: Uuid::nil(),
            });
        }
    }
}
