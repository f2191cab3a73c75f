use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{interval, Duration};
use tracing::{error, info};

use super::{BlockStore, DocumentMeta};
use crate::protocol::Block;

/// On-disk shape of one document file
#[derive(Serialize, Deserialize)]
struct PersistedDocument {
    meta: DocumentMeta,
    blocks: Vec<Block>,
}

/// Flushes dirty documents from a [`BlockStore`] to disk in the background
///
/// Storage is a best-effort durability layer; the live broadcast remains the
/// source of truth for the current session. Flush failures are logged and
/// retried on the next tick because the document stays dirty.
pub struct PersistenceManager {
    store: Arc<BlockStore>,
    storage_path: PathBuf,
    check_interval: Duration,
    handles: JoinSet<()>,
}

impl PersistenceManager {
    /// Create a new persistence manager
    pub fn new(store: Arc<BlockStore>, storage_path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            storage_path: storage_path.into(),
            check_interval: Duration::from_secs(10),
            handles: JoinSet::new(),
        }
    }

    /// Set the interval for flushing dirty documents
    pub fn set_check_interval(&mut self, interval: Duration) {
        self.check_interval = interval;
    }

    /// Start the background flush loop
    pub async fn start(&mut self) -> crate::SyncResult<()> {
        tokio::fs::create_dir_all(&self.storage_path).await?;

        info!(
            "Starting persistence manager with storage path: {:?}",
            self.storage_path
        );

        let store = self.store.clone();
        let storage_path = self.storage_path.clone();
        let check_interval = self.check_interval;

        self.handles.spawn(async move {
            let mut interval = interval(check_interval);

            loop {
                interval.tick().await;
                flush_dirty(&store, &storage_path).await;
            }
        });

        Ok(())
    }

    /// Stop the flush loop after one final persistence pass
    pub async fn stop(&mut self) {
        info!("Stopping persistence manager");

        flush_dirty(&self.store, &self.storage_path).await;

        self.handles.abort_all();
        while let Some(result) = self.handles.join_next().await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    error!("Persistence task error: {}", e);
                }
            }
        }
    }

    /// Load all persisted documents into the store
    ///
    /// Called on startup to restore state from a previous run.
    pub async fn load_all_documents(&self) -> crate::SyncResult<()> {
        info!(
            "Loading documents from storage path: {:?}",
            self.storage_path
        );

        let mut entries = tokio::fs::read_dir(&self.storage_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Some(file_stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if let Err(e) = load_document(&self.store, file_stem, &path).await {
                        error!("Failed to load document from {:?}: {}", path, e);
                    } else {
                        info!("Loaded document '{}'", file_stem);
                    }
                }
            }
        }

        Ok(())
    }
}

async fn flush_dirty(store: &BlockStore, storage_path: &Path) {
    for document_id in store.take_dirty() {
        if let Err(e) = persist_document(store, &document_id, storage_path).await {
            error!("Failed to persist document '{}': {}", document_id, e);
            // Re-mark so the next tick retries
            store.mark_dirty(&document_id);
        } else {
            info!("Persisted document '{}'", document_id);
        }
    }
}

/// Persist a single document to disk
async fn persist_document(
    store: &BlockStore,
    document_id: &str,
    storage_path: &Path,
) -> crate::SyncResult<()> {
    let meta = store
        .document_meta(document_id)
        .ok_or_else(|| crate::SyncError::Persistence(format!("No metadata for {}", document_id)))?;

    let persisted = PersistedDocument {
        meta,
        blocks: store.blocks_of(document_id),
    };
    let json_data = serde_json::to_string_pretty(&persisted)?;

    let file_path = storage_path.join(format!("{}.json", document_id));
    tokio::fs::write(&file_path, json_data).await?;

    Ok(())
}

/// Load a single document from disk
async fn load_document(
    store: &BlockStore,
    document_id: &str,
    file_path: &PathBuf,
) -> crate::SyncResult<()> {
    let json_data = tokio::fs::read_to_string(file_path).await?;
    let persisted: PersistedDocument = serde_json::from_str(&json_data)?;

    store.load_document(document_id, persisted.meta, persisted.blocks);

    Ok(())
}
