use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::document::DocumentSnapshot;
use crate::protocol::{Block, BlockPatch, BlockType, Edit};

#[cfg(feature = "persistence")]
mod manager;

#[cfg(feature = "persistence")]
pub use manager::PersistenceManager;

/// One stored block row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredBlock {
    pub document_id: String,
    pub content: String,
    pub block_type: BlockType,
    pub rank: String,
}

/// Document metadata row, updated independently of block edits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub title: String,
    pub header_note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentMeta {
    fn new(title: &str, header_note: &str) -> Self {
        let now = Utc::now();
        Self {
            title: title.to_string(),
            header_note: header_note.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Thread-safe block storage keyed by block id
///
/// The store applies accepted edits as independent single-row mutations;
/// there are no cross-block transactions. Durability outcome is never
/// reported back to the edit's originator.
pub struct BlockStore {
    blocks: DashMap<String, StoredBlock>,
    /// Per-document index of block ids, kept in step with `blocks` so
    /// listing a document never scans the whole table
    document_blocks: DashMap<String, Vec<String>>,
    documents: DashMap<String, DocumentMeta>,
    /// Document ids with unsaved changes
    dirty: DashMap<String, ()>,
}

impl BlockStore {
    /// Create an empty block store
    pub fn new() -> Self {
        Self {
            blocks: DashMap::new(),
            document_blocks: DashMap::new(),
            documents: DashMap::new(),
            dirty: DashMap::new(),
        }
    }

    /// Create or replace a document metadata row
    pub fn upsert_document(&self, document_id: &str, title: &str, header_note: &str) {
        match self.documents.get_mut(document_id) {
            Some(mut meta) => {
                meta.title = title.to_string();
                meta.header_note = header_note.to_string();
                meta.updated_at = Utc::now();
            }
            None => {
                info!("Creating document row: {}", document_id);
                self.documents
                    .insert(document_id.to_string(), DocumentMeta::new(title, header_note));
            }
        }
        self.mark_dirty(document_id);
    }

    /// Get a document's metadata row
    pub fn document_meta(&self, document_id: &str) -> Option<DocumentMeta> {
        self.documents
            .get(document_id)
            .map(|entry| entry.value().clone())
    }

    /// Durably apply one accepted edit against block storage
    ///
    /// Insert of an already-stored id (possible on redelivery) is a benign
    /// no-op. Update patches only the allow-listed fields present in the
    /// edit; a missing block id is a no-op. Delete of a missing id is a
    /// no-op.
    pub fn apply_edit(&self, document_id: &str, edit: &Edit) -> crate::SyncResult<()> {
        match edit {
            Edit::Insert { block } => {
                if self.blocks.contains_key(&block.id) {
                    debug!("Duplicate insert of block {}; ignoring", block.id);
                    return Ok(());
                }
                self.blocks.insert(
                    block.id.clone(),
                    StoredBlock {
                        document_id: document_id.to_string(),
                        content: block.content.clone(),
                        block_type: block.block_type,
                        rank: block.rank.clone(),
                    },
                );
                self.document_blocks
                    .entry(document_id.to_string())
                    .or_default()
                    .push(block.id.clone());
            }
            Edit::Update { block_id, data } => {
                let Some(mut row) = self.blocks.get_mut(block_id) else {
                    debug!("Update of unknown block {}; ignoring", block_id);
                    return Ok(());
                };
                apply_patch_to_row(&mut row, data);
            }
            Edit::Delete { block_id } => {
                let Some((_, row)) = self.blocks.remove(block_id) else {
                    debug!("Delete of unknown block {}; ignoring", block_id);
                    return Ok(());
                };
                if let Some(mut ids) = self.document_blocks.get_mut(&row.document_id) {
                    ids.retain(|id| id != block_id);
                }
                self.document_blocks
                    .remove_if(&row.document_id, |_, ids| ids.is_empty());
            }
        }

        self.mark_dirty(document_id);
        Ok(())
    }

    /// All blocks of a document, sorted ascending by rank
    pub fn blocks_of(&self, document_id: &str) -> Vec<Block> {
        let ids = self
            .document_blocks
            .get(document_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        let mut blocks: Vec<Block> = ids
            .into_iter()
            .filter_map(|id| {
                self.blocks.get(&id).map(|entry| {
                    let row = entry.value();
                    Block {
                        id: id.clone(),
                        content: row.content.clone(),
                        block_type: row.block_type,
                        rank: row.rank.clone(),
                    }
                })
            })
            .collect();
        blocks.sort_by(|a, b| a.rank.cmp(&b.rank));
        blocks
    }

    /// The bootstrap snapshot a (re)connecting client fetches once
    ///
    /// There is no incremental catch-up after a disconnect; this snapshot is
    /// the only recovery path.
    pub fn snapshot(&self, document_id: &str) -> Option<DocumentSnapshot> {
        let meta = self.document_meta(document_id)?;
        Some(DocumentSnapshot {
            document_id: document_id.to_string(),
            title: meta.title,
            header_note: meta.header_note,
            blocks: self.blocks_of(document_id),
        })
    }

    /// Whether a block id is currently stored
    pub fn contains_block(&self, block_id: &str) -> bool {
        self.blocks.contains_key(block_id)
    }

    /// Total number of stored blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Document ids with unsaved changes, clearing the dirty set
    pub fn take_dirty(&self) -> Vec<String> {
        let ids: Vec<String> = self.dirty.iter().map(|e| e.key().clone()).collect();
        for id in &ids {
            self.dirty.remove(id);
        }
        ids
    }

    pub(crate) fn mark_dirty(&self, document_id: &str) {
        self.dirty.insert(document_id.to_string(), ());
    }

    /// Bulk-load a document's rows, replacing any existing ones
    pub(crate) fn load_document(
        &self,
        document_id: &str,
        meta: DocumentMeta,
        blocks: Vec<Block>,
    ) {
        if let Some((_, old_ids)) = self.document_blocks.remove(document_id) {
            for id in old_ids {
                self.blocks.remove(&id);
            }
        }
        let mut ids = Vec::with_capacity(blocks.len());
        for block in blocks {
            ids.push(block.id.clone());
            self.blocks.insert(
                block.id.clone(),
                StoredBlock {
                    document_id: document_id.to_string(),
                    content: block.content,
                    block_type: block.block_type,
                    rank: block.rank,
                },
            );
        }
        self.document_blocks.insert(document_id.to_string(), ids);
        self.documents.insert(document_id.to_string(), meta);
        // Loaded state matches disk
        self.dirty.remove(document_id);
    }
}

impl Default for BlockStore {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_patch_to_row(row: &mut StoredBlock, patch: &BlockPatch) {
    if let Some(content) = &patch.content {
        row.content = content.clone();
    }
    if let Some(block_type) = patch.block_type {
        row.block_type = block_type;
    }
    if let Some(rank) = &patch.rank {
        row.rank = rank.clone();
    }
}

/// Spawn the writer task draining the relay's persistence queue
///
/// Runs until the sending side is dropped. Failures are logged and the next
/// edit is processed; nothing is reported back to the originator.
pub fn spawn_writer(
    store: Arc<BlockStore>,
    mut rx: UnboundedReceiver<(String, Edit)>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Started persistence writer");
        while let Some((document_id, edit)) = rx.recv().await {
            if let Err(e) = store.apply_edit(&document_id, &edit) {
                error!(
                    "Failed to persist edit for document '{}': {}",
                    document_id, e
                );
            }
        }
        debug!("Persistence writer ended");
    })
}
