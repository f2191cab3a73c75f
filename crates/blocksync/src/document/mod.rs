use crate::protocol::Block;

pub mod reconciler;

pub use reconciler::{ConnectionStatus, Reconciler};

/// The bootstrap state fetched once at session start
///
/// Produced by an external collaborator (the snapshot fetch); the reconciler
/// is handed this, it never fetches it itself. `blocks` is re-sorted by rank
/// on ingest.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub document_id: String,
    pub title: String,
    pub header_note: String,
    pub blocks: Vec<Block>,
}
