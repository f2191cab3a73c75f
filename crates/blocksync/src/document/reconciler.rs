use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use uuid::Uuid;

use super::DocumentSnapshot;
use crate::protocol::{Block, BlockPatch, BlockType, Edit};
use crate::rank;

/// Visible connectivity state of the realtime channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// One client's view of a document's ordered block sequence
///
/// The reconciler owns the in-memory sequence and keeps it consistent under
/// both locally initiated and remotely received edits, all routed through one
/// shared transition ([`apply`](Reconciler::apply)). Local mutations take
/// effect immediately (optimistic, no round-trip wait) and emit exactly one
/// edit on the outbound channel.
pub struct Reconciler {
    document_id: String,
    title: String,
    header_note: String,
    /// Always sorted ascending by rank
    blocks: Vec<Block>,
    outbound: UnboundedSender<Edit>,
    status: ConnectionStatus,
}

impl Reconciler {
    /// Bootstrap a reconciler from an externally fetched snapshot
    pub fn from_snapshot(snapshot: DocumentSnapshot, outbound: UnboundedSender<Edit>) -> Self {
        let mut blocks = snapshot.blocks;
        blocks.sort_by(|a, b| a.rank.cmp(&b.rank));

        Self {
            document_id: snapshot.document_id,
            title: snapshot.title,
            header_note: snapshot.header_note,
            blocks,
            outbound,
            status: ConnectionStatus::Disconnected,
        }
    }

    /// The document this reconciler tracks
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Document title from the bootstrap snapshot
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Header note from the bootstrap snapshot
    pub fn header_note(&self) -> &str {
        &self.header_note
    }

    /// The current block sequence, ascending by rank
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Current connectivity state, surfaced to the presentation layer
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Record a connectivity change observed by the transport
    pub fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            debug!(
                "Document '{}' connection status: {:?}",
                self.document_id, status
            );
            self.status = status;
        }
    }

    /// The shared transition applying one edit to the sequence
    ///
    /// Used identically for local and remote edits. Updates to ids no longer
    /// present are expected (the block may have been deleted locally) and
    /// leave the state unchanged; deletes are idempotent; updated fields win
    /// wholesale over previous values (last-write-wins per field).
    pub fn apply(&mut self, edit: &Edit) {
        match edit {
            Edit::Insert { block } => {
                self.blocks.push(block.clone());
                self.blocks.sort_by(|a, b| a.rank.cmp(&b.rank));
            }
            Edit::Update { block_id, data } => {
                let Some(block) = self.blocks.iter_mut().find(|b| &b.id == block_id) else {
                    return;
                };
                if let Some(content) = &data.content {
                    block.content = content.clone();
                }
                if let Some(block_type) = data.block_type {
                    block.block_type = block_type;
                }
                if let Some(rank) = &data.rank {
                    block.rank = rank.clone();
                    self.blocks.sort_by(|a, b| a.rank.cmp(&b.rank));
                }
            }
            Edit::Delete { block_id } => {
                self.blocks.retain(|b| &b.id != block_id);
            }
        }
    }

    /// Apply an edit received from a peer over the realtime channel
    pub fn apply_remote(&mut self, edit: &Edit) {
        self.apply(edit);
    }

    /// Insert an empty block after `after_id` (or at the top when `None`)
    ///
    /// Allocates a rank between the anchor and its current successor, applies
    /// the insert optimistically and emits it. Returns the new block's id.
    pub fn insert_after(
        &mut self,
        after_id: Option<&str>,
        block_type: BlockType,
    ) -> crate::SyncResult<String> {
        let prev_index = match after_id {
            Some(id) => self.blocks.iter().position(|b| b.id == id),
            None => None,
        };

        let prev_rank = prev_index.map(|i| self.blocks[i].rank.clone());
        let next_index = prev_index.map(|i| i + 1).unwrap_or(0);
        let next_rank = self.blocks.get(next_index).map(|b| b.rank.clone());

        let new_rank = rank::allocate(prev_rank.as_deref(), next_rank.as_deref())?;
        let block = Block {
            id: Uuid::new_v4().to_string(),
            content: String::new(),
            block_type,
            rank: new_rank,
        };
        let id = block.id.clone();

        let edit = Edit::Insert { block };
        self.apply(&edit);
        self.emit(edit);
        Ok(id)
    }

    /// Replace a block's content
    pub fn update_content(&mut self, block_id: &str, content: &str) {
        let edit = Edit::Update {
            block_id: block_id.to_string(),
            data: BlockPatch::content(content),
        };
        self.apply(&edit);
        self.emit(edit);
    }

    /// Change a block's type
    pub fn update_type(&mut self, block_id: &str, block_type: BlockType) {
        let edit = Edit::Update {
            block_id: block_id.to_string(),
            data: BlockPatch {
                block_type: Some(block_type),
                ..BlockPatch::default()
            },
        };
        self.apply(&edit);
        self.emit(edit);
    }

    /// Delete a block
    pub fn delete(&mut self, block_id: &str) {
        let edit = Edit::Delete {
            block_id: block_id.to_string(),
        };
        self.apply(&edit);
        self.emit(edit);
    }

    /// Swap a block with the one above it
    ///
    /// Re-ranks between the two blocks that become the destination neighbors
    /// and emits an update carrying only the new rank. No-op at the top.
    pub fn move_up(&mut self, block_id: &str) -> crate::SyncResult<()> {
        let Some(index) = self.blocks.iter().position(|b| b.id == block_id) else {
            return Ok(());
        };
        if index == 0 {
            return Ok(());
        }

        // Jump over the block directly above
        let prev_rank = (index >= 2).then(|| self.blocks[index - 2].rank.clone());
        let next_rank = self.blocks[index - 1].rank.clone();

        let new_rank = rank::allocate(prev_rank.as_deref(), Some(&next_rank))?;
        self.rerank(block_id, new_rank);
        Ok(())
    }

    /// Swap a block with the one below it
    ///
    /// No-op at the bottom.
    pub fn move_down(&mut self, block_id: &str) -> crate::SyncResult<()> {
        let Some(index) = self.blocks.iter().position(|b| b.id == block_id) else {
            return Ok(());
        };
        if index == self.blocks.len() - 1 {
            return Ok(());
        }

        // Jump over the block directly below
        let prev_rank = self.blocks[index + 1].rank.clone();
        let next_rank = self.blocks.get(index + 2).map(|b| b.rank.clone());

        let new_rank = rank::allocate(Some(&prev_rank), next_rank.as_deref())?;
        self.rerank(block_id, new_rank);
        Ok(())
    }

    /// Move a block to the position currently held by `over_id`
    pub fn reorder(&mut self, active_id: &str, over_id: &str) -> crate::SyncResult<()> {
        let Some(old_index) = self.blocks.iter().position(|b| b.id == active_id) else {
            return Ok(());
        };
        let Some(new_index) = self.blocks.iter().position(|b| b.id == over_id) else {
            return Ok(());
        };
        if old_index == new_index {
            return Ok(());
        }

        // Simulate the splice to find the destination neighbors
        let mut spliced: Vec<&Block> = self.blocks.iter().collect();
        let moved = spliced.remove(old_index);
        spliced.insert(new_index, moved);

        let prev_rank = (new_index > 0).then(|| spliced[new_index - 1].rank.clone());
        let next_rank = spliced.get(new_index + 1).map(|b| b.rank.clone());

        let new_rank = rank::allocate(prev_rank.as_deref(), next_rank.as_deref())?;
        self.rerank(active_id, new_rank);
        Ok(())
    }

    fn rerank(&mut self, block_id: &str, new_rank: String) {
        let edit = Edit::Update {
            block_id: block_id.to_string(),
            data: BlockPatch::rank(new_rank),
        };
        self.apply(&edit);
        self.emit(edit);
    }

    fn emit(&self, edit: Edit) {
        if self.outbound.send(edit).is_err() {
            // Optimistic state is kept; the session recovers via re-fetch
            warn!(
                "Outbound channel for document '{}' is closed; edit not sent",
                self.document_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn block(id: &str, rank: &str) -> Block {
        Block {
            id: id.to_string(),
            content: String::new(),
            block_type: BlockType::Paragraph,
            rank: rank.to_string(),
        }
    }

    fn reconciler(blocks: Vec<Block>) -> (Reconciler, UnboundedReceiver<Edit>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let snapshot = DocumentSnapshot {
            document_id: "D1".to_string(),
            title: "Untitled".to_string(),
            header_note: String::new(),
            blocks,
        };
        (Reconciler::from_snapshot(snapshot, tx), rx)
    }

    fn ids(r: &Reconciler) -> Vec<&str> {
        r.blocks().iter().map(|b| b.id.as_str()).collect()
    }

    #[test]
    fn test_snapshot_is_sorted_on_ingest() {
        let (r, _rx) = reconciler(vec![block("B", "c"), block("A", "a")]);
        assert_eq!(ids(&r), vec!["A", "B"]);
    }

    #[test]
    fn test_insert_between_neighbors() {
        // Document [A("a"), B("c")], insert after A with no explicit next:
        // the new rank must land strictly between "a" and "c".
        let (mut r, mut rx) = reconciler(vec![block("A", "a"), block("B", "c")]);

        let new_id = r.insert_after(Some("A"), BlockType::Paragraph).unwrap();
        assert_eq!(ids(&r), vec!["A", new_id.as_str(), "B"]);

        let new_rank = &r.blocks()[1].rank;
        assert!("a" < new_rank.as_str() && new_rank.as_str() < "c");

        // Exactly one INSERT emitted
        match rx.try_recv().unwrap() {
            Edit::Insert { block } => assert_eq!(block.id, new_id),
            other => panic!("Expected INSERT, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_insert_into_empty_document() {
        let (mut r, _rx) = reconciler(vec![]);
        let id = r.insert_after(None, BlockType::Heading1).unwrap();
        assert_eq!(ids(&r), vec![id.as_str()]);
    }

    #[test]
    fn test_insert_at_top() {
        let (mut r, _rx) = reconciler(vec![block("A", "a")]);

        // Rank "a" is above the low sentinel, so there is room at the top
        let id = r.insert_after(None, BlockType::Paragraph).unwrap();
        assert_eq!(ids(&r), vec![id.as_str(), "A"]);
    }

    #[test]
    fn test_update_missing_id_is_noop() {
        let (mut r, _rx) = reconciler(vec![block("A", "a")]);
        let before = r.blocks().to_vec();

        r.apply(&Edit::Update {
            block_id: "missing-id".to_string(),
            data: BlockPatch::content("x"),
        });

        assert_eq!(r.blocks(), before.as_slice());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (mut r, _rx) = reconciler(vec![block("A", "a"), block("B", "c")]);
        let delete = Edit::Delete {
            block_id: "A".to_string(),
        };

        r.apply(&delete);
        let once = r.blocks().to_vec();
        r.apply(&delete);

        assert_eq!(r.blocks(), once.as_slice());
        assert_eq!(ids(&r), vec!["B"]);
    }

    #[test]
    fn test_update_content_is_last_write_wins() {
        let (mut r, _rx) = reconciler(vec![block("A", "a")]);

        r.apply(&Edit::Update {
            block_id: "A".to_string(),
            data: BlockPatch::content("a"),
        });
        r.apply(&Edit::Update {
            block_id: "A".to_string(),
            data: BlockPatch::content("b"),
        });

        assert_eq!(r.blocks()[0].content, "b");
    }

    #[test]
    fn test_remote_rank_update_reorders() {
        let (mut r, _rx) = reconciler(vec![block("A", "a"), block("B", "c")]);

        r.apply_remote(&Edit::Update {
            block_id: "B".to_string(),
            data: BlockPatch::rank("0M"),
        });

        assert_eq!(ids(&r), vec!["B", "A"]);
    }

    #[test]
    fn test_move_up_swaps_with_block_above() {
        let (mut r, mut rx) = reconciler(vec![block("A", "a"), block("B", "c"), block("C", "e")]);

        r.move_up("C").unwrap();
        assert_eq!(ids(&r), vec!["A", "C", "B"]);

        match rx.try_recv().unwrap() {
            Edit::Update { block_id, data } => {
                assert_eq!(block_id, "C");
                assert!(data.rank.is_some());
                assert!(data.content.is_none());
                assert!(data.block_type.is_none());
            }
            other => panic!("Expected UPDATE, got {:?}", other),
        }
    }

    #[test]
    fn test_move_up_at_top_is_noop_and_silent() {
        let (mut r, mut rx) = reconciler(vec![block("A", "a"), block("B", "c")]);

        r.move_up("A").unwrap();
        assert_eq!(ids(&r), vec!["A", "B"]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_move_down_swaps_with_block_below() {
        let (mut r, _rx) = reconciler(vec![block("A", "a"), block("B", "c"), block("C", "e")]);

        r.move_down("A").unwrap();
        assert_eq!(ids(&r), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_move_down_at_bottom_is_noop() {
        let (mut r, mut rx) = reconciler(vec![block("A", "a"), block("B", "c")]);

        r.move_down("B").unwrap();
        assert_eq!(ids(&r), vec!["A", "B"]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reorder_to_position() {
        let (mut r, mut rx) =
            reconciler(vec![block("A", "a"), block("B", "c"), block("C", "e")]);

        r.reorder("C", "A").unwrap();
        assert_eq!(ids(&r), vec!["C", "A", "B"]);

        match rx.try_recv().unwrap() {
            Edit::Update { block_id, data } => {
                assert_eq!(block_id, "C");
                assert!(data.rank.is_some());
            }
            other => panic!("Expected UPDATE, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reorder_onto_itself_is_noop() {
        let (mut r, mut rx) = reconciler(vec![block("A", "a"), block("B", "c")]);

        r.reorder("A", "A").unwrap();
        assert_eq!(ids(&r), vec!["A", "B"]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_local_and_remote_edits_converge() {
        let (mut local, mut rx) = reconciler(vec![block("A", "a"), block("B", "c")]);
        let (mut peer, _peer_rx) = reconciler(vec![block("A", "a"), block("B", "c")]);

        local.insert_after(Some("A"), BlockType::Paragraph).unwrap();
        local.update_content("B", "updated");
        local.delete("A");

        while let Ok(edit) = rx.try_recv() {
            peer.apply_remote(&edit);
        }

        assert_eq!(local.blocks(), peer.blocks());
    }

    #[test]
    fn test_status_starts_disconnected() {
        let (mut r, _rx) = reconciler(vec![]);
        assert_eq!(r.status(), ConnectionStatus::Disconnected);

        r.set_status(ConnectionStatus::Connected);
        assert_eq!(r.status(), ConnectionStatus::Connected);
    }
}
