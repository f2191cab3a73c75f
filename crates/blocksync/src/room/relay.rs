use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, warn};

use super::RoomRegistry;
use crate::protocol::{Edit, WireMessage};

/// Fans an inbound edit out to room peers and hands it to persistence
///
/// Delivery is best-effort and at-most-once per currently subscribed peer:
/// a connection that registered after the edit arrived, or disconnected
/// before fan-out reached it, never sees it. There is no ordering guarantee
/// between edits sent concurrently by different peers.
pub struct BroadcastRelay {
    registry: Arc<RoomRegistry>,
    persist_tx: UnboundedSender<(String, Edit)>,
}

impl BroadcastRelay {
    /// Create a relay over a registry and a persistence queue
    pub fn new(registry: Arc<RoomRegistry>, persist_tx: UnboundedSender<(String, Edit)>) -> Self {
        Self {
            registry,
            persist_tx,
        }
    }

    /// The registry this relay fans out through
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Relay one edit from a subscribed connection
    ///
    /// The edit is delivered unmodified to every other peer in the sender's
    /// room, then enqueued for persistence. The durable write is never
    /// awaited here and its outcome is never reported back to the sender.
    pub async fn relay(&self, from: &str, edit: Edit) {
        let Some(document_id) = self.registry.document_of(from).await else {
            warn!(
                "Dropping edit from unregistered connection {}: {:?}",
                from, edit
            );
            return;
        };

        let peers = self.registry.peers_of(&document_id, from).await;
        debug!(
            "Relaying {} for block {} in document '{}' to {} peer(s)",
            edit_kind(&edit),
            edit.block_id(),
            document_id,
            peers.len()
        );

        let message = WireMessage::Op {
            payload: edit.clone(),
        };
        for sender in peers {
            if sender.send(message.clone()).is_err() {
                // Peer is tearing down; its unregister will catch up
                warn!("Failed to deliver edit to a peer in document '{}'", document_id);
            }
        }

        if self.persist_tx.send((document_id.clone(), edit)).is_err() {
            error!(
                "Persistence queue closed; edit for document '{}' not stored",
                document_id
            );
        }
    }
}

fn edit_kind(edit: &Edit) -> &'static str {
    match edit {
        Edit::Insert { .. } => "INSERT",
        Edit::Update { .. } => "UPDATE",
        Edit::Delete { .. } => "DELETE",
    }
}
