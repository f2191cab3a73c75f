use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::protocol::WireMessage;

pub mod relay;

pub use relay::BroadcastRelay;

/// Identifier of one live connection, assigned at registration
pub type ConnectionId = String;

/// Metadata held for one connected client
///
/// A connection is bound to exactly one `(document_id, user_id)` pair for its
/// lifetime and is dropped on disconnect, never persisted.
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub document_id: String,
    pub user_id: String,
    pub sender: UnboundedSender<WireMessage>,
}

/// Tracks which connections are subscribed to which document
///
/// Rooms are implicit: one comes into being when its first subscriber
/// registers and disappears when the last one leaves. Fan-out lookups go
/// through the per-document index, so broadcasting costs O(room size)
/// instead of a scan over every connected client.
pub struct RoomRegistry {
    /// Map of connection ID to connection info
    connections: RwLock<HashMap<ConnectionId, ConnectionInfo>>,
    /// Map of document ID to the connection IDs currently subscribed to it
    rooms: RwLock<HashMap<String, Vec<ConnectionId>>>,
}

impl RoomRegistry {
    /// Create a new room registry
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection and subscribe it to a document's room
    pub async fn register(
        &self,
        sender: UnboundedSender<WireMessage>,
        document_id: &str,
        user_id: &str,
    ) -> ConnectionId {
        let connection_id = Uuid::new_v4().to_string();
        let info = ConnectionInfo {
            id: connection_id.clone(),
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
            sender,
        };

        self.connections
            .write()
            .await
            .insert(connection_id.clone(), info);
        self.rooms
            .write()
            .await
            .entry(document_id.to_string())
            .or_default()
            .push(connection_id.clone());

        tracing::info!(
            "User {} connected to document '{}' as connection {}",
            user_id,
            document_id,
            connection_id
        );
        connection_id
    }

    /// Unregister a connection and clean up its room membership
    pub async fn unregister(&self, connection_id: &str) {
        let removed = self.connections.write().await.remove(connection_id);

        if let Some(info) = removed {
            let mut rooms = self.rooms.write().await;
            if let Some(members) = rooms.get_mut(&info.document_id) {
                members.retain(|id| id != connection_id);
                if members.is_empty() {
                    rooms.remove(&info.document_id);
                }
            }
            tracing::info!(
                "Connection {} left document '{}'",
                connection_id,
                info.document_id
            );
        }
    }

    /// The document a connection is subscribed to, if it is still registered
    pub async fn document_of(&self, connection_id: &str) -> Option<String> {
        self.connections
            .read()
            .await
            .get(connection_id)
            .map(|info| info.document_id.clone())
    }

    /// Senders for every room member other than `excluding`
    pub async fn peers_of(
        &self,
        document_id: &str,
        excluding: &str,
    ) -> Vec<UnboundedSender<WireMessage>> {
        let rooms = self.rooms.read().await;
        let Some(members) = rooms.get(document_id) else {
            return Vec::new();
        };

        let connections = self.connections.read().await;
        members
            .iter()
            .filter(|id| id.as_str() != excluding)
            .filter_map(|id| connections.get(id).map(|info| info.sender.clone()))
            .collect()
    }

    /// Send a message to a specific connection
    pub async fn send_to(&self, connection_id: &str, message: WireMessage) {
        let connections = self.connections.read().await;
        if let Some(info) = connections.get(connection_id) {
            if info.sender.send(message).is_err() {
                tracing::warn!("Failed to send message to connection {}", connection_id);
            }
        }
    }

    /// Number of connections currently in a document's room
    pub async fn room_size(&self, document_id: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(document_id)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    /// Total number of registered connections
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_register_and_unregister() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let id = registry.register(tx, "doc-1", "user-a").await;
        assert_eq!(registry.connection_count().await, 1);
        assert_eq!(registry.room_size("doc-1").await, 1);
        assert_eq!(registry.document_of(&id).await.as_deref(), Some("doc-1"));

        registry.unregister(&id).await;
        assert_eq!(registry.connection_count().await, 0);
        assert_eq!(registry.room_size("doc-1").await, 0);
        assert_eq!(registry.document_of(&id).await, None);
    }

    #[tokio::test]
    async fn test_peers_excludes_sender_and_other_rooms() {
        let registry = RoomRegistry::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let (tx3, _rx3) = mpsc::unbounded_channel();

        let c1 = registry.register(tx1, "doc-1", "user-a").await;
        let _c2 = registry.register(tx2, "doc-1", "user-b").await;
        let _c3 = registry.register(tx3, "doc-2", "user-c").await;

        let peers = registry.peers_of("doc-1", &c1).await;
        assert_eq!(peers.len(), 1);

        let peers = registry.peers_of("doc-2", &c1).await;
        assert_eq!(peers.len(), 1);

        let peers = registry.peers_of("doc-3", &c1).await;
        assert!(peers.is_empty());
    }

    #[tokio::test]
    async fn test_empty_room_is_dropped() {
        let registry = RoomRegistry::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        let c1 = registry.register(tx1, "doc-1", "user-a").await;
        let c2 = registry.register(tx2, "doc-1", "user-b").await;

        registry.unregister(&c1).await;
        assert_eq!(registry.room_size("doc-1").await, 1);

        registry.unregister(&c2).await;
        assert!(registry.rooms.read().await.get("doc-1").is_none());
    }
}
