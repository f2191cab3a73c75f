use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use crate::auth::Authenticator;
use crate::protocol::Edit;
use crate::room::{BroadcastRelay, RoomRegistry};

pub mod handler;

pub use handler::WebSocketHandler;

/// Axum state wrapper for the sync engine
#[derive(Clone)]
pub struct SyncState {
    registry: Arc<RoomRegistry>,
    relay: Arc<BroadcastRelay>,
    auth: Arc<dyn Authenticator>,
}

impl SyncState {
    /// Create the server-side sync state
    ///
    /// `persist_tx` is the queue drained by the persistence writer (see
    /// [`spawn_writer`](crate::persistence::spawn_writer)); the relay enqueues
    /// every accepted edit there without waiting for the durable write.
    pub fn new(auth: Arc<dyn Authenticator>, persist_tx: UnboundedSender<(String, Edit)>) -> Self {
        let registry = Arc::new(RoomRegistry::new());
        let relay = Arc::new(BroadcastRelay::new(registry.clone(), persist_tx));
        Self {
            registry,
            relay,
            auth,
        }
    }

    /// Get the room registry
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Get the broadcast relay
    pub fn relay(&self) -> &Arc<BroadcastRelay> {
        &self.relay
    }

    /// Get the auth collaborator
    pub fn auth(&self) -> &Arc<dyn Authenticator> {
        &self.auth
    }
}

/// Connection parameters presented on the realtime channel
///
/// Both are required for admission; they are modeled as optional so a missing
/// one yields a structured close frame instead of an HTTP-level rejection.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "docId")]
    pub doc_id: Option<String>,
    pub token: Option<String>,
}

/// Create a router with the realtime sync WebSocket endpoint
pub fn router_with_sync(state: SyncState) -> Router<SyncState> {
    Router::new()
        .route("/sync", get(websocket_handler))
        .with_state(state)
}

/// WebSocket handler endpoint
async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<SyncState>,
) -> Response {
    ws.on_upgrade(move |socket| WebSocketHandler::new(socket, state, params).handle())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenAuth;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_sync_state_starts_empty() {
        let (persist_tx, _persist_rx) = mpsc::unbounded_channel();
        let auth = Arc::new(StaticTokenAuth::new().with_token("t-1", "user-a"));
        let state = SyncState::new(auth, persist_tx);

        assert_eq!(state.registry().connection_count().await, 0);
        assert_eq!(state.auth().authenticate("t-1").as_deref(), Some("user-a"));
    }
}
