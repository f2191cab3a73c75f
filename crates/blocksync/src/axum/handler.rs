use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{ConnectParams, SyncState};
use crate::protocol::{decode_message, encode_message, WireMessage};

/// Close code for a connection attempt missing `docId` or `token`
pub const CLOSE_MISSING_PARAMS: u16 = 4400;
/// Close code for a rejected credential
pub const CLOSE_UNAUTHORIZED: u16 = 4401;

/// Handles WebSocket connections for individual clients
pub struct WebSocketHandler {
    socket: WebSocket,
    state: SyncState,
    params: ConnectParams,
}

impl WebSocketHandler {
    /// Create a new WebSocket handler
    pub fn new(socket: WebSocket, state: SyncState, params: ConnectParams) -> Self {
        Self {
            socket,
            state,
            params,
        }
    }

    /// Handle the WebSocket connection
    ///
    /// Admission happens before any registration: a connection with missing
    /// parameters or a rejected credential is closed with a structured close
    /// frame and never joins a room.
    pub async fn handle(mut self) {
        let (document_id, token) = match (self.params.doc_id.take(), self.params.token.take()) {
            (Some(doc), Some(token)) => (doc, token),
            _ => {
                warn!("Connection rejected: missing docId or token");
                close(self.socket, CLOSE_MISSING_PARAMS, "missing docId or token").await;
                return;
            }
        };

        let Some(user_id) = self.state.auth().authenticate(&token) else {
            warn!("Connection rejected for document '{}': invalid credential", document_id);
            close(self.socket, CLOSE_UNAUTHORIZED, "invalid credential").await;
            return;
        };

        let (mut ws_sender, mut ws_receiver) = self.socket.split();

        // Channel carrying fan-out messages to this client
        let (tx, mut rx) = mpsc::unbounded_channel::<WireMessage>();

        let connection_id = self
            .state
            .registry()
            .register(tx, &document_id, &user_id)
            .await;
        let connection_id_clone = connection_id.clone();

        // Spawn task to send messages to the WebSocket
        let sender_task = {
            let connection_id = connection_id.clone();
            tokio::spawn(async move {
                while let Some(message) = rx.recv().await {
                    match encode_message(&message) {
                        Ok(encoded) => {
                            if let Err(e) = ws_sender.send(Message::Text(encoded.into())).await {
                                error!(
                                    "Failed to send WebSocket message to connection {}: {}",
                                    connection_id, e
                                );
                                break;
                            }
                        }
                        Err(e) => {
                            error!(
                                "Failed to encode message for connection {}: {}",
                                connection_id, e
                            );
                        }
                    }
                }
                debug!("Sender task ended for connection {}", connection_id);
            })
        };

        // Handle incoming messages from the WebSocket
        let receiver_task = {
            let state = self.state.clone();
            let connection_id = connection_id.clone();

            tokio::spawn(async move {
                while let Some(msg) = ws_receiver.next().await {
                    match msg {
                        Ok(Message::Text(text)) => {
                            // Malformed frames are dropped per-message; the
                            // connection stays up and nothing reaches peers
                            // or persistence.
                            match decode_message::<WireMessage>(text.as_str()) {
                                Ok(WireMessage::Op { payload }) => {
                                    state.relay().relay(&connection_id, payload).await;
                                }
                                Err(e) => {
                                    warn!(
                                        "Rejected malformed message from connection {}: {}",
                                        connection_id, e
                                    );
                                }
                            }
                        }
                        Ok(Message::Binary(_)) => {
                            warn!(
                                "Received unexpected binary message from connection {}",
                                connection_id
                            );
                        }
                        Ok(Message::Close(_)) => {
                            info!("Connection {} closed normally", connection_id);
                            break;
                        }
                        Ok(Message::Ping(_)) => {
                            debug!("Received ping from connection {}", connection_id);
                            // Axum handles pong responses automatically
                        }
                        Ok(Message::Pong(_)) => {
                            debug!("Received pong from connection {}", connection_id);
                        }
                        Err(e) => {
                            warn!("WebSocket error for connection {}: {}", connection_id, e);
                            break;
                        }
                    }
                }
                debug!("Receiver task ended for connection {}", connection_id);
            })
        };

        // Wait for either task to complete (indicating connection should close)
        let completion_reason = tokio::select! {
            _ = sender_task => "sender task completed",
            _ = receiver_task => "receiver task completed",
        };

        info!(
            "WebSocket connection ending for connection {} ({})",
            connection_id, completion_reason
        );

        // Deregister immediately; edits already queued for persistence still
        // complete.
        self.state.registry().unregister(&connection_id_clone).await;
    }
}

async fn close(mut socket: WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!("Failed to send close frame: {}", e);
    }
}
