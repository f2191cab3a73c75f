use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, warn};

use crate::document::{ConnectionStatus, DocumentSnapshot, Reconciler};
use crate::protocol::{decode_message, encode_message, WireMessage};

/// Drives a [`Reconciler`] over a live WebSocket connection
///
/// The client is handed a bootstrap snapshot (fetched out-of-band before the
/// realtime channel takes over) and keeps the reconciler in sync both ways:
/// locally emitted edits go out on the socket, inbound OP frames are applied
/// as remote edits. Connectivity changes are surfaced on the reconciler's
/// [`ConnectionStatus`], not just logged.
///
/// There is no incremental catch-up: an edit broadcast while this client was
/// disconnected is missed permanently, and recovery is a fresh snapshot plus
/// a new `connect`.
pub struct DocumentClient {
    reconciler: Arc<Mutex<Reconciler>>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl DocumentClient {
    /// Open the realtime channel for a document and start syncing
    ///
    /// `base_url` is the server root (e.g. `ws://localhost:3001`); the target
    /// document id and the bearer credential are presented as connection
    /// parameters.
    pub async fn connect(
        base_url: &str,
        token: &str,
        snapshot: DocumentSnapshot,
    ) -> crate::SyncResult<Self> {
        let url = sync_url(base_url, &snapshot.document_id, token);

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| crate::SyncError::WebSocket(e.to_string()))?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let (edit_tx, mut edit_rx) = mpsc::unbounded_channel();
        let mut reconciler = Reconciler::from_snapshot(snapshot, edit_tx);
        reconciler.set_status(ConnectionStatus::Connected);
        let reconciler = Arc::new(Mutex::new(reconciler));

        // Local edits out to the socket
        let writer = tokio::spawn(async move {
            while let Some(edit) = edit_rx.recv().await {
                let message = WireMessage::Op { payload: edit };
                match encode_message(&message) {
                    Ok(encoded) => {
                        if let Err(e) = ws_sender.send(Message::Text(encoded)).await {
                            error!("Failed to send edit: {}", e);
                            break;
                        }
                    }
                    Err(e) => error!("Failed to encode edit: {}", e),
                }
            }
            debug!("Client writer task ended");
        });

        // Inbound frames into the reconciler
        let reader = {
            let reconciler = reconciler.clone();
            tokio::spawn(async move {
                while let Some(msg) = ws_receiver.next().await {
                    match msg {
                        Ok(Message::Text(text)) => match decode_message::<WireMessage>(&text) {
                            Ok(WireMessage::Op { payload }) => {
                                reconciler.lock().await.apply_remote(&payload);
                            }
                            Err(e) => warn!("Rejected malformed frame: {}", e),
                        },
                        Ok(Message::Close(frame)) => {
                            debug!("Server closed connection: {:?}", frame);
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("WebSocket error: {}", e);
                            break;
                        }
                    }
                }
                reconciler
                    .lock()
                    .await
                    .set_status(ConnectionStatus::Disconnected);
                debug!("Client reader task ended");
            })
        };

        Ok(Self {
            reconciler,
            writer,
            reader,
        })
    }

    /// The reconciler backing this session
    ///
    /// Lock it to read the block sequence or to perform local mutations
    /// (insert, update, delete, move, reorder).
    pub fn reconciler(&self) -> &Arc<Mutex<Reconciler>> {
        &self.reconciler
    }

    /// Current connectivity state
    pub async fn status(&self) -> ConnectionStatus {
        self.reconciler.lock().await.status()
    }

    /// Tear the connection down
    pub async fn close(self) {
        self.writer.abort();
        self.reader.abort();
        self.reconciler
            .lock()
            .await
            .set_status(ConnectionStatus::Disconnected);
    }
}

fn sync_url(base_url: &str, document_id: &str, token: &str) -> String {
    format!(
        "{}/sync?docId={}&token={}",
        base_url.trim_end_matches('/'),
        document_id,
        token
    )
}
