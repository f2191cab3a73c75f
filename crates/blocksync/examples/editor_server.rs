use axum::{extract::Path, http::StatusCode, response::Json, routing::get, Extension};
use blocksync::{
    router_with_sync, spawn_writer, Block, BlockStore, BlockType, Edit, PersistenceManager,
    StaticTokenAuth, SyncState,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, Level};
use uuid::Uuid;

/// Bootstrap snapshot endpoint: document metadata plus rank-sorted blocks.
/// A client fetches this once before opening the realtime channel.
async fn get_snapshot(
    Extension(store): Extension<Arc<BlockStore>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let snapshot = store.snapshot(&id).ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(json!({
        "id": snapshot.document_id,
        "title": snapshot.title,
        "header_note": snapshot.header_note,
        "blocks": snapshot.blocks,
    })))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

fn seed_document(store: &BlockStore, document_id: &str) {
    store.upsert_document(document_id, "Welcome", "A shared scratchpad");

    let blocks = [
        (BlockType::Heading1, "Welcome to blocksync", "U"),
        (BlockType::Paragraph, "Everyone connected to this document sees edits live.", "c"),
        (BlockType::ListItem, "Open a second client to try it", "o"),
    ];
    for (block_type, content, rank) in blocks {
        let edit = Edit::Insert {
            block: Block {
                id: Uuid::new_v4().to_string(),
                content: content.to_string(),
                block_type,
                rank: rank.to_string(),
            },
        };
        if let Err(e) = store.apply_edit(document_id, &edit) {
            tracing::error!("Failed to seed document: {}", e);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting editor server with blocksync...");

    // Block storage plus the decoupled persistence writer
    let store = Arc::new(BlockStore::new());
    let mut manager = PersistenceManager::new(store.clone(), "./data");
    manager.load_all_documents().await.ok();
    manager.start().await?;

    if store.snapshot("demo").is_none() {
        seed_document(&store, "demo");
    }

    let (persist_tx, persist_rx) = mpsc::unbounded_channel();
    spawn_writer(store.clone(), persist_rx);

    // Demo credentials; a real deployment plugs in its token verifier
    let auth = Arc::new(
        StaticTokenAuth::new()
            .with_token("alice-token", "alice")
            .with_token("bob-token", "bob"),
    );

    let sync_state = SyncState::new(auth, persist_tx);

    let app = router_with_sync(sync_state.clone())
        .route("/documents/{id}/snapshot", get(get_snapshot))
        .route("/health", get(health))
        .layer(Extension(store))
        .with_state(sync_state);

    let listener = TcpListener::bind("127.0.0.1:3001").await?;
    info!("Server running on http://127.0.0.1:3001");
    info!("WebSocket endpoint: ws://127.0.0.1:3001/sync?docId=demo&token=alice-token");
    info!("Bootstrap snapshot:  GET /documents/demo/snapshot");

    axum::serve(listener, app).await?;

    Ok(())
}
