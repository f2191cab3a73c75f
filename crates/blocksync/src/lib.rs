//! # Blocksync - Realtime Block Synchronization
//!
//! A realtime synchronization engine for block-structured collaborative
//! documents.
//!
//! Blocks carry fractional string ranks, so inserting between neighbors never
//! renumbers existing blocks. Edits (insert/update/delete of one block) are
//! the only unit of change: each client applies its own edits optimistically,
//! the server relays them to every other connection in the same document room
//! and hands them to a decoupled persistence writer. Concurrent edits to the
//! same field resolve last-write-wins; there is no character-level merging.

pub mod auth;
pub mod document;
pub mod error;
pub mod persistence;
pub mod protocol;
pub mod rank;
pub mod room;

#[cfg(feature = "axum")]
pub mod axum;

#[cfg(feature = "client")]
pub mod client;

// Re-exports for convenience
pub use auth::{Authenticator, StaticTokenAuth};
pub use document::{ConnectionStatus, DocumentSnapshot, Reconciler};
pub use error::{SyncError, SyncResult};
pub use persistence::{spawn_writer, BlockStore, DocumentMeta, StoredBlock};
pub use protocol::{Block, BlockPatch, BlockType, Edit, WireMessage};
pub use room::{BroadcastRelay, ConnectionId, RoomRegistry};

#[cfg(feature = "axum")]
pub use axum::{router_with_sync, SyncState, WebSocketHandler};

#[cfg(feature = "client")]
pub use client::DocumentClient;

#[cfg(feature = "persistence")]
pub use persistence::PersistenceManager;
