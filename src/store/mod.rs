//! Durable message store for recipients with no live connection.
//!
//! The routing core depends only on [`MessageStore::insert`]; the query and
//! delete operations serve the HTTP retrieval/admin surface. The trait seam
//! exists so routing tests can run against an in-memory store.

pub mod sqlite;

#[cfg(test)]
pub mod memory;

pub use sqlite::SqliteStore;

use crate::identity::Identity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// A message handed off for persistence. Identity fields carry the suffixed
/// wire form (`"42c"`, `"7v"`) for compatibility with previously stored rows.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A stored message as returned by retrieval queries.
#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub message_id: i64,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub delivered: bool,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist one undelivered message.
    async fn insert(&self, msg: NewMessage) -> Result<(), StoreError>;

    /// All messages addressed to `receiver`, oldest first.
    async fn query_by_receiver(&self, receiver: &Identity)
        -> Result<Vec<StoredMessage>, StoreError>;

    /// Bulk delete by id. Returns the number of rows removed.
    async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64, StoreError>;
}
