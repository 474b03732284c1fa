//! In-memory [`MessageStore`] for routing tests. Can be flipped into a
//! failing mode to exercise the persistence-failure path.

use super::{MessageStore, NewMessage, StoreError, StoredMessage};
use crate::identity::Identity;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<StoredMessage>>,
    next_id: AtomicI64,
    fail_inserts: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent insert fail.
    pub fn fail_inserts(&self) {
        self.fail_inserts.store(true, Ordering::Relaxed);
    }

    pub fn rows(&self) -> Vec<StoredMessage> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(&self, msg: NewMessage) -> Result<(), StoreError> {
        if self.fail_inserts.load(Ordering::Relaxed) {
            return Err(StoreError::Sqlx(sqlx::Error::PoolClosed));
        }
        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.rows.lock().unwrap().push(StoredMessage {
            message_id,
            sender_id: msg.sender_id,
            recipient_id: msg.recipient_id,
            body: msg.body,
            created_at: msg.created_at,
            delivered: false,
        });
        Ok(())
    }

    async fn query_by_receiver(
        &self,
        receiver: &Identity,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let key = receiver.to_string();
        let mut rows: Vec<StoredMessage> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.recipient_id == key)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.created_at);
        Ok(rows)
    }

    async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| !ids.contains(&r.message_id));
        Ok((before - rows.len()) as u64)
    }
}
