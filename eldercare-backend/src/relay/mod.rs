//! Durable relay between the realtime fan-out loop and the message store
//!
//! The fan-out loop appends every stamped chat message to an ordered log; a
//! single consumer reads it back in append order and persists each entry.
//! Delivery is at-least-once: an entry is only acknowledged after its
//! transaction commits, so a crash between commit and ack replays it.

pub mod consumer;
pub mod retry;

pub use consumer::{ChatPersistence, RelayConsumer};
pub use retry::RetryPolicy;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;

use crate::db::Database;
use crate::models::{ChatMessage, RelayEntry};

/// Topic carrying chat messages
pub const CHAT_TOPIC: &str = "chat.messages";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("relay payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Ordered append log with per-entry acknowledgement
#[async_trait]
pub trait RelayLog: Send + Sync {
    /// Append a payload, returns its offset
    fn append(&self, message_id: i64, payload: &str) -> Result<i64, RelayError>;

    /// First unacknowledged entry after `cursor` (0 = from the start)
    fn next_after(&self, cursor: i64) -> Result<Option<RelayEntry>, RelayError>;

    fn ack(&self, offset: i64) -> Result<(), RelayError>;

    /// Park an entry the consumer gave up on
    fn dead_letter(&self, offset: i64, attempts: u32, reason: &str) -> Result<(), RelayError>;

    /// Drop entries acknowledged before `older_than`, returns how many went
    fn purge_acked(&self, older_than: &DateTime<Utc>) -> Result<usize, RelayError>;

    /// Resolve when something new was appended, or after `max_wait`
    async fn wait_for_append(&self, max_wait: Duration);
}

/// Serialize a chat message and append it to the log
pub fn publish_chat(log: &dyn RelayLog, message: &ChatMessage) -> Result<i64, RelayError> {
    let payload = serde_json::to_string(message)?;
    log.append(message.id, &payload)
}

/// Relay log stored in the `relay_log` table of the main database
pub struct SqliteRelayLog {
    db: Arc<Database>,
    topic: String,
    appended: Notify,
}

impl SqliteRelayLog {
    pub fn new(db: Arc<Database>, topic: &str) -> Self {
        Self {
            db,
            topic: topic.to_string(),
            appended: Notify::new(),
        }
    }

    pub fn pending_count(&self) -> Result<i64, RelayError> {
        Ok(self.db.relay_pending_count(&self.topic)?)
    }

    pub fn dead_letters(&self, limit: usize) -> Result<Vec<RelayEntry>, RelayError> {
        Ok(self.db.relay_list_dead(&self.topic, limit)?)
    }

    /// Put a dead entry back in line and wake the consumer.
    /// Returns false if the offset isn't a dead entry.
    pub fn requeue(&self, offset: i64) -> Result<bool, RelayError> {
        let requeued = self.db.relay_requeue(offset)?;
        if requeued {
            self.appended.notify_one();
        }
        Ok(requeued)
    }
}

#[async_trait]
impl RelayLog for SqliteRelayLog {
    fn append(&self, message_id: i64, payload: &str) -> Result<i64, RelayError> {
        let offset = self.db.relay_append(&self.topic, message_id, payload)?;
        self.appended.notify_one();
        Ok(offset)
    }

    fn next_after(&self, cursor: i64) -> Result<Option<RelayEntry>, RelayError> {
        Ok(self.db.relay_next_pending(&self.topic, cursor)?)
    }

    fn ack(&self, offset: i64) -> Result<(), RelayError> {
        if !self.db.relay_ack(offset)? {
            log::warn!("[RELAY] ack for offset {} matched no pending entry", offset);
        }
        Ok(())
    }

    fn dead_letter(&self, offset: i64, attempts: u32, reason: &str) -> Result<(), RelayError> {
        self.db.relay_mark_dead(offset, attempts, reason)?;
        Ok(())
    }

    fn purge_acked(&self, older_than: &DateTime<Utc>) -> Result<usize, RelayError> {
        Ok(self.db.relay_purge_acked(older_than)?)
    }

    async fn wait_for_append(&self, max_wait: Duration) {
        let _ = tokio::time::timeout(max_wait, self.appended.notified()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::now_utc;
    use crate::models::MessageKind;
    use std::time::Instant;

    fn relay() -> SqliteRelayLog {
        let db = Arc::new(Database::new(":memory:").unwrap());
        SqliteRelayLog::new(db, CHAT_TOPIC)
    }

    #[test]
    fn test_publish_chat_stores_json_payload() {
        let log = relay();
        let message = ChatMessage {
            id: 42,
            from: 1,
            to: 2,
            content: "hello".into(),
            kind: MessageKind::Text,
            time: now_utc(),
        };

        let offset = publish_chat(&log, &message).unwrap();
        let entry = log.next_after(0).unwrap().unwrap();
        assert_eq!(entry.offset, offset);
        assert_eq!(entry.message_id, 42);
        assert_eq!(serde_json::from_str::<ChatMessage>(&entry.payload).unwrap(), message);
        assert_eq!(log.pending_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_append_wakes_waiter() {
        let log = relay();
        log.append(1, "{}").unwrap();

        // The stored permit from the append releases the wait immediately
        let started = Instant::now();
        log.wait_for_append(Duration::from_secs(5)).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_requeue_only_touches_dead_entries() {
        let log = relay();
        let offset = log.append(1, "{}").unwrap();

        assert!(!log.requeue(offset).unwrap());
        log.dead_letter(offset, 3, "boom").unwrap();
        assert_eq!(log.dead_letters(10).unwrap().len(), 1);
        assert!(log.requeue(offset).unwrap());
        assert!(log.dead_letters(10).unwrap().is_empty());
    }
}
