//! Relay consumer - replays the log into the message store
//!
//! Reads entries in offset order, decodes each one, and runs the persistence
//! transaction under the retry policy. Success is acknowledged; exhausted
//! retries and undecodable payloads are dead-lettered so the log keeps moving.
//! With a retention set, acked entries are compacted away periodically.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::retry::{retry, RetryPolicy};
use super::{RelayError, RelayLog};
use crate::db::now_utc;
use crate::models::{ChatMessage, PersistOutcome, RelayEntry};

/// How often the run loop compacts the log
const COMPACT_EVERY: Duration = Duration::from_secs(3600);

/// Where relayed messages end up
pub trait ChatPersistence: Send + Sync {
    /// Insert the message and refresh both contact rows atomically.
    /// Must be idempotent for a given message id.
    fn persist(&self, message: &ChatMessage) -> rusqlite::Result<PersistOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Persisted(PersistOutcome),
    DeadLettered,
}

pub struct RelayConsumer {
    log: Arc<dyn RelayLog>,
    store: Arc<dyn ChatPersistence>,
    policy: RetryPolicy,
    poll_interval: Duration,
    retention: Option<chrono::Duration>,
}

impl RelayConsumer {
    pub fn new(
        log: Arc<dyn RelayLog>,
        store: Arc<dyn ChatPersistence>,
        policy: RetryPolicy,
        poll_interval: Duration,
    ) -> Self {
        Self {
            log,
            store,
            policy,
            poll_interval,
            retention: None,
        }
    }

    /// Keep acked entries this long; None keeps them forever
    pub fn with_retention(mut self, retention: Option<chrono::Duration>) -> Self {
        self.retention = retention;
        self
    }

    /// Purge acked entries older than the retention, 0 when retention is off
    pub fn compact(&self) -> Result<usize, RelayError> {
        let Some(retention) = self.retention else {
            return Ok(0);
        };
        let purged = self.log.purge_acked(&(now_utc() - retention))?;
        if purged > 0 {
            log::info!("[RELAY] Compacted {} acked entries", purged);
        }
        Ok(purged)
    }

    /// Consume until cancelled. Each idle period re-scans from the head so
    /// requeued or unacknowledged entries are picked up again.
    pub async fn run(self, cancel: CancellationToken) {
        log::info!("[RELAY] Consumer started");
        let mut last_compact: Option<Instant> = None;

        loop {
            if last_compact.is_none_or(|at| at.elapsed() >= COMPACT_EVERY) {
                if let Err(e) = self.compact() {
                    log::error!("[RELAY] Compaction failed: {}", e);
                }
                last_compact = Some(Instant::now());
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.drain() => match result {
                    Ok(0) => {}
                    Ok(count) => log::debug!("[RELAY] Processed {} entries", count),
                    Err(e) => log::error!("[RELAY] Consumer error: {}", e),
                },
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.log.wait_for_append(self.poll_interval) => {}
            }
        }

        log::info!("[RELAY] Consumer stopped");
    }

    /// Process every pending entry currently in the log, in offset order
    pub async fn drain(&self) -> Result<usize, RelayError> {
        let mut cursor = 0;
        let mut count = 0;

        while let Some(entry) = self.log.next_after(cursor)? {
            cursor = entry.offset;
            self.process(&entry).await?;
            count += 1;
        }

        Ok(count)
    }

    pub async fn process(&self, entry: &RelayEntry) -> Result<EntryOutcome, RelayError> {
        let message: ChatMessage = match serde_json::from_str(&entry.payload) {
            Ok(message) => message,
            Err(e) => {
                log::error!("[RELAY] Undecodable entry at offset {}: {}", entry.offset, e);
                self.log.dead_letter(entry.offset, 1, &format!("decode: {}", e))?;
                return Ok(EntryOutcome::DeadLettered);
            }
        };

        let label = format!("persist message {}", message.id);
        match retry(&self.policy, &label, || self.store.persist(&message)).await {
            Ok(outcome) => {
                self.log.ack(entry.offset)?;
                if !outcome.message_inserted {
                    log::debug!("[RELAY] Message {} was already stored (redelivery)", message.id);
                }
                Ok(EntryOutcome::Persisted(outcome))
            }
            Err(e) => {
                log::error!(
                    "[RELAY] Dead-lettering message {} at offset {}: {}",
                    message.id,
                    entry.offset,
                    e
                );
                self.log
                    .dead_letter(entry.offset, e.attempts, &e.last_error.to_string())?;
                Ok(EntryOutcome::DeadLettered)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{to_db_time, Database};
    use crate::models::{MessageKind, RelayStatus};
    use crate::relay::{publish_chat, SqliteRelayLog, CHAT_TOPIC};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls, then writes through to the database
    struct FlakyStore {
        db: Arc<Database>,
        failures: u32,
        calls: AtomicU32,
    }

    impl ChatPersistence for FlakyStore {
        fn persist(&self, message: &ChatMessage) -> rusqlite::Result<PersistOutcome> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(rusqlite::Error::InvalidQuery);
            }
            self.db.persist_chat_message(message)
        }
    }

    struct Harness {
        db: Arc<Database>,
        log: Arc<SqliteRelayLog>,
    }

    impl Harness {
        fn new() -> Self {
            let db = Arc::new(Database::new(":memory:").unwrap());
            let log = Arc::new(SqliteRelayLog::new(db.clone(), CHAT_TOPIC));
            Self { db, log }
        }

        fn consumer(&self, store: Arc<dyn ChatPersistence>, max_attempts: u32) -> RelayConsumer {
            let policy = RetryPolicy {
                max_attempts,
                max_elapsed: None,
                initial_interval: Duration::from_millis(1),
                max_interval: Duration::from_millis(2),
                multiplier: 2.0,
                jitter: 0.0,
            };
            RelayConsumer::new(self.log.clone(), store, policy, Duration::from_millis(20))
        }

        fn flaky(&self, failures: u32) -> Arc<FlakyStore> {
            Arc::new(FlakyStore {
                db: self.db.clone(),
                failures,
                calls: AtomicU32::new(0),
            })
        }

        fn publish(&self, id: i64, from: i64, to: i64) -> (ChatMessage, i64) {
            let message = ChatMessage {
                id,
                from,
                to,
                content: format!("message {}", id),
                kind: MessageKind::Text,
                time: now_utc(),
            };
            let offset = publish_chat(self.log.as_ref(), &message).unwrap();
            (message, offset)
        }
    }

    #[tokio::test]
    async fn test_entry_is_acked_after_commit() {
        let h = Harness::new();
        let (message, offset) = h.publish(1, 10, 20);
        let consumer = h.consumer(h.db.clone(), 3);

        assert_eq!(consumer.drain().await.unwrap(), 1);

        assert_eq!(h.db.get_message(1).unwrap().unwrap(), message);
        assert!(h.db.get_contact_entry(10, 20).unwrap().is_some());
        assert!(h.db.get_contact_entry(20, 10).unwrap().is_some());
        assert_eq!(h.db.relay_get(offset).unwrap().unwrap().status, RelayStatus::Acked);
        assert_eq!(h.log.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let h = Harness::new();
        let (_, offset) = h.publish(1, 10, 20);
        let store = h.flaky(2);
        let consumer = h.consumer(store.clone(), 5);

        consumer.drain().await.unwrap();

        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert!(h.db.get_message(1).unwrap().is_some());
        assert_eq!(h.db.relay_get(offset).unwrap().unwrap().status, RelayStatus::Acked);
    }

    #[tokio::test]
    async fn test_exhausted_retries_dead_letter_without_stalling() {
        let h = Harness::new();
        let (_, stuck) = h.publish(1, 10, 20);
        h.publish(2, 10, 20);
        // Fails both attempts for entry 1, then entry 2 goes through
        let consumer = h.consumer(h.flaky(2), 2);

        assert_eq!(consumer.drain().await.unwrap(), 2);

        let dead = h.log.dead_letters(10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].offset, stuck);
        assert_eq!(dead[0].attempts, 2);
        assert!(dead[0].last_error.is_some());
        assert!(h.db.get_message(1).unwrap().is_none());
        assert!(h.db.get_message(2).unwrap().is_some());

        // Requeue with a healthy store and it lands
        assert!(h.log.requeue(stuck).unwrap());
        let healthy = h.consumer(h.db.clone(), 2);
        assert_eq!(healthy.drain().await.unwrap(), 1);
        assert!(h.db.get_message(1).unwrap().is_some());
        assert!(h.log.dead_letters(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dead_lettered_immediately() {
        let h = Harness::new();
        let bad = h.log.append(99, "not json").unwrap();
        h.publish(1, 10, 20);
        let store = h.flaky(0);
        let consumer = h.consumer(store.clone(), 5);

        consumer.drain().await.unwrap();

        let dead = h.log.dead_letters(10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].offset, bad);
        assert!(dead[0].last_error.as_deref().unwrap().starts_with("decode"));
        // Only the good entry reached the store
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_redelivered_entry_does_not_duplicate() {
        let h = Harness::new();
        let (message, _) = h.publish(5, 10, 20);
        let consumer = h.consumer(h.db.clone(), 3);
        consumer.drain().await.unwrap();

        // Same record appended again, as after a crash before ack
        publish_chat(h.log.as_ref(), &message).unwrap();
        let entry = h.log.next_after(0).unwrap().unwrap();
        let outcome = consumer.process(&entry).await.unwrap();

        assert_eq!(
            outcome,
            EntryOutcome::Persisted(PersistOutcome { message_inserted: false })
        );
        let count: i64 = h
            .db
            .conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(h.db.list_contact_entries().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_compact_respects_retention() {
        let h = Harness::new();
        let (_, first) = h.publish(1, 10, 20);
        let (_, second) = h.publish(2, 10, 20);
        h.consumer(h.db.clone(), 3).drain().await.unwrap();

        let long_ago = to_db_time(&(now_utc() - chrono::Duration::days(10)));
        h.db.conn()
            .execute("UPDATE relay_log SET updated_at = ?1", [&long_ago])
            .unwrap();

        // No retention configured: nothing goes
        assert_eq!(h.consumer(h.db.clone(), 3).compact().unwrap(), 0);

        let consumer = h.consumer(h.db.clone(), 3).with_retention(Some(chrono::Duration::days(7)));
        assert_eq!(consumer.compact().unwrap(), 1);
        assert!(h.db.relay_get(first).unwrap().is_none());
        // Newest id survives so the sequence can resume after it
        assert!(h.db.relay_get(second).unwrap().is_some());
        assert!(h.db.get_message(1).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_run_loop_picks_up_appends_and_stops_on_cancel() {
        let h = Harness::new();
        let consumer = h.consumer(h.db.clone(), 3);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(consumer.run(cancel.clone()));

        h.publish(1, 10, 20);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while h.log.pending_count().unwrap() > 0 {
            assert!(tokio::time::Instant::now() < deadline, "consumer never caught up");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(h.db.get_message(1).unwrap().is_some());

        cancel.cancel();
        handle.await.unwrap();
    }
}
