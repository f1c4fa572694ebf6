//! Relay log database operations
//!
//! Append-only topic log. Entries move pending -> acked once persisted, or
//! pending -> dead when the consumer gives up. Dead entries can be requeued.
//! Acked entries are purged after the retention period.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::{now_utc, parse_db_enum, parse_db_time, to_db_time, Database};
use crate::models::{RelayEntry, RelayStatus};

const RELAY_COLUMNS: &str = "seq, topic, message_id, payload, status, attempts, last_error, created_at";

fn row_to_entry(row: &Row) -> SqliteResult<RelayEntry> {
    let status: String = row.get(4)?;
    let created_at: String = row.get(7)?;
    Ok(RelayEntry {
        offset: row.get(0)?,
        topic: row.get(1)?,
        message_id: row.get(2)?,
        payload: row.get(3)?,
        status: parse_db_enum(4, &status)?,
        attempts: row.get(5)?,
        last_error: row.get(6)?,
        created_at: parse_db_time(7, &created_at)?,
    })
}

impl Database {
    /// Append a pending entry, returns its offset
    pub fn relay_append(&self, topic: &str, message_id: i64, payload: &str) -> SqliteResult<i64> {
        let conn = self.conn();
        let now = to_db_time(&now_utc());
        conn.execute(
            "INSERT INTO relay_log (topic, message_id, payload, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![topic, message_id, payload, RelayStatus::Pending.as_ref(), &now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// First pending entry with an offset greater than `after`
    pub fn relay_next_pending(&self, topic: &str, after: i64) -> SqliteResult<Option<RelayEntry>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {} FROM relay_log WHERE topic = ?1 AND status = ?2 AND seq > ?3 ORDER BY seq LIMIT 1",
                RELAY_COLUMNS
            ),
            rusqlite::params![topic, RelayStatus::Pending.as_ref(), after],
            row_to_entry,
        )
        .optional()
    }

    pub fn relay_get(&self, offset: i64) -> SqliteResult<Option<RelayEntry>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM relay_log WHERE seq = ?1", RELAY_COLUMNS),
            [offset],
            row_to_entry,
        )
        .optional()
    }

    pub fn relay_ack(&self, offset: i64) -> SqliteResult<bool> {
        let conn = self.conn();
        let rows_affected = conn.execute(
            "UPDATE relay_log SET status = ?1, updated_at = ?2 WHERE seq = ?3 AND status = ?4",
            rusqlite::params![
                RelayStatus::Acked.as_ref(),
                to_db_time(&now_utc()),
                offset,
                RelayStatus::Pending.as_ref(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn relay_mark_dead(&self, offset: i64, attempts: u32, reason: &str) -> SqliteResult<bool> {
        let conn = self.conn();
        let rows_affected = conn.execute(
            "UPDATE relay_log SET status = ?1, attempts = attempts + ?2, last_error = ?3, updated_at = ?4
             WHERE seq = ?5 AND status = ?6",
            rusqlite::params![
                RelayStatus::Dead.as_ref(),
                attempts,
                reason,
                to_db_time(&now_utc()),
                offset,
                RelayStatus::Pending.as_ref(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Move a dead entry back to pending. Returns false if it wasn't dead.
    pub fn relay_requeue(&self, offset: i64) -> SqliteResult<bool> {
        let conn = self.conn();
        let rows_affected = conn.execute(
            "UPDATE relay_log SET status = ?1, updated_at = ?2 WHERE seq = ?3 AND status = ?4",
            rusqlite::params![
                RelayStatus::Pending.as_ref(),
                to_db_time(&now_utc()),
                offset,
                RelayStatus::Dead.as_ref(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Dead entries, most recent first
    pub fn relay_list_dead(&self, topic: &str, limit: usize) -> SqliteResult<Vec<RelayEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM relay_log WHERE topic = ?1 AND status = ?2 ORDER BY seq DESC LIMIT ?3",
            RELAY_COLUMNS
        ))?;
        let entries = stmt
            .query_map(
                rusqlite::params![topic, RelayStatus::Dead.as_ref(), limit as i64],
                row_to_entry,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn relay_pending_count(&self, topic: &str) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM relay_log WHERE topic = ?1 AND status = ?2",
            rusqlite::params![topic, RelayStatus::Pending.as_ref()],
            |row| row.get(0),
        )
    }

    /// Delete entries acked before `older_than`. The entry holding the highest
    /// message id always stays, since it seeds the message sequence on restart.
    pub fn relay_purge_acked(&self, older_than: &DateTime<Utc>) -> SqliteResult<usize> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM relay_log
             WHERE status = ?1 AND updated_at < ?2
               AND seq <> (SELECT seq FROM relay_log ORDER BY message_id DESC, seq DESC LIMIT 1)",
            rusqlite::params![RelayStatus::Acked.as_ref(), to_db_time(older_than)],
        )
    }

    /// Highest message id ever relayed, 0 when empty
    pub fn relay_max_message_id(&self) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.query_row("SELECT COALESCE(MAX(message_id), 0) FROM relay_log", [], |row| row.get(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tables::test_support::memory_db;

    #[test]
    fn test_pending_entries_are_read_in_offset_order() {
        let db = memory_db();
        let first = db.relay_append("chat", 1, "{}").unwrap();
        let second = db.relay_append("chat", 2, "{}").unwrap();
        db.relay_append("other", 3, "{}").unwrap();

        let head = db.relay_next_pending("chat", 0).unwrap().unwrap();
        assert_eq!(head.offset, first);
        assert_eq!(head.status, RelayStatus::Pending);

        let next = db.relay_next_pending("chat", first).unwrap().unwrap();
        assert_eq!(next.offset, second);
        assert!(db.relay_next_pending("chat", second).unwrap().is_none());
        assert_eq!(db.relay_pending_count("chat").unwrap(), 2);
    }

    #[test]
    fn test_ack_removes_entry_from_pending() {
        let db = memory_db();
        let offset = db.relay_append("chat", 1, "{}").unwrap();

        assert!(db.relay_ack(offset).unwrap());
        assert!(!db.relay_ack(offset).unwrap());
        assert!(db.relay_next_pending("chat", 0).unwrap().is_none());
        assert_eq!(db.relay_get(offset).unwrap().unwrap().status, RelayStatus::Acked);
    }

    #[test]
    fn test_dead_letter_and_requeue() {
        let db = memory_db();
        let offset = db.relay_append("chat", 9, "{}").unwrap();

        assert!(db.relay_mark_dead(offset, 5, "disk full").unwrap());
        let dead = db.relay_list_dead("chat", 10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 5);
        assert_eq!(dead[0].last_error.as_deref(), Some("disk full"));
        assert_eq!(db.relay_pending_count("chat").unwrap(), 0);

        assert!(db.relay_requeue(offset).unwrap());
        assert!(!db.relay_requeue(offset).unwrap());
        assert_eq!(db.relay_next_pending("chat", 0).unwrap().unwrap().offset, offset);
        assert_eq!(db.relay_max_message_id().unwrap(), 9);
    }

    #[test]
    fn test_purge_drops_old_acked_entries_only() {
        let db = memory_db();
        let old_acked = db.relay_append("chat", 1, "{}").unwrap();
        let pending = db.relay_append("chat", 2, "{}").unwrap();
        let dead = db.relay_append("chat", 3, "{}").unwrap();
        let fresh_acked = db.relay_append("chat", 4, "{}").unwrap();
        let newest = db.relay_append("chat", 5, "{}").unwrap();
        db.relay_ack(old_acked).unwrap();
        db.relay_mark_dead(dead, 1, "boom").unwrap();
        db.relay_ack(fresh_acked).unwrap();
        db.relay_ack(newest).unwrap();

        let cutoff = now_utc() - chrono::Duration::days(1);
        let long_ago = to_db_time(&(cutoff - chrono::Duration::days(30)));
        db.conn()
            .execute(
                "UPDATE relay_log SET updated_at = ?1 WHERE seq IN (?2, ?3, ?4, ?5)",
                rusqlite::params![&long_ago, old_acked, pending, dead, newest],
            )
            .unwrap();

        assert_eq!(db.relay_purge_acked(&cutoff).unwrap(), 1);
        assert!(db.relay_get(old_acked).unwrap().is_none());
        assert!(db.relay_get(pending).unwrap().is_some());
        assert!(db.relay_get(dead).unwrap().is_some());
        assert!(db.relay_get(fresh_acked).unwrap().is_some());
        // Old and acked, but it carries the highest message id
        assert!(db.relay_get(newest).unwrap().is_some());
        assert_eq!(db.relay_max_message_id().unwrap(), 5);

        assert_eq!(db.relay_purge_acked(&cutoff).unwrap(), 0);
    }
}
