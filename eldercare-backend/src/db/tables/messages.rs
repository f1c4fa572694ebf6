//! Chat message database operations

use rusqlite::{OptionalExtension, Result as SqliteResult};

use super::contacts::upsert_contact_in;
use crate::db::{parse_db_enum, parse_db_time, to_db_time, Database};
use crate::models::{ChatMessage, PersistOutcome};
use crate::relay::ChatPersistence;

impl Database {
    /// Store one relayed message and refresh both directed contact rows in a
    /// single transaction. Safe to call again for the same message id.
    pub fn persist_chat_message(&self, message: &ChatMessage) -> SqliteResult<PersistOutcome> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT INTO messages (id, time, from_id, to_id, content, kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO NOTHING",
            rusqlite::params![
                message.id,
                to_db_time(&message.time),
                message.from,
                message.to,
                &message.content,
                message.kind.as_ref(),
            ],
        )?;

        upsert_contact_in(&tx, message.from, message.to, &message.time)?;
        if !message.is_self_message() {
            upsert_contact_in(&tx, message.to, message.from, &message.time)?;
        }

        tx.commit()?;
        Ok(PersistOutcome {
            message_inserted: inserted > 0,
        })
    }

    pub fn get_message(&self, id: i64) -> SqliteResult<Option<ChatMessage>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, time, from_id, to_id, content, kind FROM messages WHERE id = ?1",
            [id],
            row_to_message,
        )
        .optional()
    }

    /// Conversation between two accounts, newest first.
    /// `before_id` pages backwards: only ids strictly lower are returned.
    pub fn list_messages_between(
        &self,
        a: i64,
        b: i64,
        before_id: Option<i64>,
        limit: usize,
    ) -> SqliteResult<Vec<ChatMessage>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, time, from_id, to_id, content, kind FROM messages
             WHERE ((from_id = ?1 AND to_id = ?2) OR (from_id = ?2 AND to_id = ?1))
               AND (?3 IS NULL OR id < ?3)
             ORDER BY id DESC
             LIMIT ?4",
        )?;

        let messages = stmt
            .query_map(rusqlite::params![a, b, before_id, limit as i64], row_to_message)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(messages)
    }

    /// Highest stored message id, 0 when empty
    pub fn max_message_id(&self) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.query_row("SELECT COALESCE(MAX(id), 0) FROM messages", [], |row| row.get(0))
    }
}

fn row_to_message(row: &rusqlite::Row) -> SqliteResult<ChatMessage> {
    let time: String = row.get(1)?;
    let kind: String = row.get(5)?;
    Ok(ChatMessage {
        id: row.get(0)?,
        time: parse_db_time(1, &time)?,
        from: row.get(2)?,
        to: row.get(3)?,
        content: row.get(4)?,
        kind: parse_db_enum(5, &kind)?,
    })
}

impl ChatPersistence for Database {
    fn persist(&self, message: &ChatMessage) -> SqliteResult<PersistOutcome> {
        self.persist_chat_message(message)
    }
}
