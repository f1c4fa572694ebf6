//! Contact list database operations
//!
//! One directed row per (owner, counterpart). `last_chat_time` only ever moves
//! forward: a late or redelivered message never rewinds it.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult};

use crate::db::{now_utc, parse_db_time, to_db_time, Database};
use crate::models::{ContactEntry, ContactSummary};

/// Insert the directed row or advance its `last_chat_time`, whichever applies.
/// Takes a bare connection so it can run inside the persistence transaction.
pub(super) fn upsert_contact_in(
    conn: &Connection,
    owner: i64,
    counterpart: i64,
    time: &DateTime<Utc>,
) -> SqliteResult<()> {
    let now = to_db_time(&now_utc());
    conn.execute(
        "INSERT INTO contact_list (account_id, contact_id, last_chat_time, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(account_id, contact_id) DO UPDATE SET
            last_chat_time = excluded.last_chat_time,
            updated_at = excluded.updated_at
         WHERE excluded.last_chat_time > contact_list.last_chat_time",
        rusqlite::params![owner, counterpart, to_db_time(time), &now],
    )?;
    Ok(())
}

impl Database {
    pub fn upsert_contact(&self, owner: i64, counterpart: i64, time: &DateTime<Utc>) -> SqliteResult<()> {
        let conn = self.conn();
        upsert_contact_in(&conn, owner, counterpart, time)
    }

    pub fn get_contact_entry(&self, owner: i64, counterpart: i64) -> SqliteResult<Option<ContactEntry>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT account_id, contact_id, last_chat_time FROM contact_list
             WHERE account_id = ?1 AND contact_id = ?2",
            [owner, counterpart],
            |row| {
                let last_chat_time: String = row.get(2)?;
                Ok(ContactEntry {
                    account_id: row.get(0)?,
                    contact_id: row.get(1)?,
                    last_chat_time: parse_db_time(2, &last_chat_time)?,
                })
            },
        )
        .optional()
    }

    /// All rows in the table, ordered by (owner, counterpart)
    pub fn list_contact_entries(&self) -> SqliteResult<Vec<ContactEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT account_id, contact_id, last_chat_time FROM contact_list
             ORDER BY account_id, contact_id",
        )?;

        let entries = stmt
            .query_map([], |row| {
                let last_chat_time: String = row.get(2)?;
                Ok(ContactEntry {
                    account_id: row.get(0)?,
                    contact_id: row.get(1)?,
                    last_chat_time: parse_db_time(2, &last_chat_time)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }

    /// Owner's contacts, most recent conversation first.
    /// `before` pages backwards: only rows strictly older than it are returned.
    pub fn list_contacts(
        &self,
        owner: i64,
        before: Option<&DateTime<Utc>>,
        limit: usize,
    ) -> SqliteResult<Vec<ContactSummary>> {
        let conn = self.conn();
        let before = before.map(to_db_time);

        let mut stmt = conn.prepare(
            "SELECT c.contact_id, COALESCE(a.nickname, ''), COALESCE(a.avatar, ''), c.last_chat_time
             FROM contact_list c
             LEFT JOIN accounts a ON a.id = c.contact_id
             WHERE c.account_id = ?1 AND (?2 IS NULL OR c.last_chat_time < ?2)
             ORDER BY c.last_chat_time DESC, c.contact_id DESC
             LIMIT ?3",
        )?;

        let contacts = stmt
            .query_map(rusqlite::params![owner, before, limit as i64], |row| {
                let last_chat_time: String = row.get(3)?;
                Ok(ContactSummary {
                    contact_id: row.get(0)?,
                    nickname: row.get(1)?,
                    avatar: row.get(2)?,
                    last_chat_time: parse_db_time(3, &last_chat_time)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(contacts)
    }

    /// Ids of everyone the owner has talked with
    pub fn contact_ids(&self, owner: i64) -> SqliteResult<Vec<i64>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT contact_id FROM contact_list WHERE account_id = ?1")?;
        let ids = stmt
            .query_map([owner], |row| row.get(0))?
            .collect::<SqliteResult<Vec<i64>>>()?;
        Ok(ids)
    }
}
