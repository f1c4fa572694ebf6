//! Auth session database operations

use chrono::Duration;
use rusqlite::{OptionalExtension, Result as SqliteResult};
use uuid::Uuid;

use crate::db::{now_utc, parse_db_time, to_db_time, Database};
use crate::models::Session;

impl Database {
    /// Mint a new opaque bearer token for an account
    pub fn create_session(&self, account_id: i64, ttl: Duration) -> SqliteResult<Session> {
        let conn = self.conn();
        let token = Uuid::new_v4().to_string();
        let created_at = now_utc();
        let expires_at = created_at + ttl;

        conn.execute(
            "INSERT INTO auth_sessions (token, account_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![&token, account_id, to_db_time(&created_at), to_db_time(&expires_at)],
        )?;

        Ok(Session {
            id: conn.last_insert_rowid(),
            token,
            account_id,
            created_at,
            expires_at,
        })
    }

    /// Return the session if the token exists and has not expired
    pub fn validate_session(&self, token: &str) -> SqliteResult<Option<Session>> {
        let conn = self.conn();
        let now = to_db_time(&now_utc());

        conn.query_row(
            "SELECT id, token, account_id, created_at, expires_at FROM auth_sessions
             WHERE token = ?1 AND expires_at > ?2",
            rusqlite::params![token, &now],
            |row| {
                let created_at: String = row.get(3)?;
                let expires_at: String = row.get(4)?;
                Ok(Session {
                    id: row.get(0)?,
                    token: row.get(1)?,
                    account_id: row.get(2)?,
                    created_at: parse_db_time(3, &created_at)?,
                    expires_at: parse_db_time(4, &expires_at)?,
                })
            },
        )
        .optional()
    }

    pub fn delete_session(&self, token: &str) -> SqliteResult<bool> {
        let conn = self.conn();
        let rows_affected = conn.execute("DELETE FROM auth_sessions WHERE token = ?1", [token])?;
        Ok(rows_affected > 0)
    }

    /// Drop expired tokens, returns how many were removed
    pub fn purge_expired_sessions(&self) -> SqliteResult<usize> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM auth_sessions WHERE expires_at <= ?1",
            [to_db_time(&now_utc())],
        )
    }
}
