//! Account rating operations
//!
//! Ratings only ever accumulate: each one adds its score to the total and
//! bumps the count. The row is created with the account.

use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, Row};

use crate::db::{now_utc, parse_db_time, to_db_time, Database};
use crate::models::AccountEvaluation;

fn row_to_evaluation(row: &Row) -> SqliteResult<AccountEvaluation> {
    let updated_at: String = row.get(3)?;
    Ok(AccountEvaluation {
        account_id: row.get(0)?,
        score: row.get(1)?,
        assign_count: row.get(2)?,
        updated_at: parse_db_time(3, &updated_at)?,
    })
}

/// Zeroed rating row for a new account
pub(super) fn insert_evaluation_in(conn: &Connection, account_id: i64, now: &str) -> SqliteResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO account_evaluations (account_id, score, assign_count, created_at, updated_at)
         VALUES (?1, 0, 0, ?2, ?2)",
        rusqlite::params![account_id, now],
    )?;
    Ok(())
}

fn get_evaluation_in(conn: &Connection, account_id: i64) -> SqliteResult<Option<AccountEvaluation>> {
    conn.query_row(
        "SELECT account_id, score, assign_count, updated_at FROM account_evaluations WHERE account_id = ?1",
        [account_id],
        row_to_evaluation,
    )
    .optional()
}

impl Database {
    pub fn get_evaluation(&self, account_id: i64) -> SqliteResult<Option<AccountEvaluation>> {
        let conn = self.conn();
        get_evaluation_in(&conn, account_id)
    }

    /// Add one rating. Returns None when the account doesn't exist.
    /// Score range is checked by the caller.
    pub fn evaluate_account(&self, account_id: i64, score: i64) -> SqliteResult<Option<AccountEvaluation>> {
        let conn = self.conn();
        let now = to_db_time(&now_utc());

        // Accounts from before the ratings table get their row on first rating
        let rows_affected = conn.execute(
            "INSERT INTO account_evaluations (account_id, score, assign_count, created_at, updated_at)
             SELECT id, ?2, 1, ?3, ?3 FROM accounts WHERE id = ?1
             ON CONFLICT(account_id) DO UPDATE SET
                 score = score + excluded.score,
                 assign_count = assign_count + 1,
                 updated_at = excluded.updated_at",
            rusqlite::params![account_id, score, &now],
        )?;
        if rows_affected == 0 {
            return Ok(None);
        }
        get_evaluation_in(&conn, account_id)
    }
}
