//! SOS record database operations
//!
//! Every SOS is backed by an `emergency` task; the two rows change state together.

use chrono::Duration;
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, Row};

use super::tasks::{get_task_in, insert_task_in, set_task_status_in};
use crate::db::{now_utc, parse_db_enum, parse_db_time, parse_db_time_opt, to_db_time, Database};
use crate::models::{NewSos, NewTask, SosError, SosRecord, SosStatus, TaskStatus, EMERGENCY_CATEGORY};

const SOS_COLUMNS: &str = "id, user_id, task_id, latitude, longitude, address, description, severity, \
     status, timeout_at, resolved_at, created_at, updated_at";

fn row_to_sos(row: &Row) -> SqliteResult<SosRecord> {
    let status: String = row.get(8)?;
    let timeout_at: String = row.get(9)?;
    let resolved_at: Option<String> = row.get(10)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;

    Ok(SosRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        task_id: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        address: row.get(5)?,
        description: row.get(6)?,
        severity: row.get(7)?,
        status: parse_db_enum(8, &status)?,
        timeout_at: parse_db_time(9, &timeout_at)?,
        resolved_at: parse_db_time_opt(10, resolved_at)?,
        created_at: parse_db_time(11, &created_at)?,
        updated_at: parse_db_time(12, &updated_at)?,
    })
}

fn get_sos_in(conn: &Connection, id: i64) -> SqliteResult<Option<SosRecord>> {
    conn.query_row(
        &format!("SELECT {} FROM sos_records WHERE id = ?1", SOS_COLUMNS),
        [id],
        row_to_sos,
    )
    .optional()
}

impl Database {
    /// Create the emergency task and the SOS record in one transaction
    pub fn create_sos_with_task(&self, user_id: i64, sos: &NewSos, timeout: Duration) -> SqliteResult<SosRecord> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let description = if sos.description.trim().is_empty() {
            "Emergency help needed".to_string()
        } else {
            sos.description.clone()
        };
        let task = NewTask {
            title: "SOS".to_string(),
            description: description.clone(),
            category: Some(EMERGENCY_CATEGORY.to_string()),
            reward: 0.0,
            latitude: sos.latitude,
            longitude: sos.longitude,
            address: sos.address.clone(),
            deadline: None,
        };
        let task_id = insert_task_in(&tx, user_id, &task)?;

        let now = now_utc();
        tx.execute(
            "INSERT INTO sos_records (user_id, task_id, latitude, longitude, address, description,
                                      severity, status, timeout_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            rusqlite::params![
                user_id,
                task_id,
                sos.latitude,
                sos.longitude,
                &sos.address,
                &description,
                sos.severity_or_default(),
                SosStatus::Pending.as_ref(),
                to_db_time(&(now + timeout)),
                to_db_time(&now),
            ],
        )?;
        let sos_id = tx.last_insert_rowid();

        let record = get_sos_in(&tx, sos_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(record)
    }

    pub fn get_sos(&self, id: i64) -> SqliteResult<Option<SosRecord>> {
        let conn = self.conn();
        get_sos_in(&conn, id)
    }

    /// A responder takes a pending SOS; its task is assigned to them.
    /// Both the SOS and its task must still be pending.
    pub fn accept_sos(&self, sos_id: i64, responder_id: i64) -> Result<SosRecord, SosError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let sos = get_sos_in(&tx, sos_id)?.ok_or(SosError::NotFound)?;
        if sos.status != SosStatus::Pending {
            return Err(SosError::NotPending);
        }
        let task_pending = get_task_in(&tx, sos.task_id)?.is_some_and(|task| task.status == TaskStatus::Pending);
        if !task_pending {
            return Err(SosError::NotPending);
        }

        tx.execute(
            "UPDATE sos_records SET status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![SosStatus::Accepted.as_ref(), to_db_time(&now_utc()), sos_id],
        )?;
        set_task_status_in(&tx, sos.task_id, TaskStatus::Assigned, Some(responder_id))?;

        let updated = get_sos_in(&tx, sos_id)?.ok_or(SosError::NotFound)?;
        tx.commit()?;
        Ok(updated)
    }

    /// Close an SOS and complete its task. Allowed for the requester or whoever accepted it.
    pub fn resolve_sos(&self, sos_id: i64, account_id: i64) -> Result<SosRecord, SosError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let sos = get_sos_in(&tx, sos_id)?.ok_or(SosError::NotFound)?;
        if sos.status == SosStatus::Resolved {
            return Err(SosError::AlreadyResolved);
        }
        let assignee: Option<i64> = tx.query_row(
            "SELECT assignee_id FROM tasks WHERE id = ?1",
            [sos.task_id],
            |row| row.get(0),
        )?;
        if sos.user_id != account_id && assignee != Some(account_id) {
            return Err(SosError::NotParticipant);
        }

        let now = to_db_time(&now_utc());
        tx.execute(
            "UPDATE sos_records SET status = ?1, resolved_at = ?2, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![SosStatus::Resolved.as_ref(), &now, sos_id],
        )?;
        set_task_status_in(&tx, sos.task_id, TaskStatus::Completed, None)?;

        let updated = get_sos_in(&tx, sos_id)?.ok_or(SosError::NotFound)?;
        tx.commit()?;
        Ok(updated)
    }

    /// The user's most recent SOS that is still pending or accepted
    pub fn current_sos(&self, user_id: i64) -> SqliteResult<Option<SosRecord>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {} FROM sos_records WHERE user_id = ?1 AND status IN (?2, ?3)
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                SOS_COLUMNS
            ),
            rusqlite::params![user_id, SosStatus::Pending.as_ref(), SosStatus::Accepted.as_ref()],
            row_to_sos,
        )
        .optional()
    }
}
