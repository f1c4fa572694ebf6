//! Task (help request) database operations

use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, Row};

use crate::db::{now_utc, parse_db_enum, parse_db_time, parse_db_time_opt, to_db_time, Database};
use crate::models::{NewTask, SosStatus, Task, TaskError, TaskStatus};

const TASK_COLUMNS: &str = "id, creator_id, assignee_id, title, description, category, status, reward, \
     latitude, longitude, address, deadline, created_at, updated_at";

fn row_to_task(row: &Row) -> SqliteResult<Task> {
    let status: String = row.get(6)?;
    let deadline: Option<String> = row.get(11)?;
    let created_at: String = row.get(12)?;
    let updated_at: String = row.get(13)?;

    Ok(Task {
        id: row.get(0)?,
        creator_id: row.get(1)?,
        assignee_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        category: row.get(5)?,
        status: parse_db_enum(6, &status)?,
        reward: row.get(7)?,
        latitude: row.get(8)?,
        longitude: row.get(9)?,
        address: row.get(10)?,
        deadline: parse_db_time_opt(11, deadline)?,
        created_at: parse_db_time(12, &created_at)?,
        updated_at: parse_db_time(13, &updated_at)?,
    })
}

/// Insert a pending task on an existing connection or transaction
pub(super) fn insert_task_in(conn: &Connection, creator_id: i64, new: &NewTask) -> SqliteResult<i64> {
    let now = to_db_time(&now_utc());
    conn.execute(
        "INSERT INTO tasks (creator_id, title, description, category, status, reward,
                            latitude, longitude, address, deadline, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        rusqlite::params![
            creator_id,
            new.title.trim(),
            &new.description,
            new.category_or_default(),
            TaskStatus::Pending.as_ref(),
            new.reward,
            new.latitude,
            new.longitude,
            &new.address,
            new.deadline.as_ref().map(to_db_time),
            &now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(super) fn get_task_in(conn: &Connection, id: i64) -> SqliteResult<Option<Task>> {
    conn.query_row(
        &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
        [id],
        row_to_task,
    )
    .optional()
}

pub(super) fn set_task_status_in(
    conn: &Connection,
    id: i64,
    status: TaskStatus,
    assignee_id: Option<i64>,
) -> SqliteResult<()> {
    conn.execute(
        "UPDATE tasks SET status = ?1, assignee_id = COALESCE(?2, assignee_id), updated_at = ?3 WHERE id = ?4",
        rusqlite::params![status.as_ref(), assignee_id, to_db_time(&now_utc()), id],
    )?;
    Ok(())
}

impl Database {
    pub fn create_task(&self, creator_id: i64, new: &NewTask) -> SqliteResult<Task> {
        let conn = self.conn();
        let id = insert_task_in(&conn, creator_id, new)?;
        get_task_in(&conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn get_task(&self, id: i64) -> SqliteResult<Option<Task>> {
        let conn = self.conn();
        get_task_in(&conn, id)
    }

    /// Pending tasks, optionally restricted to one category
    pub fn list_pending_tasks(&self, category: Option<&str>) -> SqliteResult<Vec<Task>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE status = ?1 AND (?2 IS NULL OR category = ?2) ORDER BY id",
            TASK_COLUMNS
        ))?;
        let tasks = stmt
            .query_map(rusqlite::params![TaskStatus::Pending.as_ref(), category], row_to_task)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(tasks)
    }

    /// Volunteer takes a pending task. Accepting the task behind an SOS accepts the SOS too.
    pub fn accept_task(&self, task_id: i64, volunteer_id: i64) -> Result<Task, TaskError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let task = get_task_in(&tx, task_id)?.ok_or(TaskError::NotFound)?;

        if task.creator_id == volunteer_id {
            return Err(TaskError::OwnTask);
        }
        if task.status != TaskStatus::Pending {
            return Err(TaskError::InvalidState(task.status, TaskStatus::Pending));
        }

        set_task_status_in(&tx, task_id, TaskStatus::Assigned, Some(volunteer_id))?;
        tx.execute(
            "UPDATE sos_records SET status = ?1, updated_at = ?2 WHERE task_id = ?3 AND status = ?4",
            rusqlite::params![
                SosStatus::Accepted.as_ref(),
                to_db_time(&now_utc()),
                task_id,
                SosStatus::Pending.as_ref()
            ],
        )?;

        let updated = get_task_in(&tx, task_id)?.ok_or(TaskError::NotFound)?;
        tx.commit()?;
        Ok(updated)
    }

    /// Creator or assignee closes an assigned task, resolving its SOS if it has one
    pub fn complete_task(&self, task_id: i64, account_id: i64) -> Result<Task, TaskError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let task = get_task_in(&tx, task_id)?.ok_or(TaskError::NotFound)?;

        if task.creator_id != account_id && task.assignee_id != Some(account_id) {
            return Err(TaskError::NotParticipant);
        }
        if task.status != TaskStatus::Assigned {
            return Err(TaskError::InvalidState(task.status, TaskStatus::Assigned));
        }

        set_task_status_in(&tx, task_id, TaskStatus::Completed, None)?;
        let now = to_db_time(&now_utc());
        tx.execute(
            "UPDATE sos_records SET status = ?1, resolved_at = ?2, updated_at = ?2 WHERE task_id = ?3 AND status != ?1",
            rusqlite::params![SosStatus::Resolved.as_ref(), &now, task_id],
        )?;

        let updated = get_task_in(&tx, task_id)?.ok_or(TaskError::NotFound)?;
        tx.commit()?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tables::test_support::{account, memory_db};
    use crate::models::{AccountRole, EMERGENCY_CATEGORY};

    fn new_task(category: Option<&str>) -> NewTask {
        NewTask {
            title: "Groceries".into(),
            description: "Milk and bread".into(),
            category: category.map(str::to_string),
            reward: 0.0,
            latitude: 31.23,
            longitude: 121.47,
            address: "Block 4".into(),
            deadline: None,
        }
    }

    #[test]
    fn test_create_defaults_category_and_status() {
        let db = memory_db();
        let creator = account(&db, "Grace", "13800000001", AccountRole::User);

        let task = db.create_task(creator.id, &new_task(None)).unwrap();
        assert_eq!(task.category, "other");
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.assignee_id.is_none());
        assert!(!task.is_emergency());
    }

    #[test]
    fn test_accept_then_complete() {
        let db = memory_db();
        let creator = account(&db, "Grace", "13800000001", AccountRole::User);
        let helper = account(&db, "Vera", "13800000002", AccountRole::Volunteer);
        let task = db.create_task(creator.id, &new_task(None)).unwrap();

        assert!(matches!(db.accept_task(task.id, creator.id), Err(TaskError::OwnTask)));
        assert!(matches!(
            db.complete_task(task.id, creator.id),
            Err(TaskError::InvalidState(TaskStatus::Pending, TaskStatus::Assigned))
        ));

        let accepted = db.accept_task(task.id, helper.id).unwrap();
        assert_eq!(accepted.status, TaskStatus::Assigned);
        assert_eq!(accepted.assignee_id, Some(helper.id));

        let third = account(&db, "Tom", "13800000003", AccountRole::Volunteer);
        assert!(matches!(
            db.accept_task(task.id, third.id),
            Err(TaskError::InvalidState(TaskStatus::Assigned, TaskStatus::Pending))
        ));
        assert!(matches!(db.complete_task(task.id, third.id), Err(TaskError::NotParticipant)));

        let done = db.complete_task(task.id, helper.id).unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.assignee_id, Some(helper.id));
        assert!(matches!(db.accept_task(999, helper.id), Err(TaskError::NotFound)));
    }

    #[test]
    fn test_list_pending_filters_category() {
        let db = memory_db();
        let creator = account(&db, "Grace", "13800000001", AccountRole::User);
        let helper = account(&db, "Vera", "13800000002", AccountRole::Volunteer);

        let routine = db.create_task(creator.id, &new_task(None)).unwrap();
        db.create_task(creator.id, &new_task(Some(EMERGENCY_CATEGORY))).unwrap();
        let taken = db.create_task(creator.id, &new_task(None)).unwrap();
        db.accept_task(taken.id, helper.id).unwrap();

        assert_eq!(db.list_pending_tasks(None).unwrap().len(), 2);
        let emergencies = db.list_pending_tasks(Some(EMERGENCY_CATEGORY)).unwrap();
        assert_eq!(emergencies.len(), 1);
        assert!(emergencies[0].is_emergency());
        assert_eq!(db.list_pending_tasks(Some("other")).unwrap()[0].id, routine.id);
    }
}
