//! Location history database operations

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::{now_utc, parse_db_time, to_db_time, Database};
use crate::models::{AccountRole, LocationUpdate, UserLocation};

const LOCATION_COLUMNS: &str = "id, account_id, latitude, longitude, address, accuracy, speed, heading, created_at";

fn row_to_location(row: &Row) -> SqliteResult<UserLocation> {
    let created_at: String = row.get(8)?;
    Ok(UserLocation {
        id: row.get(0)?,
        account_id: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        address: row.get(4)?,
        accuracy: row.get(5)?,
        speed: row.get(6)?,
        heading: row.get(7)?,
        created_at: parse_db_time(8, &created_at)?,
    })
}

impl Database {
    /// Append to the history and move the account's current position, atomically
    pub fn record_location(&self, account_id: i64, update: &LocationUpdate) -> SqliteResult<UserLocation> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = to_db_time(&now_utc());

        tx.execute(
            "INSERT INTO user_locations (account_id, latitude, longitude, address, accuracy, speed, heading, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                account_id,
                update.latitude,
                update.longitude,
                &update.address,
                update.accuracy,
                update.speed,
                update.heading,
                &now,
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE accounts SET latitude = ?1, longitude = ?2, address = ?3,
                    last_location_update = ?4, updated_at = ?4
             WHERE id = ?5",
            rusqlite::params![update.latitude, update.longitude, &update.address, &now, account_id],
        )?;

        let location = tx.query_row(
            &format!("SELECT {} FROM user_locations WHERE id = ?1", LOCATION_COLUMNS),
            [id],
            row_to_location,
        )?;
        tx.commit()?;
        Ok(location)
    }

    pub fn latest_location(&self, account_id: i64) -> SqliteResult<Option<UserLocation>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {} FROM user_locations WHERE account_id = ?1 ORDER BY id DESC LIMIT 1",
                LOCATION_COLUMNS
            ),
            [account_id],
            row_to_location,
        )
        .optional()
    }

    /// Most recent first
    pub fn location_history(&self, account_id: i64, limit: usize) -> SqliteResult<Vec<UserLocation>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM user_locations WHERE account_id = ?1 ORDER BY id DESC LIMIT ?2",
            LOCATION_COLUMNS
        ))?;
        let locations = stmt
            .query_map(rusqlite::params![account_id, limit as i64], row_to_location)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(locations)
    }

    /// Latest location per account with the given role, reported at or after `since`
    pub fn recent_locations_by_role(
        &self,
        role: AccountRole,
        since: &DateTime<Utc>,
    ) -> SqliteResult<Vec<UserLocation>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM user_locations
             WHERE id IN (
                SELECT MAX(l.id) FROM user_locations l
                JOIN accounts a ON a.id = l.account_id
                WHERE a.role = ?1 AND l.created_at >= ?2
                GROUP BY l.account_id
             )
             ORDER BY id",
            LOCATION_COLUMNS
        ))?;
        let locations = stmt
            .query_map(rusqlite::params![role.as_ref(), to_db_time(since)], row_to_location)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(locations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tables::test_support::{account, memory_db};
    use chrono::Duration;

    fn at(latitude: f64, longitude: f64) -> LocationUpdate {
        LocationUpdate {
            latitude,
            longitude,
            address: "Park".into(),
            accuracy: 5.0,
            speed: 0.0,
            heading: 0.0,
        }
    }

    #[test]
    fn test_record_location_updates_account() {
        let db = memory_db();
        let user = account(&db, "Grace", "13800000001", AccountRole::User);

        db.record_location(user.id, &at(31.0, 121.0)).unwrap();
        let latest = db.record_location(user.id, &at(31.1, 121.1)).unwrap();

        let stored = db.get_account(user.id).unwrap().unwrap();
        assert_eq!(stored.latitude, Some(31.1));
        assert_eq!(stored.longitude, Some(121.1));
        assert_eq!(stored.last_location_update, Some(latest.created_at));

        assert_eq!(db.latest_location(user.id).unwrap().unwrap().id, latest.id);
        let history = db.location_history(user.id, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].latitude, 31.1);
        assert_eq!(db.location_history(user.id, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_recent_locations_keep_latest_per_account_with_role() {
        let db = memory_db();
        let helper = account(&db, "Vera", "13800000002", AccountRole::Volunteer);
        let user = account(&db, "Grace", "13800000001", AccountRole::User);

        db.record_location(helper.id, &at(31.0, 121.0)).unwrap();
        let newest = db.record_location(helper.id, &at(31.2, 121.2)).unwrap();
        db.record_location(user.id, &at(31.0, 121.0)).unwrap();

        let since = now_utc() - Duration::hours(24);
        let found = db.recent_locations_by_role(AccountRole::Volunteer, &since).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, newest.id);

        let future = now_utc() + Duration::hours(1);
        assert!(db.recent_locations_by_role(AccountRole::Volunteer, &future).unwrap().is_empty());
    }
}
