//! Account database operations

use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use super::evaluations::insert_evaluation_in;
use crate::db::{now_utc, parse_db_enum, parse_db_time, parse_db_time_opt, to_db_time, Database};
use crate::models::{Account, AccountUpdate, NewAccount, Sex};

pub(super) const ACCOUNT_COLUMNS: &str = "id, nickname, avatar, sex, phone, age, role, latitude, longitude, \
     address, last_location_update, created_at, updated_at";

pub(super) fn row_to_account(row: &Row) -> SqliteResult<Account> {
    let role: String = row.get(6)?;
    let last_location_update: Option<String> = row.get(10)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;

    Ok(Account {
        id: row.get(0)?,
        nickname: row.get(1)?,
        avatar: row.get(2)?,
        sex: Sex::from_i64(row.get(3)?),
        phone: row.get(4)?,
        age: row.get(5)?,
        role: parse_db_enum(6, &role)?,
        latitude: row.get(7)?,
        longitude: row.get(8)?,
        address: row.get(9)?,
        last_location_update: parse_db_time_opt(10, last_location_update)?,
        created_at: parse_db_time(11, &created_at)?,
        updated_at: parse_db_time(12, &updated_at)?,
    })
}

impl Database {
    /// Insert a new account. Fails with a UNIQUE violation on a taken phone number.
    pub fn create_account(&self, new: &NewAccount) -> SqliteResult<Account> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = to_db_time(&now_utc());

        tx.execute(
            "INSERT INTO accounts (nickname, avatar, sex, phone, age, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            rusqlite::params![
                new.nickname.trim(),
                &new.avatar,
                new.sex.as_i64(),
                new.phone.trim(),
                new.age,
                new.role.as_ref(),
                &now,
            ],
        )?;
        let id = tx.last_insert_rowid();
        insert_evaluation_in(&tx, id, &now)?;

        let account = tx.query_row(
            &format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLUMNS),
            [id],
            row_to_account,
        )?;
        tx.commit()?;
        Ok(account)
    }

    /// Whether a phone number is already taken
    pub fn phone_registered(&self, phone: &str) -> SqliteResult<bool> {
        let conn = self.conn();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE phone = ?1)",
            [phone.trim()],
            |row| row.get(0),
        )
    }

    pub fn get_account(&self, id: i64) -> SqliteResult<Option<Account>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLUMNS),
            [id],
            row_to_account,
        )
        .optional()
    }

    /// Apply a partial profile update. Returns None if the account does not exist.
    pub fn update_account(&self, id: i64, update: &AccountUpdate) -> SqliteResult<Option<Account>> {
        let conn = self.conn();
        let now = to_db_time(&now_utc());

        let rows_affected = conn.execute(
            "UPDATE accounts SET
                nickname = COALESCE(?1, nickname),
                avatar = COALESCE(?2, avatar),
                sex = COALESCE(?3, sex),
                age = COALESCE(?4, age),
                role = COALESCE(?5, role),
                updated_at = ?6
             WHERE id = ?7",
            rusqlite::params![
                update.nickname.as_deref().map(str::trim),
                update.avatar.as_deref(),
                update.sex.map(|s| s.as_i64()),
                update.age,
                update.role.map(|r| r.as_ref().to_string()),
                &now,
                id,
            ],
        )?;

        if rows_affected == 0 {
            return Ok(None);
        }

        conn.query_row(
            &format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLUMNS),
            [id],
            row_to_account,
        )
        .optional()
    }

    /// Every account with a known position, except `exclude`
    pub fn list_located_accounts(&self, exclude: i64) -> SqliteResult<Vec<Account>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts
             WHERE id != ?1 AND latitude IS NOT NULL AND longitude IS NOT NULL
             ORDER BY id",
            ACCOUNT_COLUMNS
        ))?;

        let accounts = stmt
            .query_map([exclude], row_to_account)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::is_unique_violation;
    use crate::db::tables::test_support::{account, memory_db};
    use crate::models::AccountRole;

    #[test]
    fn test_create_and_get_account() {
        let db = memory_db();
        let created = account(&db, "Grace", "13800000001", AccountRole::User);

        let fetched = db.get_account(created.id).unwrap().unwrap();
        assert_eq!(fetched.nickname, "Grace");
        assert_eq!(fetched.sex, Sex::Woman);
        assert_eq!(fetched.role, AccountRole::User);
        assert!(fetched.latitude.is_none());
        assert!(db.get_account(created.id + 100).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_phone_is_unique_violation() {
        let db = memory_db();
        account(&db, "Grace", "13800000001", AccountRole::User);

        let err = db
            .create_account(&NewAccount {
                nickname: "Other".into(),
                phone: "13800000001".into(),
                sex: Sex::Man,
                age: 30,
                role: AccountRole::Volunteer,
                avatar: String::new(),
            })
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn test_phone_registered() {
        let db = memory_db();
        account(&db, "Grace", "13800000001", AccountRole::User);

        assert!(db.phone_registered("13800000001").unwrap());
        assert!(db.phone_registered(" 13800000001 ").unwrap());
        assert!(!db.phone_registered("13800000002").unwrap());
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let db = memory_db();
        let created = account(&db, "Grace", "13800000001", AccountRole::User);

        let update = AccountUpdate {
            nickname: Some("Granny Grace".into()),
            role: Some(AccountRole::Volunteer),
            ..Default::default()
        };
        let updated = db.update_account(created.id, &update).unwrap().unwrap();
        assert_eq!(updated.nickname, "Granny Grace");
        assert_eq!(updated.role, AccountRole::Volunteer);
        assert_eq!(updated.age, 70);
        assert_eq!(updated.phone, "13800000001");

        assert!(db.update_account(999, &update).unwrap().is_none());
    }

    #[test]
    fn test_list_located_accounts_skips_unlocated_and_excluded() {
        let db = memory_db();
        let creator = account(&db, "Grace", "13800000001", AccountRole::User);
        let helper = account(&db, "Vera", "13800000002", AccountRole::Volunteer);
        account(&db, "Nowhere", "13800000003", AccountRole::Volunteer);

        for id in [creator.id, helper.id] {
            db.conn()
                .execute(
                    "UPDATE accounts SET latitude = 31.2, longitude = 121.4 WHERE id = ?1",
                    [id],
                )
                .unwrap();
        }

        let located = db.list_located_accounts(creator.id).unwrap();
        assert_eq!(located.len(), 1);
        assert_eq!(located[0].id, helper.id);
    }
}
