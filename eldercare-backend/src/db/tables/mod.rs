//! Table modules - extend Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for a specific table group.

mod accounts;  // accounts
mod auth;      // auth_sessions
mod contacts;  // contact_list
mod evaluations; // account_evaluations
mod locations; // user_locations (+ accounts last location)
mod messages;  // messages (+ relay persistence transaction)
mod relay_log; // relay_log
mod sos;       // sos_records (+ backing emergency task)
mod tasks;     // tasks

#[cfg(test)]
pub(crate) mod test_support {
    use crate::db::Database;
    use crate::models::{Account, AccountRole, NewAccount, Sex};

    pub fn memory_db() -> Database {
        Database::new(":memory:").unwrap()
    }

    pub fn account(db: &Database, nickname: &str, phone: &str, role: AccountRole) -> Account {
        db.create_account(&NewAccount {
            nickname: nickname.to_string(),
            phone: phone.to_string(),
            sex: Sex::Woman,
            age: 70,
            role,
            avatar: String::new(),
        })
        .unwrap()
    }
}
