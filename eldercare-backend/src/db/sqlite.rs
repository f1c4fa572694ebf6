//! SQLite database - schema definitions and connection management
//!
//! This file contains:
//! - Database struct definition
//! - Connection management (new, init)
//! - Schema creation
//!
//! All table operations are in the tables/ subdirectory.

use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;
use std::time::Duration;

/// Main database wrapper, one connection serialized behind a Mutex
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database and initialize the schema.
    /// `:memory:` gives a private in-memory database.
    pub fn new(database_url: &str) -> SqliteResult<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(database_url).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    log::warn!("Could not create database directory {:?}: {}", parent, e);
                }
            }
        }

        let conn = Connection::open(database_url)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        if database_url != ":memory:" {
            // journal_mode returns a row, so it can't go through execute()
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        }

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Create all tables and indexes
    fn init(&self) -> SqliteResult<()> {
        let conn = self.conn();

        // Accounts - elderly users, family members and volunteers
        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nickname TEXT NOT NULL,
                avatar TEXT NOT NULL DEFAULT '',
                sex INTEGER NOT NULL DEFAULT 0,
                phone TEXT UNIQUE NOT NULL,
                age INTEGER NOT NULL DEFAULT 0,
                role TEXT NOT NULL DEFAULT 'user',
                latitude REAL,
                longitude REAL,
                address TEXT NOT NULL DEFAULT '',
                last_location_update TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // Running rating per account, created with the account
        conn.execute(
            "CREATE TABLE IF NOT EXISTS account_evaluations (
                account_id INTEGER PRIMARY KEY REFERENCES accounts(id) ON DELETE CASCADE,
                score INTEGER NOT NULL DEFAULT 0,
                assign_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // Opaque bearer tokens
        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token TEXT UNIQUE NOT NULL,
                account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )",
            [],
        )?;

        // Chat messages - id is assigned before relay, never by SQLite
        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY,
                time TEXT NOT NULL,
                from_id INTEGER NOT NULL,
                to_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                kind TEXT NOT NULL DEFAULT 'text'
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_from_to ON messages(from_id, to_id)",
            [],
        )?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_messages_time ON messages(time)", [])?;

        // Directed contact rows, one per (owner, counterpart)
        conn.execute(
            "CREATE TABLE IF NOT EXISTS contact_list (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                contact_id INTEGER NOT NULL,
                last_chat_time TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(account_id, contact_id)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_contact_list_recency ON contact_list(account_id, last_chat_time)",
            [],
        )?;

        // Durable relay log between the fan-out loop and the persistence consumer
        conn.execute(
            "CREATE TABLE IF NOT EXISTS relay_log (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                message_id INTEGER NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_relay_log_status ON relay_log(topic, status, seq)",
            [],
        )?;

        // Help requests
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                creator_id INTEGER NOT NULL REFERENCES accounts(id),
                assignee_id INTEGER REFERENCES accounts(id),
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'other',
                status TEXT NOT NULL DEFAULT 'pending',
                reward REAL NOT NULL DEFAULT 0,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                address TEXT NOT NULL,
                deadline TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status, category)", [])?;

        // Emergency requests, each backed by an emergency task
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sos_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES accounts(id),
                task_id INTEGER NOT NULL REFERENCES tasks(id),
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                address TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                severity TEXT NOT NULL DEFAULT 'high',
                status TEXT NOT NULL DEFAULT 'pending',
                timeout_at TEXT NOT NULL,
                resolved_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sos_records_user ON sos_records(user_id, status)",
            [],
        )?;

        // Location history
        conn.execute(
            "CREATE TABLE IF NOT EXISTS user_locations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                address TEXT NOT NULL DEFAULT '',
                accuracy REAL NOT NULL DEFAULT 0,
                speed REAL NOT NULL DEFAULT 0,
                heading REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_user_locations_account ON user_locations(account_id, created_at)",
            [],
        )?;

        Ok(())
    }
}
