//! SQLite-backed credential store.
//!
//! One table, `accounts`, with UNIQUE columns for username and email so
//! duplicate detection happens inside the insert itself instead of a
//! check-then-write race. Timestamps are stored as RFC 3339 text.

use super::{Account, AccountUpdate, NewAccount};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::Path;
use uuid::Uuid;

/// Column list shared by every SELECT that materializes an [`Account`].
const ACCOUNT_COLUMNS: &str =
    "id, username, email, password_hash, first_name, last_name, is_active, \
     created_at, updated_at, last_login";

/// Why a store operation failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("username already in use")]
    DuplicateUsername,
    #[error("email already in use")]
    DuplicateEmail,
    #[error("account not found")]
    NotFound,
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Persistence seam for account records.
///
/// Contract for implementations: `create` assigns the id and both
/// timestamps, and its uniqueness checks are atomic with the insert;
/// `created_at` is never modified after insertion; every mutating call
/// refreshes `updated_at`.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new account. Fails with the matching duplicate error when
    /// the username or email is already taken.
    async fn create(&self, new: NewAccount, now: DateTime<Utc>) -> Result<Account, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>, StoreError>;

    /// Record a successful login at `at`; also refreshes `updated_at`.
    async fn touch_last_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Apply a partial update and return the refreshed record.
    async fn update(
        &self,
        id: &str,
        update: AccountUpdate,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError>;
}

/// SQLite-backed [`CredentialStore`].
pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    /// Open (or create) the account database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                first_name TEXT NOT NULL DEFAULT '',
                last_name TEXT NOT NULL DEFAULT '',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_login TEXT
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn find_where(&self, column: &str, value: &str) -> Result<Option<Account>, StoreError> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {column} = ?1");
        let row = conn.query_row(&sql, rusqlite::params![value], row_to_account);

        match row {
            Ok(account) => Ok(Some(account)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn create(&self, new: NewAccount, now: DateTime<Utc>) -> Result<Account, StoreError> {
        let id = Uuid::new_v4().to_string();
        let stamp = now.to_rfc3339();

        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO accounts
                (id, username, email, password_hash, first_name, last_name,
                 is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
            rusqlite::params![
                id,
                new.username,
                new.email,
                new.password_hash,
                new.first_name,
                new.last_name,
                stamp,
            ],
        );

        match result {
            Ok(_) => Ok(Account {
                id,
                username: new.username,
                email: new.email,
                password_hash: new.password_hash,
                first_name: new.first_name,
                last_name: new.last_name,
                is_active: true,
                created_at: now,
                updated_at: now,
                last_login: None,
            }),
            Err(e) => Err(duplicate_from(&e).unwrap_or_else(|| StoreError::Backend(e.to_string()))),
        }
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        self.find_where("username", username)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        self.find_where("email", email)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>, StoreError> {
        self.find_where("id", id)
    }

    async fn touch_last_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let stamp = at.to_rfc3339();
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE accounts SET last_login = ?2, updated_at = ?2 WHERE id = ?1",
                rusqlite::params![id, stamp],
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        update: AccountUpdate,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let conn = self.conn.lock();
        let result = conn.execute(
            "UPDATE accounts SET
                email = COALESCE(?2, email),
                first_name = COALESCE(?3, first_name),
                last_name = COALESCE(?4, last_name),
                is_active = COALESCE(?5, is_active),
                updated_at = ?6
             WHERE id = ?1",
            rusqlite::params![
                id,
                update.email,
                update.first_name,
                update.last_name,
                update.is_active,
                now.to_rfc3339(),
            ],
        );

        let changed = match result {
            Ok(n) => n,
            Err(e) => {
                return Err(
                    duplicate_from(&e).unwrap_or_else(|| StoreError::Backend(e.to_string()))
                );
            }
        };
        if changed == 0 {
            return Err(StoreError::NotFound);
        }

        // Re-read under the same lock so the returned record is exact.
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1");
        conn.query_row(&sql, rusqlite::params![id], row_to_account)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

/// Map a UNIQUE-constraint failure to the duplicate it represents.
fn duplicate_from(err: &rusqlite::Error) -> Option<StoreError> {
    if let rusqlite::Error::SqliteFailure(code, Some(msg)) = err {
        if code.code == rusqlite::ErrorCode::ConstraintViolation {
            if msg.contains("accounts.username") {
                return Some(StoreError::DuplicateUsername);
            }
            if msg.contains("accounts.email") {
                return Some(StoreError::DuplicateEmail);
            }
        }
    }
    None
}

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        is_active: row.get(6)?,
        created_at: parse_timestamp(7, row.get::<_, String>(7)?)?,
        updated_at: parse_timestamp(8, row.get::<_, String>(8)?)?,
        last_login: match row.get::<_, Option<String>>(9)? {
            Some(raw) => Some(parse_timestamp(9, raw)?),
            None => None,
        },
    })
}

fn parse_timestamp(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

// ── Tests ───────────────────────────────────────────────────────────
