//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `users` - Accounts, roles and activation flags
//! - `tokens` - Revoked token denylist
//! - `bills` - Bill rows and parse lifecycle
//! - `catalog` - Appliance catalog
//! - `appliances` - User appliance inventory
//! - `estimates` - Per-appliance estimates for a bill
//! - `insights` - Insight reports
//! - `filters` - Dynamic WHERE/ORDER BY builders for list endpoints

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};

mod appliances;
mod bills;
mod catalog;
mod estimates;
mod filters;
mod insights;
mod tokens;
mod users;

pub use catalog::default_catalog;
pub use filters::{ApplianceFilter, BillFilter, FilterResult};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "GREENSPARK_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"greenspark-kdf-1";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Format a timestamp the way every table stores it
pub(crate) fn format_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn now_ts() -> String {
    format_ts(&Utc::now())
}

/// Parse a stored timestamp (RFC 3339, or SQLite's `YYYY-MM-DD HH:MM:SS`)
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

/// Read a TEXT column holding a UUID
pub(crate) fn uuid_col(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a TEXT column holding a `YYYY-MM-DD` date
pub(crate) fn date_col(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a TEXT column holding a JSON document
pub(crate) fn json_col(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<Option<serde_json::Value>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Whether an error is a UNIQUE or PRIMARY KEY violation
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `GREENSPARK_DB_KEY` to be set. The database is encrypted with
    /// SQLCipher using a key derived from the passphrase via Argon2.
    ///
    /// Use `new_unencrypted()` for development without encryption.
    pub fn new(path: &str) -> Result<Self> {
        let encryption_key = std::env::var(DB_KEY_ENV).ok();
        match encryption_key {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let key_pragma = match passphrase {
            Some(pass) => format!("PRAGMA key = 'x\"{}\"';", derive_key(pass)?),
            None => String::new(),
        };

        // Key (when set) must be the first statement on every connection;
        // foreign key enforcement is per-connection in SQLite
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            if !key_pragma.is_empty() {
                conn.execute_batch(&key_pragma)?;
            }
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;
            Ok(())
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throw-away database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` because every pooled
    /// connection to `:memory:` would see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "greenspark_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Cheap liveness probe used by the health endpoint
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the parse/estimate workers
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Accounts
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                username TEXT NOT NULL UNIQUE,
                hashed_password TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',          -- user, admin
                timezone TEXT NOT NULL DEFAULT 'Asia/Mumbai',
                is_active INTEGER NOT NULL DEFAULT 1,
                is_verified INTEGER NOT NULL DEFAULT 0,
                tokens_valid_from INTEGER,                  -- unix ms; tokens issued up to here rejected
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);

            -- Denylist of revoked JWT ids
            CREATE TABLE IF NOT EXISTS revoked_tokens (
                jti TEXT PRIMARY KEY,
                expires_at INTEGER NOT NULL                 -- unix seconds; purged after this
            );

            CREATE INDEX IF NOT EXISTS idx_revoked_tokens_expiry ON revoked_tokens(expires_at);

            -- Bills
            CREATE TABLE IF NOT EXISTS bills (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                billing_period_start TEXT NOT NULL,
                billing_period_end TEXT NOT NULL,
                kwh_total REAL NOT NULL,
                cost_total REAL NOT NULL,
                provider TEXT NOT NULL,
                normalized_json TEXT,                       -- JSON: normalized bill document
                parse_status TEXT NOT NULL,                 -- processing, success, failed
                source_type TEXT NOT NULL,                  -- pdf, manual
                file_uri TEXT,
                parser_version TEXT,
                checksum TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_bills_user ON bills(user_id, billing_period_start);
            CREATE INDEX IF NOT EXISTS idx_bills_status ON bills(parse_status, updated_at);

            -- Appliance catalog
            CREATE TABLE IF NOT EXISTS appliance_catalog (
                category_id TEXT PRIMARY KEY,
                label TEXT NOT NULL UNIQUE,
                icon_emoji TEXT NOT NULL,
                typical_wattage INTEGER NOT NULL
            );

            -- User appliances (names unique per user, case-insensitive)
            CREATE TABLE IF NOT EXISTS user_appliances (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                appliance_catalog_id TEXT REFERENCES appliance_catalog(category_id) ON DELETE SET NULL,
                custom_name TEXT NOT NULL COLLATE NOCASE,
                count INTEGER NOT NULL DEFAULT 1,
                custom_wattage INTEGER,
                hours_per_day REAL NOT NULL,
                days_per_week INTEGER NOT NULL,
                brand TEXT,
                model TEXT,
                star_rating TEXT,
                purchase_year INTEGER,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, custom_name)
            );

            CREATE INDEX IF NOT EXISTS idx_user_appliances_user ON user_appliances(user_id);
            CREATE INDEX IF NOT EXISTS idx_user_appliances_catalog ON user_appliances(appliance_catalog_id);

            -- Per-appliance estimates for a bill
            CREATE TABLE IF NOT EXISTS appliance_estimates (
                id TEXT PRIMARY KEY,
                bill_id TEXT NOT NULL REFERENCES bills(id) ON DELETE CASCADE,
                user_appliance_id TEXT NOT NULL REFERENCES user_appliances(id) ON DELETE CASCADE,
                estimated_kwh REAL NOT NULL,
                estimated_cost REAL NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_estimates_bill ON appliance_estimates(bill_id);

            -- Insight reports (one per bill)
            CREATE TABLE IF NOT EXISTS insights (
                id TEXT PRIMARY KEY,
                bill_id TEXT NOT NULL UNIQUE REFERENCES bills(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status TEXT NOT NULL DEFAULT 'pending',     -- pending, completed, failed
                structured_data TEXT,                       -- JSON: insight report
                generated_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_insights_user ON insights(user_id);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
