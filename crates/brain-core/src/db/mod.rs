//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `slots` - Keyed JSON payload slots (the brain snapshot lives in one)
//! - `runs` - Evolution run history

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};

mod runs;
mod slots;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Passphrase variable for the SQLCipher key
pub const DB_KEY_ENV: &str = "BRAIN_DB_KEY";

/// Connections kept open per database
const POOL_SIZE: u32 = 4;

/// Salt mixed into every key derivation. The key depends on the passphrase
/// alone, so a snapshot database can be copied anywhere and still opens.
/// Changing it locks out every existing encrypted brain.
const KEY_SALT: &[u8; 16] = b"brain-salt-v1-fx";

/// `PRAGMA key` statement for a passphrase, raw key hex from Argon2id
fn key_pragma(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    let salt = SaltString::encode_b64(KEY_SALT)
        .map_err(|e| Error::Encryption(format!("Invalid key salt: {}", e)))?;
    let hash = Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Key derivation failed: {}", e)))?;
    let output = hash
        .hash
        .ok_or_else(|| Error::Encryption("Key derivation produced no output".to_string()))?;

    Ok(format!("PRAGMA key = 'x\"{}\"';", hex::encode(output.as_bytes())))
}

/// `CURRENT_TIMESTAMP` column value as UTC; unreadable values map to now
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Pooled handle to the brain database
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    db_path: String,
}

impl Database {
    /// Open the encrypted database keyed by `BRAIN_DB_KEY`
    pub fn new(path: &str) -> Result<Self> {
        let passphrase = std::env::var(DB_KEY_ENV).map_err(|_| {
            Error::Encryption(format!(
                "{} is not set. Export a passphrase to open the encrypted brain, \
                or pass --no-encrypt for a plain database.",
                DB_KEY_ENV
            ))
        })?;
        Self::new_with_key(path, Some(&passphrase))
    }

    /// Open a plain SQLite database
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Open with an explicit passphrase; `None` leaves the file unencrypted
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let manager = match passphrase {
            Some(passphrase) => {
                let pragma = key_pragma(passphrase)?;
                manager.with_init(move |conn| conn.execute_batch(&pragma))
            }
            None => manager,
        };

        let db = Self {
            pool: Pool::builder().max_size(POOL_SIZE).build(manager)?,
            db_path: path.to_string(),
        };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Fresh unencrypted database in the temp dir, unique per call
    ///
    /// File backed: SQLCipher pools cannot share a `:memory:` database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);

        let name = format!(
            "brain_{}_{}.db",
            std::process::id(),
            NEXT_ID.fetch_add(1, Ordering::SeqCst)
        );
        let path = std::env::temp_dir().join(name).to_string_lossy().into_owned();
        // A leftover file from an earlier process with the same pid
        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            -- Keyed JSON payloads; one row per slot
            CREATE TABLE IF NOT EXISTS brain_slots (
                slot_key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- One row per evolve call recorded by a host
            CREATE TABLE IF NOT EXISTS evolution_runs (
                id INTEGER PRIMARY KEY,
                reason TEXT NOT NULL,                  -- uninitialized, insufficient-data, no-new-data, trained
                trained BOOLEAN NOT NULL DEFAULT 0,
                epochs_run INTEGER NOT NULL DEFAULT 0,
                sample_count INTEGER NOT NULL DEFAULT 0,
                months_analyzed INTEGER NOT NULL DEFAULT 0,
                average_loss REAL,
                fingerprint TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_evolution_runs_created ON evolution_runs(created_at);
            "#,
        )?;

        info!(path = %self.db_path, "Brain database ready");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
