//! SQLite implementation of the storage interfaces.
//!
//! One [`SqliteStore`] implements every storage trait against a single
//! pool. Every write runs inside `BEGIN IMMEDIATE`, which takes SQLite's
//! write lock up front, so read-check-write sequences (quota consume,
//! conditional redeem) cannot interleave with another writer.

mod accounts;
mod reconciliation;
mod tokens;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use tracing::warn;

use super::schema::{CREATE_ACCOUNTS_TABLE, CREATE_ORPHANED_CHARGES_TABLE, CREATE_TOKENS_TABLE};
use super::{Result, StorageError};

/// SQLite-backed document store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an existing pool. Call [`init`](Self::init) before use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database file at `path`.
    pub async fn connect(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    StorageError::Unavailable(format!(
                        "cannot create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;

        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_ACCOUNTS_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_TOKENS_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_ORPHANED_CHARGES_TABLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn begin(&self) -> Result<ImmediateTransaction> {
        ImmediateTransaction::begin(&self.pool).await
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// A `BEGIN IMMEDIATE` transaction on a pooled connection.
///
/// Dropping it without `commit` or `rollback` (an error path, or the
/// future being cancelled by a timeout) closes the connection instead of
/// returning it to the pool, and SQLite discards the open transaction.
struct ImmediateTransaction {
    conn: PoolConnection<Sqlite>,
    finished: bool,
}

impl ImmediateTransaction {
    async fn begin(pool: &SqlitePool) -> Result<Self> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Self {
            conn,
            finished: false,
        })
    }

    fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    async fn commit(mut self) -> Result<()> {
        sqlx::query("COMMIT").execute(&mut *self.conn).await?;
        self.finished = true;
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        sqlx::query("ROLLBACK").execute(&mut *self.conn).await?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for ImmediateTransaction {
    fn drop(&mut self) {
        if !self.finished {
            warn!("SQLite transaction dropped before commit, discarding connection");
            self.conn.close_on_drop();
        }
    }
}

// ============================================================================
// Column codecs
// ============================================================================

/// Timestamps are stored as fixed-width RFC 3339 UTC strings so that text
/// ordering matches time ordering.
fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidTimestamp(format!("{}: {}", raw, e)))
}

/// Drop precision the column cannot hold, so a returned record equals
/// what a later read produces.
fn stored_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

fn decode_count(raw: i64) -> Result<u32> {
    u32::try_from(raw)
        .map_err(|_| StorageError::InvalidRecord(format!("counter out of range: {}", raw)))
}
