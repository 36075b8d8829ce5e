//! Persistent response cache with TTL expiry
//!
//! Memoizes upstream AdSense API results in a SQLite store. Cache keys are
//! computed from `operation:params_hash` where `params_hash` is the SHA-256
//! digest of the canonical JSON parameters, so structurally identical
//! parameters for the same operation collide and different operations never
//! do.
//!
//! Expiry is lazy on read: `get` ignores expired rows without deleting
//! them, and physical removal happens only in `clear_expired` (the serve
//! loop runs it on an interval). A write with an existing key fully
//! replaces the prior entry.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{Error, Result};

/// SQLite-backed response cache. One instance per process; the connection
/// is serialized behind a mutex so each get/set is a single atomic
/// statement.
pub struct CacheStore {
    conn: Mutex<Connection>,
}

/// Read-only diagnostic snapshot of the store.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    /// Number of rows in the response cache, expired included
    pub total_entries: u64,
    /// Approximate byte count of serialized payloads
    pub total_size: u64,
    /// Rows past their expiry that have not been swept yet
    pub expired_count: u64,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS report_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cache_key TEXT NOT NULL UNIQUE,
    account_id TEXT NOT NULL,
    query_hash TEXT NOT NULL,
    response_data TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_report_cache_key ON report_cache(cache_key);
CREATE INDEX IF NOT EXISTS idx_report_cache_expires ON report_cache(expires_at);

CREATE TABLE IF NOT EXISTS accounts_cache (
    account_id TEXT PRIMARY KEY,
    account_data TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS query_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    query_params TEXT NOT NULL,
    executed_at INTEGER NOT NULL,
    response_time_ms INTEGER NOT NULL
);
";

impl CacheStore {
    /// Open (or create) the cache database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an ephemeral in-memory store (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Build the cache key for an operation and its parameters.
    ///
    /// The key format is `{operation}:{params_hash}`. The hash is computed
    /// over the parameter structure as given; callers must supply
    /// parameters in a consistent shape for hits to occur.
    #[must_use]
    pub fn fingerprint(operation: &str, params: &Value) -> String {
        format!("{operation}:{}", Self::hash_params(params))
    }

    fn hash_params(params: &Value) -> String {
        let canonical = serde_json::to_string(params).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up a cached payload. Returns `None` on a miss or when the
    /// entry has expired; the expired row is left in place for the sweep.
    pub fn get(&self, operation: &str, params: &Value) -> Result<Option<Value>> {
        let key = Self::fingerprint(operation, params);
        let conn = self.conn.lock();

        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT response_data, expires_at FROM report_cache WHERE cache_key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((data, expires_at)) if now_millis() < expires_at => {
                debug!(operation, "cache hit");
                Ok(Some(serde_json::from_str(&data)?))
            }
            Some(_) => {
                debug!(operation, "cache expired");
                Ok(None)
            }
            None => {
                debug!(operation, "cache miss");
                Ok(None)
            }
        }
    }

    /// Store a payload under `(operation, params)` with the given TTL,
    /// replacing any prior entry for the same key.
    pub fn set(
        &self,
        operation: &str,
        params: &Value,
        payload: &Value,
        ttl: Duration,
        account_id: &str,
    ) -> Result<()> {
        let key = Self::fingerprint(operation, params);
        let hash = Self::hash_params(params);
        let data = serde_json::to_string(payload)?;
        let now = now_millis();
        let expires_at = now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO report_cache
                 (cache_key, account_id, query_hash, response_data, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(cache_key) DO UPDATE SET
                 account_id = excluded.account_id,
                 query_hash = excluded.query_hash,
                 response_data = excluded.response_data,
                 created_at = excluded.created_at,
                 expires_at = excluded.expires_at",
            params![key, account_id, hash, data, now, expires_at],
        )?;
        Ok(())
    }

    /// Delete all expired entries. Returns the number removed. Idempotent.
    pub fn clear_expired(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM report_cache WHERE expires_at < ?1",
            params![now_millis()],
        )?;
        Ok(removed)
    }

    /// Delete all entries tagged with `account_id`, expired or not.
    /// Returns the number removed.
    pub fn clear_account(&self, account_id: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM report_cache WHERE account_id = ?1",
            params![account_id],
        )?;
        Ok(removed)
    }

    /// Wipe all cached entries unconditionally.
    pub fn clear_all(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM report_cache", [])?;
        Ok(())
    }

    /// Diagnostic snapshot of the store.
    pub fn stats(&self) -> Result<CacheStats> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(LENGTH(response_data)), 0),
                    COALESCE(SUM(expires_at < ?1), 0)
             FROM report_cache",
            params![now_millis()],
            |row| {
                Ok(CacheStats {
                    total_entries: row.get::<_, i64>(0)?.unsigned_abs(),
                    total_size: row.get::<_, i64>(1)?.unsigned_abs(),
                    expired_count: row.get::<_, i64>(2)?.unsigned_abs(),
                })
            },
        )
        .map_err(Error::from)
    }

    /// Append an analytics row for a completed upstream call.
    pub fn record_query(
        &self,
        account_id: &str,
        tool_name: &str,
        query_params: &Value,
        response_time: Duration,
    ) -> Result<()> {
        let params_json = serde_json::to_string(query_params)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO query_history
                 (account_id, tool_name, query_params, executed_at, response_time_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                account_id,
                tool_name,
                params_json,
                now_millis(),
                i64::try_from(response_time.as_millis()).unwrap_or(i64::MAX)
            ],
        )?;
        Ok(())
    }

    #[cfg(test)]
    fn query_history_len(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM query_history", [], |row| row.get(0))
            .map_err(Error::from)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
