//! SQLite scan cache backend.

use super::{CachedComparison, PairKey, ScanCacheBackend};
use crate::core::registry::RecordId;
use crate::error::CacheError;
use rusqlite::{params, Connection, ErrorCode};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// SQLite-backed scan cache
///
/// Uses WAL (Write-Ahead Logging) mode. The whole table is rewritten inside
/// one transaction, so readers see either the previous or the new cache.
pub struct SqliteCacheBackend {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteCacheBackend {
    /// Open or create a cache database at the given path
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::OpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let conn = Connection::open(path).map_err(|e| CacheError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| map_sqlite_error(path, e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS comparisons (
                first_id TEXT NOT NULL,
                second_id TEXT NOT NULL,
                mismatch_percentage REAL NOT NULL,
                PRIMARY KEY (first_id, second_id)
            )",
            [],
        )
        .map_err(|e| map_sqlite_error(path, e))?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    fn parse_id(&self, raw: &str) -> Result<RecordId, CacheError> {
        Uuid::parse_str(raw)
            .map(RecordId::from_uuid)
            .map_err(|e| CacheError::Corrupted {
                path: self.db_path.clone(),
                reason: format!("invalid record id {:?}: {}", raw, e),
            })
    }
}

/// A file that is not a database is corruption, not a query failure
fn map_sqlite_error(path: &Path, error: rusqlite::Error) -> CacheError {
    match error {
        rusqlite::Error::SqliteFailure(ref failure, _)
            if matches!(failure.code, ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt) =>
        {
            CacheError::Corrupted {
                path: path.to_path_buf(),
                reason: error.to_string(),
            }
        }
        other => CacheError::QueryFailed(other.to_string()),
    }
}

impl ScanCacheBackend for SqliteCacheBackend {
    fn load(&self) -> Result<Vec<CachedComparison>, CacheError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CacheError::QueryFailed("scan cache lock poisoned".to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT first_id, second_id, mismatch_percentage
                 FROM comparisons ORDER BY first_id, second_id",
            )
            .map_err(|e| map_sqlite_error(&self.db_path, e))?;

        let rows: Vec<(String, String, f64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .map_err(|e| map_sqlite_error(&self.db_path, e))?
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlite_error(&self.db_path, e))?;

        rows.into_iter()
            .map(|(first, second, mismatch)| {
                let key = PairKey::try_new(self.parse_id(&first)?, self.parse_id(&second)?)
                    .ok_or_else(|| CacheError::Corrupted {
                        path: self.db_path.clone(),
                        reason: format!("pair key names record {} twice", first),
                    })?;
                Ok(CachedComparison::new(key, mismatch))
            })
            .collect()
    }

    fn save(&self, entries: &[CachedComparison]) -> Result<(), CacheError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| CacheError::QueryFailed("scan cache lock poisoned".to_string()))?;

        let tx = conn
            .transaction()
            .map_err(|e| map_sqlite_error(&self.db_path, e))?;

        tx.execute("DELETE FROM comparisons", [])
            .map_err(|e| CacheError::QueryFailed(e.to_string()))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO comparisons (first_id, second_id, mismatch_percentage)
                     VALUES (?, ?, ?)",
                )
                .map_err(|e| CacheError::QueryFailed(e.to_string()))?;

            for entry in entries {
                let (first, second) = entry.pair_key.ids();
                stmt.execute(params![
                    first.to_string(),
                    second.to_string(),
                    entry.mismatch_percentage,
                ])
                .map_err(|e| CacheError::QueryFailed(e.to_string()))?;
            }
        }

        tx.commit()
            .map_err(|e| CacheError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    fn location(&self) -> &Path {
        &self.db_path
    }
}
