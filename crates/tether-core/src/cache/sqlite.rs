//! SQLite cache backend.
//!
//! One table, uuid-keyed, JSON snapshot per row. Runtime defaults follow the
//! usual conservative setup:
//! - `journal_mode = WAL` to allow concurrent readers while writers append
//! - `busy_timeout = 5s` to reduce transient lock failures under contention
//! - `foreign_keys = ON` for consistency with sibling databases
//!
//! Two processes may race to write the same uuid; the schema takes the last
//! write, and a torn or stale row is healed by the calculator's
//! recomputation path on the next read.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};

use crate::cache::{CacheError, DependencyCache, WrapperSnapshot};
use crate::entity::EntityUuid;

/// Busy timeout used for cache connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS dependency_cache (
    uuid TEXT PRIMARY KEY,
    snapshot TEXT NOT NULL,
    updated_at_us INTEGER NOT NULL
)";

/// SQLite-backed [`DependencyCache`].
#[derive(Debug)]
pub struct SqliteCache {
    conn: Connection,
}

impl SqliteCache {
    /// Open (or create) the cache database, apply runtime pragmas, and
    /// ensure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if opening or configuring the database
    /// fails.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::Io(format!("create cache directory: {e}")))?;
        }

        let conn = Connection::open(path)?;
        configure_connection(&conn)?;
        conn.execute(SCHEMA, [])?;
        Ok(Self { conn })
    }

    fn decode(uuid: &EntityUuid, raw: &str) -> Result<WrapperSnapshot, CacheError> {
        serde_json::from_str(raw).map_err(|e| CacheError::Corrupted {
            uuid: uuid.clone(),
            message: e.to_string(),
        })
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

fn now_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
}

impl From<rusqlite::Error> for CacheError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl DependencyCache for SqliteCache {
    fn get(&self, uuid: &EntityUuid) -> Result<Option<WrapperSnapshot>, CacheError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT snapshot FROM dependency_cache WHERE uuid = ?1",
                params![uuid.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|raw| Self::decode(uuid, &raw)).transpose()
    }

    fn get_multiple(
        &self,
        uuids: &[EntityUuid],
    ) -> Result<BTreeMap<EntityUuid, WrapperSnapshot>, CacheError> {
        let mut found = BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT snapshot FROM dependency_cache WHERE uuid = ?1")?;
        for uuid in uuids {
            let raw: Option<String> = stmt
                .query_row(params![uuid.as_str()], |row| row.get(0))
                .optional()?;
            if let Some(raw) = raw {
                found.insert(uuid.clone(), Self::decode(uuid, &raw)?);
            }
        }
        Ok(found)
    }

    fn set(&self, uuid: &EntityUuid, snapshot: &WrapperSnapshot) -> Result<(), CacheError> {
        let raw = serde_json::to_string(snapshot).map_err(|e| CacheError::Io(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO dependency_cache (uuid, snapshot, updated_at_us)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(uuid) DO UPDATE SET
                 snapshot = excluded.snapshot,
                 updated_at_us = excluded.updated_at_us",
            params![uuid.as_str(), raw, now_us()],
        )?;
        Ok(())
    }

    fn delete_all_permanent(&self) -> Result<(), CacheError> {
        self.conn.execute("DELETE FROM dependency_cache", [])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn temp_cache_path() -> (TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("tether-cache.sqlite3");
        (dir, path)
    }

    fn snapshot(uuid: &str) -> WrapperSnapshot {
        WrapperSnapshot {
            entity_type_id: "node".into(),
            id: "1".into(),
            uuid: EntityUuid::new_unchecked(uuid),
            hash: "blake3:aa".into(),
            dependencies: BTreeMap::new(),
            child_dependencies: BTreeMap::new(),
            modules: BTreeSet::from(["node".to_string()]),
            additional_processing: false,
        }
    }

    #[test]
    fn open_sets_wal_and_busy_timeout() {
        let (_dir, path) = temp_cache_path();
        let cache = SqliteCache::open(&path).expect("open cache");

        let journal_mode: String = cache
            .conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("query journal_mode");
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: u64 = cache
            .conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("query busy_timeout");
        assert_eq!(
            u128::from(busy_timeout_ms),
            DEFAULT_BUSY_TIMEOUT.as_millis()
        );
    }

    #[test]
    fn round_trip_survives_reopen() {
        let (_dir, path) = temp_cache_path();
        let snap = snapshot("u1");
        {
            let cache = SqliteCache::open(&path).expect("open cache");
            cache.set(&snap.uuid.clone(), &snap).expect("set");
        }
        let cache = SqliteCache::open(&path).expect("reopen cache");
        assert_eq!(cache.get(&snap.uuid).expect("get"), Some(snap));
    }

    #[test]
    fn set_replaces_previous_entry() {
        let (_dir, path) = temp_cache_path();
        let cache = SqliteCache::open(&path).expect("open cache");

        let mut snap = snapshot("u1");
        cache.set(&snap.uuid.clone(), &snap).expect("first set");
        snap.hash = "blake3:bb".into();
        cache.set(&snap.uuid.clone(), &snap).expect("second set");

        let stored = cache.get(&snap.uuid).expect("get").expect("present");
        assert_eq!(stored.hash, "blake3:bb");
    }

    #[test]
    fn get_multiple_omits_misses() {
        let (_dir, path) = temp_cache_path();
        let cache = SqliteCache::open(&path).expect("open cache");
        let snap = snapshot("u1");
        cache.set(&snap.uuid.clone(), &snap).expect("set");

        let found = cache
            .get_multiple(&[snap.uuid.clone(), EntityUuid::new_unchecked("u404")])
            .expect("bulk get");
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&snap.uuid));
    }

    #[test]
    fn delete_all_permanent_empties_the_table() {
        let (_dir, path) = temp_cache_path();
        let cache = SqliteCache::open(&path).expect("open cache");
        cache
            .set(&EntityUuid::new_unchecked("u1"), &snapshot("u1"))
            .expect("set u1");
        cache
            .set(&EntityUuid::new_unchecked("u2"), &snapshot("u2"))
            .expect("set u2");

        cache.delete_all_permanent().expect("clear");
        let remaining: i64 = cache
            .conn
            .query_row("SELECT COUNT(*) FROM dependency_cache", [], |row| {
                row.get(0)
            })
            .expect("count");
        assert_eq!(remaining, 0);
    }

    #[test]
    fn corrupted_row_reports_corruption() {
        let (_dir, path) = temp_cache_path();
        let cache = SqliteCache::open(&path).expect("open cache");
        cache
            .conn
            .execute(
                "INSERT INTO dependency_cache (uuid, snapshot, updated_at_us)
                 VALUES ('u1', 'not json', 0)",
                [],
            )
            .expect("insert bad row");

        let err = cache
            .get(&EntityUuid::new_unchecked("u1"))
            .expect_err("corrupt entry should error");
        assert_eq!(err.code(), crate::error::ErrorCode::CacheCorrupted);
    }
}
