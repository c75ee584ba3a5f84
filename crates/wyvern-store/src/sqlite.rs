use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use wyvern_core::error::{Result, WyvernError};
use wyvern_core::id::prefixed_id;
use wyvern_core::traits::Store;
use wyvern_core::types::{FlapId, FlapRecord, FlapState, SoarId, SoarRecord};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS soars (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        root_ids TEXT NOT NULL,
        tick_count INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS flaps (
        id TEXT PRIMARY KEY,
        soar_id TEXT NOT NULL,
        conf_name TEXT NOT NULL,
        prev_ids TEXT NOT NULL,
        next_ids TEXT NOT NULL,
        state TEXT NOT NULL,
        start TEXT NOT NULL,
        next_awake_time TEXT,
        attempt_retry_count INTEGER NOT NULL DEFAULT 0,
        plugin TEXT NOT NULL,
        plugin_config TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_flaps_soar ON flaps(soar_id);

    CREATE TABLE IF NOT EXISTS id_sequence (
        name TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    );";

const FLAP_COLUMNS: &str = "id, conf_name, prev_ids, next_ids, state, start, next_awake_time, \
                            attempt_retry_count, plugin, plugin_config";

fn db_err(e: impl std::fmt::Display) -> WyvernError {
    WyvernError::Store(e.to_string())
}

/// SQLite-backed store. IDs are base58 encodings of a persisted sequence,
/// prefixed `S` for soars and `F` for flaps.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| db_err(format!("Failed to create db directory: {}", e)))?;
            }
        }

        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn next_id(&self, sequence: &str, prefix: &str) -> Result<String> {
        let conn = self.conn.lock().map_err(db_err)?;
        let value: i64 = conn
            .query_row(
                "INSERT INTO id_sequence (name, value) VALUES (?1, 1)
                 ON CONFLICT(name) DO UPDATE SET value = value + 1
                 RETURNING value",
                params![sequence],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        let seq = u64::try_from(value).map_err(db_err)?;
        Ok(prefixed_id(prefix, seq))
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn flap_from_row(row: &Row<'_>) -> rusqlite::Result<FlapRecord> {
    let state: String = row.get(4)?;
    let start: String = row.get(5)?;
    let next_awake: Option<String> = row.get(6)?;
    let prev_ids: String = row.get(2)?;
    let next_ids: String = row.get(3)?;
    let plugin_config: String = row.get(9)?;

    Ok(FlapRecord {
        id: FlapId(row.get(0)?),
        conf_name: row.get(1)?,
        prev_ids: parse_json(&prev_ids)?,
        next_ids: parse_json(&next_ids)?,
        state: state.parse::<FlapState>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
        })?,
        start: parse_time(&start)?,
        next_awake_time: next_awake.as_deref().map(parse_time).transpose()?,
        attempt_retry_count: row.get(7)?,
        plugin: row.get(8)?,
        plugin_config: parse_json(&plugin_config)?,
    })
}

impl Store for SqliteStore {
    fn make_soar_id(&self) -> Result<SoarId> {
        self.next_id("soar", "S").map(SoarId)
    }

    fn make_flap_id(&self) -> Result<FlapId> {
        self.next_id("flap", "F").map(FlapId)
    }

    fn save_soar(&self, soar: &SoarRecord) -> Result<()> {
        let root_ids = to_json(&soar.root_ids)?;
        let tick_count = i64::try_from(soar.tick_count).map_err(db_err)?;
        let conn = self.conn.lock().map_err(db_err)?;
        conn.execute(
            "INSERT INTO soars (id, name, root_ids, tick_count) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                root_ids = excluded.root_ids,
                tick_count = excluded.tick_count",
            params![soar.id.as_str(), soar.name, root_ids, tick_count],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn save_flap(&self, soar: &SoarId, flap: &FlapRecord) -> Result<()> {
        let prev_ids = to_json(&flap.prev_ids)?;
        let next_ids = to_json(&flap.next_ids)?;
        let plugin_config = to_json(&flap.plugin_config)?;
        let conn = self.conn.lock().map_err(db_err)?;
        // Upsert keeps the rowid, so load order stays first-save order.
        conn.execute(
            "INSERT INTO flaps (id, soar_id, conf_name, prev_ids, next_ids, state, start,
                                next_awake_time, attempt_retry_count, plugin, plugin_config)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                soar_id = excluded.soar_id,
                conf_name = excluded.conf_name,
                prev_ids = excluded.prev_ids,
                next_ids = excluded.next_ids,
                state = excluded.state,
                start = excluded.start,
                next_awake_time = excluded.next_awake_time,
                attempt_retry_count = excluded.attempt_retry_count,
                plugin = excluded.plugin,
                plugin_config = excluded.plugin_config",
            params![
                flap.id.as_str(),
                soar.as_str(),
                flap.conf_name,
                prev_ids,
                next_ids,
                flap.state.as_str(),
                flap.start.to_rfc3339(),
                flap.next_awake_time.map(|t| t.to_rfc3339()),
                flap.attempt_retry_count,
                flap.plugin,
                plugin_config,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn load_soar(&self, id: &SoarId) -> Result<SoarRecord> {
        let conn = self.conn.lock().map_err(db_err)?;
        let row = conn
            .query_row(
                "SELECT name, root_ids, tick_count FROM soars WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    let name: String = row.get(0)?;
                    let root_ids: String = row.get(1)?;
                    let tick_count: i64 = row.get(2)?;
                    Ok((name, root_ids, tick_count))
                },
            )
            .optional()
            .map_err(db_err)?;

        let (name, root_ids, tick_count) =
            row.ok_or_else(|| WyvernError::RecordNotFound(format!("soar {}", id)))?;
        Ok(SoarRecord {
            id: id.clone(),
            name,
            root_ids: serde_json::from_str(&root_ids)?,
            tick_count: u64::try_from(tick_count).map_err(db_err)?,
        })
    }

    fn load_flap(&self, id: &FlapId) -> Result<FlapRecord> {
        let conn = self.conn.lock().map_err(db_err)?;
        conn.query_row(
            &format!("SELECT {} FROM flaps WHERE id = ?1", FLAP_COLUMNS),
            params![id.as_str()],
            flap_from_row,
        )
        .optional()
        .map_err(db_err)?
        .ok_or_else(|| WyvernError::RecordNotFound(format!("flap {}", id)))
    }

    fn load_flaps(&self, soar: &SoarId) -> Result<Vec<FlapRecord>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM soars WHERE id = ?1)",
                params![soar.as_str()],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        if !exists {
            return Err(WyvernError::RecordNotFound(format!("soar {}", soar)));
        }

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM flaps WHERE soar_id = ?1 ORDER BY rowid ASC",
                FLAP_COLUMNS
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![soar.as_str()], flap_from_row)
            .map_err(db_err)?;

        let mut flaps = Vec::new();
        for row in rows {
            flaps.push(row.map_err(db_err)?);
        }
        Ok(flaps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flap(id: FlapId, name: &str) -> FlapRecord {
        FlapRecord {
            id,
            conf_name: name.into(),
            prev_ids: vec![],
            next_ids: vec![],
            state: FlapState::Wait,
            start: Utc::now(),
            next_awake_time: None,
            attempt_retry_count: 0,
            plugin: "print".into(),
            plugin_config: serde_json::json!({"msg": name}),
        }
    }

    #[test]
    fn test_sequential_prefixed_ids() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.make_flap_id().unwrap().as_str(), "F2");
        assert_eq!(store.make_flap_id().unwrap().as_str(), "F3");
        assert_eq!(store.make_soar_id().unwrap().as_str(), "S2");
    }

    #[test]
    fn test_flap_roundtrip_preserves_state() {
        let store = SqliteStore::in_memory().unwrap();
        let sid = store.make_soar_id().unwrap();
        store
            .save_soar(&SoarRecord {
                id: sid.clone(),
                name: "demo".into(),
                root_ids: vec![FlapId::from("F2")],
                tick_count: 0,
            })
            .unwrap();

        let a = store.make_flap_id().unwrap();
        let b = store.make_flap_id().unwrap();
        let mut first = flap(a.clone(), "first");
        first.next_ids = vec![b.clone()];
        let mut second = flap(b.clone(), "second");
        second.prev_ids = vec![a.clone()];
        store.save_flap(&sid, &first).unwrap();
        store.save_flap(&sid, &second).unwrap();

        let awake = Utc::now() + chrono::Duration::seconds(30);
        first.state = FlapState::ErrorRetry;
        first.attempt_retry_count = 2;
        first.next_awake_time = Some(awake);
        store.save_flap(&sid, &first).unwrap();

        let loaded = store.load_flaps(&sid).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, a);
        assert_eq!(loaded[0].state, FlapState::ErrorRetry);
        assert_eq!(loaded[0].attempt_retry_count, 2);
        assert_eq!(
            loaded[0].next_awake_time.map(|t| t.timestamp_millis()),
            Some(awake.timestamp_millis())
        );
        assert_eq!(loaded[0].next_ids, vec![b.clone()]);
        assert_eq!(loaded[1].prev_ids, vec![a]);
        assert_eq!(store.load_flap(&b).unwrap().conf_name, "second");
        assert_eq!(store.load_soar(&sid).unwrap().root_ids, vec![FlapId::from("F2")]);
    }

    #[test]
    fn test_missing_soar() {
        let store = SqliteStore::in_memory().unwrap();
        let sid = SoarId::from("S9");
        assert!(matches!(store.load_soar(&sid), Err(WyvernError::RecordNotFound(_))));
        assert!(matches!(store.load_flaps(&sid), Err(WyvernError::RecordNotFound(_))));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("wyvern.db");

        let sid = {
            let store = SqliteStore::open(&path).unwrap();
            let sid = store.make_soar_id().unwrap();
            store
                .save_soar(&SoarRecord {
                    id: sid.clone(),
                    name: "persisted".into(),
                    root_ids: vec![],
                    tick_count: 7,
                })
                .unwrap();
            sid
        };

        let store = SqliteStore::open(&path).unwrap();
        let record = store.load_soar(&sid).unwrap();
        assert_eq!(record.name, "persisted");
        assert_eq!(record.tick_count, 7);
        // The sequence continues after a restart.
        assert_ne!(store.make_soar_id().unwrap(), sid);
    }
}
