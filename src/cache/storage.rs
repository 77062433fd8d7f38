//! SQLite implementations of the record store and the asset cache.
//!
//! Both stores may point at the same database file. Each one keeps its own
//! connection, opened lazily on first use, so constructing a store never
//! touches the disk and `open()` is just "use the connection once".

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use super::traits::{AssetCache, RecordStore};
use crate::error::{Result, WorkerError};
use crate::http::Response;

/// Connection that is opened (and initialized) on first use.
struct LazyConnection {
  path: PathBuf,
  conn: Mutex<Option<Connection>>,
}

impl LazyConnection {
  fn new(path: &Path) -> Self {
    Self {
      path: path.to_path_buf(),
      conn: Mutex::new(None),
    }
  }

  /// Run `f` against the connection, opening it first if needed.
  ///
  /// `init` runs right after a successful open. If it fails the connection
  /// is dropped and the next call tries again.
  fn with<T>(
    &self,
    init: impl FnOnce(&Connection) -> Result<()>,
    f: impl FnOnce(&Connection) -> Result<T>,
  ) -> Result<T> {
    let mut guard = self
      .conn
      .lock()
      .map_err(|e| WorkerError::Store(format!("Lock poisoned: {}", e)))?;

    if guard.is_none() {
      let conn = connect(&self.path)?;
      init(&conn)?;
      *guard = Some(conn);
    }

    match guard.as_ref() {
      Some(conn) => f(conn),
      None => Err(WorkerError::StoreUnavailable(format!(
        "No connection to {}",
        self.path.display()
      ))),
    }
  }
}

fn connect(path: &Path) -> Result<Connection> {
  // Ensure parent directory exists
  if let Some(parent) = path.parent() {
    if !parent.as_os_str().is_empty() {
      std::fs::create_dir_all(parent).map_err(|e| {
        WorkerError::StoreUnavailable(format!("Failed to create cache directory: {}", e))
      })?;
    }
  }

  let conn = Connection::open(path).map_err(|e| {
    WorkerError::StoreUnavailable(format!(
      "Failed to open cache database at {}: {}",
      path.display(),
      e
    ))
  })?;

  // Record store and asset cache hold separate connections to one file
  conn
    .busy_timeout(Duration::from_secs(5))
    .map_err(|e| WorkerError::StoreUnavailable(format!("Failed to set busy timeout: {}", e)))?;

  Ok(conn)
}

fn store_err(context: &str, e: impl std::fmt::Display) -> WorkerError {
  WorkerError::Store(format!("{}: {}", context, e))
}

// ============================================================================
// Record store
// ============================================================================

const RECORD_SCHEMA: &str = r#"
-- One row per named record store and the version it was last upgraded to
CREATE TABLE IF NOT EXISTS record_stores (
    name TEXT PRIMARY KEY,
    version INTEGER NOT NULL,
    upgraded_at TEXT NOT NULL
);

-- JSON payloads keyed by resource id
CREATE TABLE IF NOT EXISTS records (
    store TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL,
    stored_at TEXT NOT NULL
);
"#;

/// The keyed index. Rebuilt whenever the store version goes up.
const RECORD_INDEX: &str = r#"
DROP INDEX IF EXISTS records_by_id;
CREATE UNIQUE INDEX records_by_id ON records(store, id);
"#;

/// Named, versioned record store in a SQLite file.
pub struct SqliteRecordStore {
  conn: LazyConnection,
  name: String,
  version: u32,
}

impl SqliteRecordStore {
  pub fn new(path: &Path, name: &str, version: u32) -> Self {
    Self {
      conn: LazyConnection::new(path),
      name: name.to_string(),
      version,
    }
  }

  fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    self
      .conn
      .with(|conn| upgrade_records(conn, &self.name, self.version), f)
  }

}

#[cfg(test)]
impl SqliteRecordStore {
  /// Version currently recorded on disk for this store.
  pub fn stored_version(&self) -> Result<u32> {
    self.with_conn(|conn| current_version(conn, &self.name))
  }
}

fn current_version(conn: &Connection, name: &str) -> Result<u32> {
  let version: Option<u32> = conn
    .query_row(
      "SELECT version FROM record_stores WHERE name = ?1",
      params![name],
      |row| row.get(0),
    )
    .optional()
    .map_err(|e| store_err("Failed to read record store version", e))?;

  Ok(version.unwrap_or(0))
}

/// Bring the named store up to `version`, creating it on first open.
fn upgrade_records(conn: &Connection, name: &str, version: u32) -> Result<()> {
  conn.execute_batch(RECORD_SCHEMA).map_err(|e| {
    WorkerError::StoreUnavailable(format!("Failed to create record tables: {}", e))
  })?;

  let current = current_version(conn, name)?;

  if current > version {
    return Err(WorkerError::StoreUnavailable(format!(
      "Record store {} is at version {}, newer than {}",
      name, current, version
    )));
  }

  if current < version {
    info!(store = name, from = current, to = version, "Upgrading record store");

    conn.execute_batch(RECORD_INDEX).map_err(|e| {
      WorkerError::StoreUnavailable(format!("Failed to build record index: {}", e))
    })?;

    conn
      .execute(
        "INSERT OR REPLACE INTO record_stores (name, version, upgraded_at) VALUES (?1, ?2, ?3)",
        params![name, version, Utc::now().to_rfc3339()],
      )
      .map_err(|e| {
        WorkerError::StoreUnavailable(format!("Failed to record store version: {}", e))
      })?;
  }

  Ok(())
}

impl RecordStore for SqliteRecordStore {
  fn open(&self) -> Result<()> {
    self.with_conn(|_| Ok(()))
  }

  fn get(&self, id: &str) -> Result<Option<Value>> {
    let raw: Option<String> = self.with_conn(|conn| {
      conn
        .query_row(
          "SELECT data FROM records WHERE store = ?1 AND id = ?2",
          params![self.name, id],
          |row| row.get(0),
        )
        .optional()
        .map_err(|e| store_err("Failed to read record", e))
    })?;

    raw
      .map(|data| serde_json::from_str(&data).map_err(|e| store_err("Corrupt record", e)))
      .transpose()
  }

  fn put(&self, id: &str, data: &Value) -> Result<()> {
    self.with_conn(|conn| {
      conn
        .execute(
          "INSERT OR REPLACE INTO records (store, id, data, stored_at) VALUES (?1, ?2, ?3, ?4)",
          params![self.name, id, data.to_string(), Utc::now().to_rfc3339()],
        )
        .map_err(|e| store_err("Failed to write record", e))?;
      Ok(())
    })?;

    debug!(store = %self.name, id, "Stored record");
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    self.with_conn(|conn| {
      conn
        .execute("DELETE FROM records WHERE store = ?1", params![self.name])
        .map_err(|e| store_err("Failed to clear records", e))?;
      Ok(())
    })
  }
}

// ============================================================================
// Asset cache
// ============================================================================

const ASSET_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS asset_cache (
    cache_name TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    request_key TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL,
    PRIMARY KEY (cache_name, key_hash)
);
"#;

/// Named response cache in a SQLite file.
pub struct SqliteAssetCache {
  conn: LazyConnection,
  name: String,
}

impl SqliteAssetCache {
  pub fn new(path: &Path, name: &str) -> Self {
    Self {
      conn: LazyConnection::new(path),
      name: name.to_string(),
    }
  }

  fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    self.conn.with(
      |conn| {
        conn.execute_batch(ASSET_SCHEMA).map_err(|e| {
          WorkerError::StoreUnavailable(format!("Failed to create asset cache table: {}", e))
        })
      },
      f,
    )
  }
}

/// SHA256 hash for stable, fixed-length keys
fn hash_key(key: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(key.as_bytes());
  hex::encode(hasher.finalize())
}

impl AssetCache for SqliteAssetCache {
  fn open(&self) -> Result<()> {
    self.with_conn(|_| Ok(()))
  }

  fn lookup(&self, key: &str) -> Result<Option<Response>> {
    let row: Option<(u16, String, String, Vec<u8>)> = self.with_conn(|conn| {
      conn
        .query_row(
          "SELECT status, status_text, headers, body FROM asset_cache
           WHERE cache_name = ?1 AND key_hash = ?2",
          params![self.name, hash_key(key)],
          |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()
        .map_err(|e| store_err("Failed to read cached response", e))
    })?;

    let Some((status, status_text, headers, body)) = row else {
      return Ok(None);
    };

    let headers: Vec<(String, String)> =
      serde_json::from_str(&headers).map_err(|e| store_err("Corrupt cached headers", e))?;

    Ok(Some(Response {
      status,
      status_text,
      headers,
      body,
    }))
  }

  fn store(&self, key: &str, response: &Response) -> Result<()> {
    let copy = response.duplicate();
    let headers =
      serde_json::to_string(&copy.headers).map_err(|e| store_err("Failed to encode headers", e))?;

    self.with_conn(|conn| {
      conn
        .execute(
          "INSERT OR REPLACE INTO asset_cache
           (cache_name, key_hash, request_key, status, status_text, headers, body, cached_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          params![
            self.name,
            hash_key(key),
            key,
            copy.status,
            copy.status_text,
            headers,
            copy.body,
            Utc::now().to_rfc3339()
          ],
        )
        .map_err(|e| store_err("Failed to store response", e))?;
      Ok(())
    })?;

    debug!(cache = %self.name, key, "Stored response");
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    self.with_conn(|conn| {
      conn
        .execute(
          "DELETE FROM asset_cache WHERE cache_name = ?1",
          params![self.name],
        )
        .map_err(|e| store_err("Failed to clear asset cache", e))?;
      Ok(())
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tempfile::TempDir;

  fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("nested").join("cache.db")
  }

  #[test]
  fn test_put_then_get_returns_same_value() {
    let dir = TempDir::new().unwrap();
    let store = SqliteRecordStore::new(&db_path(&dir), "restaurants", 1);

    let data = json!([{"id": 1, "name": "Mission Chinese Food"}]);
    store.put("-1", &data).unwrap();

    assert_eq!(store.get("-1").unwrap(), Some(data));
    assert_eq!(store.get("42").unwrap(), None);
  }

  #[test]
  fn test_coordinates_read_back_exactly() {
    let dir = TempDir::new().unwrap();
    let store = SqliteRecordStore::new(&db_path(&dir), "restaurants", 1);

    let coords = [
      (40.713829, -73.989667),
      (-33.86881989999999, 151.20929550000001),
      (32.71573361554809, -116.83361554809613),
      (f64::MIN_POSITIVE, 179.99999999999997),
    ];
    for (i, (lat, lng)) in coords.iter().enumerate() {
      let data = json!({"id": i, "latlng": {"lat": lat, "lng": lng}});
      store.put(&i.to_string(), &data).unwrap();

      let back = store.get(&i.to_string()).unwrap().unwrap();
      assert_eq!(back, data);
      assert_eq!(back["latlng"]["lng"].as_f64(), Some(*lng));
    }
  }

  #[test]
  fn test_empty_payloads_are_hits() {
    let dir = TempDir::new().unwrap();
    let store = SqliteRecordStore::new(&db_path(&dir), "restaurants", 1);

    store.put("-1", &json!([])).unwrap();
    store.put("7", &json!(null)).unwrap();

    assert_eq!(store.get("-1").unwrap(), Some(json!([])));
    assert_eq!(store.get("7").unwrap(), Some(Value::Null));
  }

  #[test]
  fn test_put_overwrites() {
    let dir = TempDir::new().unwrap();
    let store = SqliteRecordStore::new(&db_path(&dir), "restaurants", 1);

    store.put("3", &json!({"name": "old"})).unwrap();
    store.put("3", &json!({"name": "new"})).unwrap();

    assert_eq!(store.get("3").unwrap(), Some(json!({"name": "new"})));
  }

  #[test]
  fn test_open_twice_keeps_data() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);

    let store = SqliteRecordStore::new(&path, "restaurants", 1);
    store.open().unwrap();
    store.put("1", &json!({"id": 1})).unwrap();
    store.open().unwrap();

    let reopened = SqliteRecordStore::new(&path, "restaurants", 1);
    reopened.open().unwrap();
    assert_eq!(reopened.get("1").unwrap(), Some(json!({"id": 1})));
  }

  #[test]
  fn test_version_upgrade_keeps_records() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);

    let v1 = SqliteRecordStore::new(&path, "restaurants", 1);
    v1.put("1", &json!({"id": 1})).unwrap();
    assert_eq!(v1.stored_version().unwrap(), 1);

    let v2 = SqliteRecordStore::new(&path, "restaurants", 2);
    v2.open().unwrap();
    assert_eq!(v2.stored_version().unwrap(), 2);
    assert_eq!(v2.get("1").unwrap(), Some(json!({"id": 1})));
  }

  #[test]
  fn test_older_version_is_refused() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);

    SqliteRecordStore::new(&path, "restaurants", 3)
      .open()
      .unwrap();

    let err = SqliteRecordStore::new(&path, "restaurants", 1)
      .open()
      .unwrap_err();
    assert!(matches!(err, WorkerError::StoreUnavailable(_)));
  }

  #[test]
  fn test_unusable_path_is_store_unavailable() {
    let dir = TempDir::new().unwrap();
    // A directory cannot be opened as a database file
    let store = SqliteRecordStore::new(dir.path(), "restaurants", 1);

    assert!(matches!(
      store.open().unwrap_err(),
      WorkerError::StoreUnavailable(_)
    ));
  }

  #[test]
  fn test_named_stores_are_isolated() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);

    let a = SqliteRecordStore::new(&path, "a", 1);
    let b = SqliteRecordStore::new(&path, "b", 1);
    a.put("1", &json!("from a")).unwrap();

    assert_eq!(b.get("1").unwrap(), None);
    b.clear().unwrap();
    assert_eq!(a.get("1").unwrap(), Some(json!("from a")));
  }

  #[test]
  fn test_asset_round_trip_and_clear() {
    let dir = TempDir::new().unwrap();
    let cache = SqliteAssetCache::new(&db_path(&dir), "mws-restaruant-001");

    let response =
      Response::text(200, "OK", "<html>shell</html>").with_header("etag", "\"abc\"");
    cache.store("restaurant.html", &response).unwrap();

    let hit = cache.lookup("restaurant.html").unwrap().unwrap();
    assert_eq!(hit, response);
    assert_eq!(hit.header("etag"), Some("\"abc\""));

    cache.clear().unwrap();
    assert!(cache.lookup("restaurant.html").unwrap().is_none());
  }

  #[test]
  fn test_asset_store_overwrites() {
    let dir = TempDir::new().unwrap();
    let cache = SqliteAssetCache::new(&db_path(&dir), "assets");

    cache
      .store("/css/styles.css", &Response::text(200, "OK", "a {}"))
      .unwrap();
    cache
      .store("/css/styles.css", &Response::text(200, "OK", "b {}"))
      .unwrap();

    let hit = cache.lookup("/css/styles.css").unwrap().unwrap();
    assert_eq!(hit.body_text(), "b {}");
  }

  #[test]
  fn test_record_store_and_asset_cache_share_a_file() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);

    let records = SqliteRecordStore::new(&path, "restaurants", 1);
    let assets = SqliteAssetCache::new(&path, "assets");

    records.put("-1", &json!([])).unwrap();
    assets
      .store("/", &Response::text(200, "OK", "index"))
      .unwrap();

    assert_eq!(records.get("-1").unwrap(), Some(json!([])));
    assert!(assets.lookup("/").unwrap().is_some());
  }
}
