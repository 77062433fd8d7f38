//! In-memory stores, for tests and `--ephemeral` runs.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::traits::{AssetCache, Record, RecordStore};
use crate::error::{Result, WorkerError};
use crate::http::Response;

/// Record store backed by a map. Nothing survives the process.
#[derive(Default)]
pub struct MemoryRecordStore {
  records: Mutex<HashMap<String, Record>>,
  opens: AtomicUsize,
  /// Simulates a host that refuses persistent storage
  denied: bool,
}

impl MemoryRecordStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn check(&self) -> Result<()> {
    if self.denied {
      return Err(WorkerError::StoreUnavailable(
        "persistent storage denied".to_string(),
      ));
    }
    Ok(())
  }

  fn records(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Record>>> {
    self.check()?;
    self
      .records
      .lock()
      .map_err(|e| WorkerError::Store(format!("Lock poisoned: {}", e)))
  }
}

impl RecordStore for MemoryRecordStore {
  fn open(&self) -> Result<()> {
    self.opens.fetch_add(1, Ordering::SeqCst);
    self.check()
  }

  fn get(&self, id: &str) -> Result<Option<Value>> {
    Ok(self.records()?.get(id).map(|r| r.data.clone()))
  }

  fn put(&self, id: &str, data: &Value) -> Result<()> {
    let record = Record {
      id: id.to_string(),
      data: data.clone(),
    };
    self.records()?.insert(record.id.clone(), record);
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    self.records()?.clear();
    Ok(())
  }
}

#[cfg(test)]
impl MemoryRecordStore {
  /// A store whose every operation fails with `StoreUnavailable`.
  pub fn denied() -> Self {
    Self {
      denied: true,
      ..Self::default()
    }
  }

  /// How many times `open` has been called.
  pub fn open_count(&self) -> usize {
    self.opens.load(Ordering::SeqCst)
  }
}

/// Asset cache backed by a map.
#[derive(Default)]
pub struct MemoryAssetCache {
  entries: Mutex<HashMap<String, Response>>,
  denied: bool,
}

impl MemoryAssetCache {
  pub fn new() -> Self {
    Self::default()
  }

  fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Response>>> {
    if self.denied {
      return Err(WorkerError::StoreUnavailable(
        "cache storage denied".to_string(),
      ));
    }
    self
      .entries
      .lock()
      .map_err(|e| WorkerError::Store(format!("Lock poisoned: {}", e)))
  }
}

impl AssetCache for MemoryAssetCache {
  fn open(&self) -> Result<()> {
    self.entries().map(|_| ())
  }

  fn lookup(&self, key: &str) -> Result<Option<Response>> {
    Ok(self.entries()?.get(key).map(Response::duplicate))
  }

  fn store(&self, key: &str, response: &Response) -> Result<()> {
    self
      .entries()?
      .insert(key.to_string(), response.duplicate());
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    self.entries()?.clear();
    Ok(())
  }
}

#[cfg(test)]
impl MemoryAssetCache {
  /// A cache that cannot be opened at all.
  pub fn denied() -> Self {
    Self {
      denied: true,
      ..Self::default()
    }
  }

  pub fn len(&self) -> usize {
    self.entries.lock().map(|e| e.len()).unwrap_or(0)
  }
}
