//! Core traits and types for the two stores.

use serde_json::Value;

use crate::error::Result;
use crate::http::Response;

/// One stored API payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
  /// Resource id, or the sentinel for the whole collection
  pub id: String,
  pub data: Value,
}

/// Keyed store of opaque JSON payloads.
///
/// A stored `null`, `[]` or `{}` is still a record: `get` returns
/// `Some(data)` for it, and callers treat that as authoritative.
pub trait RecordStore: Send + Sync {
  /// Make sure the store exists at the expected version.
  ///
  /// Idempotent. Never clears existing records.
  fn open(&self) -> Result<()>;

  fn get(&self, id: &str) -> Result<Option<Value>>;

  /// Upsert. A later `get` for the same id sees this value.
  fn put(&self, id: &str, data: &Value) -> Result<()>;

  fn clear(&self) -> Result<()>;
}

/// Store of whole captured responses for static content.
pub trait AssetCache: Send + Sync {
  /// Open (or create) the named cache. Failing here is fatal to install.
  fn open(&self) -> Result<()>;

  fn lookup(&self, key: &str) -> Result<Option<Response>>;

  /// Keep a copy of `response` under `key`.
  ///
  /// Takes the response by reference and stores its own duplicate, so the
  /// caller still owns the original to hand back to the page.
  fn store(&self, key: &str, response: &Response) -> Result<()>;

  fn clear(&self) -> Result<()>;
}
