//! Persistent stores behind the interception controller.
//!
//! Two independent stores live here:
//! - a versioned record store of JSON payloads keyed by API resource id
//! - an asset cache of whole responses keyed by normalized request identity
//!
//! Both come in a SQLite flavour for real use and an in-memory flavour for
//! tests and throwaway runs. The controller only sees the traits.

mod memory;
mod storage;
mod traits;

pub use memory::{MemoryAssetCache, MemoryRecordStore};
pub use storage::{SqliteAssetCache, SqliteRecordStore};
pub use traits::{AssetCache, RecordStore};
