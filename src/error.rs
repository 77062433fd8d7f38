//! Error types for the interception layer.
//!
//! None of these ever reach the page: every resolution path turns them into a
//! response. They exist so store and network code can say precisely what went
//! wrong, and so the lifecycle can tell a fatal install failure apart from a
//! recoverable one.

use thiserror::Error;

use crate::worker::{LifecycleEvent, WorkerState};

#[derive(Error, Debug)]
pub enum WorkerError {
  /// The persistent store could not be opened at all.
  #[error("persistent storage unavailable: {0}")]
  StoreUnavailable(String),

  /// An individual read or write against an open store failed.
  #[error("store operation failed: {0}")]
  Store(String),

  #[error("network fetch failed: {0}")]
  NetworkFailure(String),

  #[error("response is not valid JSON: {0}")]
  ParseFailure(#[from] serde_json::Error),

  #[error("cannot handle {event:?} while {state:?}")]
  Lifecycle {
    state: WorkerState,
    event: LifecycleEvent,
  },
}

pub type Result<T> = std::result::Result<T, WorkerError>;
