//! Request interception: classify, resolve against a store, refresh from
//! the network, degrade gracefully.

mod classify;
mod controller;
mod fallback;
mod install;

pub use controller::{Controller, LifecycleEvent, WorkerState};
