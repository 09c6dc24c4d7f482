//! Task orchestration engine: a registry of async tasks wired into a
//! dependency graph, executed concurrently with memoized results,
//! typed run-scoped options, and a persisted key/value store.

pub mod api;
pub mod archive;
pub mod error;
pub mod exec;
pub mod fsutil;
pub mod graph;
pub mod net;
pub mod option;
pub mod persist;
pub mod platform;
pub mod proc;
pub mod task;
