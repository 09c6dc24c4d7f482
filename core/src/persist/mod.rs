//! Durable key-value storage surviving across invocations.
//!
//! Used to memoize expensive derived data, e.g. an environment-variable
//! map scraped from a vendor script, keyed by a content hash of its
//! inputs. Values round-trip through JSON; every write rewrites the store
//! file atomically.

mod store;

pub use store::Persist;
