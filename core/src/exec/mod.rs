//! The scheduler/executor.
//!
//! A run takes one or more requested tasks, computes the induced subgraph
//! over hard and order-only edges, and drives every task in the closure as
//! a concurrent future on the tokio runtime. A task becomes eligible the
//! moment its last dependency completes; there is no engine-imposed
//! concurrency bound. Each body executes exactly once per run and its
//! outcome is memoized for every dependent.

pub(crate) mod engine;
pub mod events;
mod progress;
mod report;

pub use engine::Runner;
pub use events::{Event, EventScope, EventSink, LogSink, NullSink, TaskState};
pub use progress::ProgressRenderer;
pub use report::{RunReport, TaskReport};
