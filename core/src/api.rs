//! Stable re-exports for consumers (`cli` and embedding crates).
//!
//! Prefer importing from `dagrun_core::api` instead of reaching into
//! internal modules.

pub use crate::error::{GraphError, OptionError, PersistError, ProcError, TaskError};
pub use crate::exec::{
    Event, EventScope, EventSink, LogSink, NullSink, ProgressRenderer, RunReport, Runner,
    TaskReport, TaskState,
};
pub use crate::option::{
    OptionHandle, OptionInfo, OptionSpec, OptionValue, Options, OverrideLayer,
};
pub use crate::persist::Persist;
pub use crate::platform::Platform;
pub use crate::proc::{Exec, OutputLine, OutputStream, ProcOutput};
pub use crate::task::{Registry, TaskBuilder, TaskContext, TaskHandle, TaskInfo, TaskRef};
