use std::sync::Arc;

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;

use crate::error::GraphError;
use crate::exec::engine::RunShared;
use crate::exec::events::EventScope;
use crate::option::Options;
use crate::persist::Persist;

use super::handle::TaskHandle;

/// Handed to every task body: access to the run's options, persistence,
/// cancellation token, event reporting, and the results of declared hard
/// dependencies.
#[derive(Clone)]
pub struct TaskContext {
    pub(crate) idx: usize,
    pub(crate) shared: Arc<RunShared>,
}

impl TaskContext {
    pub fn task_name(&self) -> &str {
        self.shared.graph.name(self.idx)
    }

    pub fn options(&self) -> &Options {
        &self.shared.options
    }

    pub fn persist(&self) -> &Persist {
        &self.shared.persist
    }

    /// Cancelled when the run is cancelled. Bodies that block on external
    /// work should observe it so cancellation reaches their children.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.shared.cancel
    }

    /// Event scope attributed to this task, for handing to the download,
    /// extraction and subprocess utilities.
    pub fn scope(&self) -> EventScope {
        EventScope::new(self.shared.sink.clone(), self.shared.graph.name(self.idx).clone())
    }

    /// Report a transient status line for this task.
    pub fn status(&self, message: impl Into<String>) {
        self.scope().status(message);
    }

    /// Report fractional progress (`None` clears it back to indeterminate).
    pub fn progress(&self, fraction: Option<f32>) {
        self.scope().progress(fraction);
    }

    /// Suspend until `task` has completed, then return its memoized value
    /// or re-raise its memoized failure.
    ///
    /// `task` must be in this task's declared transitive *hard* dependency
    /// closure; asking for anything else is a programming error and fails
    /// immediately rather than risking a hang.
    pub async fn result_of<T>(&self, task: &TaskHandle<T>) -> anyhow::Result<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let graph = &self.shared.graph;
        let target = graph.resolve(task.name())?;

        if !graph.hard_reachable(self.idx, target) {
            return Err(GraphError::UndeclaredDependency {
                task: self.task_name().to_string(),
                wanted: task.name().to_string(),
            }
            .into());
        }

        self.shared.wait_done(target).await;

        let outcome = self
            .shared
            .outcome(target)
            .with_context(|| format!("task '{}' completed without an outcome", task.name()))?;

        match outcome {
            Ok(value) => value.downcast::<T>().map_err(|_| {
                anyhow::anyhow!(
                    "task '{}' produced a value of a different type than its handle",
                    task.name()
                )
            }),
            Err(failure) => Err(failure.into()),
        }
    }
}
