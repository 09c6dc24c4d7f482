use thiserror::Error;

/// The memoized outcome of a failed task, re-raised to every dependent
/// that requests its result.
///
/// The variants are cheap to clone so a single failure can fan out to an
/// arbitrary number of dependents; the original error chain is rendered
/// into `message` at the point of failure.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    #[error("task '{task}' failed: {message}")]
    Failed { task: String, message: String },

    #[error("task '{task}' did not run: dependency '{dep}' failed")]
    DependencyFailed { task: String, dep: String },

    #[error("task '{task}' was cancelled")]
    Cancelled { task: String },
}

impl TaskError {
    /// The task this outcome is attributed to.
    pub fn task(&self) -> &str {
        match self {
            Self::Failed { task, .. }
            | Self::DependencyFailed { task, .. }
            | Self::Cancelled { task } => task,
        }
    }
}
