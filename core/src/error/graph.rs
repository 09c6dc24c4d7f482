use thiserror::Error;

/// Errors raised while constructing or validating the task graph.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("duplicate task: '{0}' is already defined")]
    DuplicateTask(String),

    #[error("unknown task: '{0}'")]
    UnknownTask(String),

    #[error("task '{task}' depends on '{missing}', which is not defined")]
    MissingDependency { task: String, missing: String },

    #[error("dependency cycle detected: {0}")]
    Cycle(String),

    #[error("task '{task}' requested the result of '{wanted}', which is not in its declared dependency closure")]
    UndeclaredDependency { task: String, wanted: String },
}
