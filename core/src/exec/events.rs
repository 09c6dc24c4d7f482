use std::sync::Arc;

/// Terminal state of one task within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Succeeded,
    Failed,
    /// Not run because a dependency failed.
    Skipped,
    Cancelled,
}

/// Everything observable about a run, in order of occurrence.
#[derive(Debug, Clone)]
pub enum Event {
    RunStart {
        total_tasks: usize,
    },
    TaskStart {
        task: String,
    },
    /// Transient one-line status, e.g. the current compiler invocation.
    TaskStatus {
        task: String,
        message: String,
    },
    /// Fractional progress; `None` resets to indeterminate.
    TaskProgress {
        task: String,
        fraction: Option<f32>,
    },
    TaskFinished {
        task: String,
        state: TaskState,
        duration_ms: u64,
    },
    RunEnd {
        succeeded: bool,
        failed: usize,
        duration_ms: u64,
    },
}

/// Consumer of run events. Implementations control presentation: progress
/// bars, plain logging, or silence.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Discards every event.
#[derive(Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &Event) {}
}

/// Forwards events to `tracing`.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &Event) {
        match event {
            Event::RunStart { total_tasks } => {
                tracing::info!(total_tasks, "run started");
            }
            Event::TaskStart { task } => {
                tracing::info!(%task, "task started");
            }
            Event::TaskStatus { task, message } => {
                tracing::debug!(%task, "{message}");
            }
            Event::TaskProgress { .. } => {}
            Event::TaskFinished {
                task,
                state,
                duration_ms,
            } => match state {
                TaskState::Succeeded => {
                    tracing::info!(%task, duration_ms, "task succeeded");
                }
                TaskState::Failed => {
                    tracing::error!(%task, duration_ms, "task failed");
                }
                TaskState::Skipped => {
                    tracing::warn!(%task, "task skipped: dependency failed");
                }
                TaskState::Cancelled => {
                    tracing::warn!(%task, "task cancelled");
                }
            },
            Event::RunEnd {
                succeeded,
                failed,
                duration_ms,
            } => {
                if *succeeded {
                    tracing::info!(duration_ms, "run succeeded");
                } else {
                    tracing::error!(failed, duration_ms, "run failed");
                }
            }
        }
    }
}

/// An [`EventSink`] bound to one task name, handed to utilities so their
/// status and progress reports are attributed correctly.
#[derive(Clone)]
pub struct EventScope {
    sink: Arc<dyn EventSink>,
    task: Arc<str>,
}

impl EventScope {
    pub(crate) fn new(sink: Arc<dyn EventSink>, task: Arc<str>) -> Self {
        Self { sink, task }
    }

    /// A scope not attributed to any task, for use outside a run.
    pub fn detached(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            task: Arc::from(""),
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn status(&self, message: impl Into<String>) {
        self.sink.emit(&Event::TaskStatus {
            task: self.task.to_string(),
            message: message.into(),
        });
    }

    pub fn progress(&self, fraction: Option<f32>) {
        self.sink.emit(&Event::TaskProgress {
            task: self.task.to_string(),
            fraction,
        });
    }
}
