use std::sync::{Arc, OnceLock};
use std::time::Instant;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{GraphError, TaskError};
use crate::graph::TaskGraph;
use crate::option::Options;
use crate::persist::Persist;
use crate::task::{Dynamic, Registry, TaskBody, TaskContext};

use super::events::{Event, EventSink, NullSink, TaskState};
use super::report::{RunReport, TaskReport};

pub(crate) type TaskOutcome = Result<Dynamic, TaskError>;

struct Slot {
    done: watch::Sender<bool>,
    outcome: OnceLock<TaskOutcome>,
}

/// Per-run state shared between the drivers and every [`TaskContext`].
pub(crate) struct RunShared {
    pub(crate) graph: TaskGraph,
    pub(crate) bodies: Vec<TaskBody>,
    pub(crate) options: Arc<Options>,
    pub(crate) persist: Arc<Persist>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) cancel: CancellationToken,
    slots: Vec<Slot>,
}

impl RunShared {
    /// Suspend until the task at `idx` has a memoized outcome.
    pub(crate) async fn wait_done(&self, idx: usize) {
        let mut rx = self.slots[idx].done.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub(crate) fn outcome(&self, idx: usize) -> Option<TaskOutcome> {
        self.slots[idx].outcome.get().cloned()
    }

    fn complete(&self, idx: usize, outcome: TaskOutcome) {
        // First write wins; a task completes exactly once. send_replace
        // stores the flag even when no dependent has subscribed yet.
        let _ = self.slots[idx].outcome.set(outcome);
        self.slots[idx].done.send_replace(true);
    }
}

/// Executes selections of tasks from a [`Registry`].
///
/// The runner owns the run-scoped collaborators (options, persistence,
/// event sink, cancellation token); tests build a fresh runner per case
/// instead of sharing ambient globals.
pub struct Runner {
    registry: Registry,
    options: Arc<Options>,
    persist: Arc<Persist>,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            options: Arc::new(Options::new()),
            persist: Arc::new(Persist::open(Persist::default_location("dagrun"))),
            sink: Arc::new(NullSink),
            cancel: CancellationToken::new(),
        }
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = Arc::new(options);
        self
    }

    pub fn persist(mut self, persist: Persist) -> Self {
        self.persist = Arc::new(persist);
        self
    }

    pub fn events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Cancelling this token aborts the run: suspended bodies stop at
    /// their next suspension point and in-flight subprocesses are killed.
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Execute the requested tasks and everything they transitively
    /// depend on. Graph defects (unknown names, missing dependencies,
    /// cycles) fail before anything runs; per-task failures are reported
    /// through the returned [`RunReport`].
    pub async fn run(&self, requested: &[&str]) -> Result<RunReport, GraphError> {
        let started = Instant::now();

        let graph = TaskGraph::build(&self.registry.node_specs())?;
        let mut roots = Vec::with_capacity(requested.len());
        for name in requested {
            roots.push(graph.resolve(name)?);
        }
        let closure = graph.closure(&roots);

        let slots = (0..graph.len())
            .map(|_| Slot {
                done: watch::channel(false).0,
                outcome: OnceLock::new(),
            })
            .collect();

        let shared = Arc::new(RunShared {
            graph,
            bodies: self.registry.bodies(),
            options: self.options.clone(),
            persist: self.persist.clone(),
            sink: self.sink.clone(),
            cancel: self.cancel.clone(),
            slots,
        });

        self.sink.emit(&Event::RunStart {
            total_tasks: closure.len(),
        });

        let mut drivers: FuturesUnordered<_> = closure
            .iter()
            .map(|&idx| drive(shared.clone(), idx))
            .collect();

        let mut finished: Vec<(usize, TaskReport)> = Vec::with_capacity(closure.len());
        while let Some(entry) = drivers.next().await {
            finished.push(entry);
        }
        drop(drivers);

        finished.sort_by_key(|(idx, _)| *idx);
        let tasks: Vec<TaskReport> = finished.into_iter().map(|(_, report)| report).collect();

        let duration = started.elapsed();
        let report = RunReport { tasks, duration };

        self.sink.emit(&Event::RunEnd {
            succeeded: report.success(),
            failed: report.failures().count(),
            duration_ms: duration.as_millis() as u64,
        });

        Ok(report)
    }
}

/// Drive one task to completion: wait for its dependencies, apply the
/// order-only failure policy, run the body under the cancellation token,
/// and memoize the outcome.
async fn drive(shared: Arc<RunShared>, idx: usize) -> (usize, TaskReport) {
    let name = shared.graph.name(idx).to_string();

    let deps: Vec<usize> = shared
        .graph
        .hard_deps(idx)
        .iter()
        .chain(shared.graph.order_deps(idx).iter())
        .copied()
        .collect();

    for &dep in &deps {
        shared.wait_done(dep).await;
    }

    let failed_dep = deps
        .iter()
        .copied()
        .find(|&dep| matches!(shared.outcome(dep), Some(Err(_))));

    let started = Instant::now();
    let (state, outcome) = if shared.cancel.is_cancelled() {
        (
            TaskState::Cancelled,
            Err(TaskError::Cancelled { task: name.clone() }),
        )
    } else if let Some(dep) = failed_dep {
        // A failed dependency blocks the dependent whether the edge is
        // hard or order-only.
        (
            TaskState::Skipped,
            Err(TaskError::DependencyFailed {
                task: name.clone(),
                dep: shared.graph.name(dep).to_string(),
            }),
        )
    } else {
        shared.sink.emit(&Event::TaskStart { task: name.clone() });

        let body = shared.bodies[idx].clone();
        let cx = TaskContext {
            idx,
            shared: shared.clone(),
        };

        let result = tokio::select! {
            _ = shared.cancel.cancelled() => Err(TaskError::Cancelled { task: name.clone() }),
            result = (body)(cx) => result.map_err(|e| TaskError::Failed {
                task: name.clone(),
                message: format!("{e:#}"),
            }),
        };

        match result {
            Ok(value) => (TaskState::Succeeded, Ok(value)),
            Err(error @ TaskError::Cancelled { .. }) => (TaskState::Cancelled, Err(error)),
            Err(error) => (TaskState::Failed, Err(error)),
        }
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    let error = outcome.as_ref().err().cloned();
    shared.complete(idx, outcome);

    shared.sink.emit(&Event::TaskFinished {
        task: name.clone(),
        state,
        duration_ms,
    });

    (
        idx,
        TaskReport {
            task: name,
            state,
            duration_ms,
            error,
        },
    )
}
