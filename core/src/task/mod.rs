//! Task registration: named async bodies with declared dependencies.
//!
//! Tasks are registered up front against a [`Registry`] (static graph) and
//! only instantiated when selected for a run or pulled in as a dependency.
//! A hard dependency (`depends`) orders the tasks *and* lets the dependent
//! read the dependency's value through [`TaskContext::result_of`]; an
//! order-only dependency (`order_only`) orders them without exposing a
//! value.

mod context;
mod handle;

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::GraphError;
use crate::graph::NodeSpec;

pub use context::TaskContext;
pub use handle::{TaskHandle, TaskRef};

/// Type-erased task result, recovered by downcast through the typed handle.
pub(crate) type Dynamic = Arc<dyn Any + Send + Sync>;

pub(crate) type TaskBody =
    Arc<dyn Fn(TaskContext) -> BoxFuture<'static, anyhow::Result<Dynamic>> + Send + Sync>;

pub(crate) struct RegisteredTask {
    pub spec: NodeSpec,
    pub doc: Option<String>,
    pub body: TaskBody,
}

/// Listing entry for `--list-tasks`.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: String,
    pub doc: Option<String>,
}

/// The set of defined tasks. Registration happens at process start; the
/// registry is then handed to a `Runner` and becomes immutable.
#[derive(Default)]
pub struct Registry {
    tasks: Vec<RegisteredTask>,
    index: HashMap<Arc<str>, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start defining a task. The definition is recorded once
    /// [`TaskBuilder::body`] is called.
    pub fn task(&mut self, name: impl Into<String>) -> TaskBuilder<'_> {
        TaskBuilder {
            registry: self,
            name: name.into(),
            doc: None,
            depends: Vec::new(),
            order_only: Vec::new(),
        }
    }

    /// Define a composite task that awaits all of `tasks` and produces
    /// nothing: a named aggregate entry point.
    pub fn gather(
        &mut self,
        name: impl Into<String>,
        tasks: &[&dyn TaskRef],
    ) -> Result<TaskHandle<()>, GraphError> {
        let mut builder = self.task(name).doc("Aggregate of its dependencies");
        for task in tasks {
            builder = builder.depends(*task);
        }
        builder.body(|_cx| async { Ok(()) })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Enumerate defined tasks in definition order.
    pub fn list(&self) -> Vec<TaskInfo> {
        self.tasks
            .iter()
            .map(|t| TaskInfo {
                name: t.spec.name.to_string(),
                doc: t.doc.clone(),
            })
            .collect()
    }

    pub(crate) fn node_specs(&self) -> Vec<NodeSpec> {
        self.tasks.iter().map(|t| t.spec.clone()).collect()
    }

    pub(crate) fn bodies(&self) -> Vec<TaskBody> {
        self.tasks.iter().map(|t| t.body.clone()).collect()
    }

    fn insert(&mut self, task: RegisteredTask) -> Result<Arc<str>, GraphError> {
        let name = task.spec.name.clone();
        if self.index.contains_key(&name) {
            return Err(GraphError::DuplicateTask(name.to_string()));
        }
        self.index.insert(name.clone(), self.tasks.len());
        self.tasks.push(task);
        Ok(name)
    }
}

/// Accumulates one task definition.
pub struct TaskBuilder<'r> {
    registry: &'r mut Registry,
    name: String,
    doc: Option<String>,
    depends: Vec<Arc<str>>,
    order_only: Vec<Arc<str>>,
}

impl<'r> TaskBuilder<'r> {
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Declare a hard dependency: ordering plus a readable result.
    pub fn depends(mut self, task: &dyn TaskRef) -> Self {
        self.depends.push(Arc::from(task.task_name()));
        self
    }

    /// Declare an order-only dependency: ordering without a result.
    pub fn order_only(mut self, task: &dyn TaskRef) -> Self {
        self.order_only.push(Arc::from(task.task_name()));
        self
    }

    /// Attach the async body and register the task.
    pub fn body<T, F, Fut>(self, body: F) -> Result<TaskHandle<T>, GraphError>
    where
        T: Send + Sync + 'static,
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let erased: TaskBody = Arc::new(move |cx| {
            let fut = body(cx);
            async move { fut.await.map(|value| Arc::new(value) as Dynamic) }.boxed()
        });

        let name = self.registry.insert(RegisteredTask {
            spec: NodeSpec {
                name: Arc::from(self.name.as_str()),
                depends: self.depends,
                order_only: self.order_only,
            },
            doc: self.doc,
            body: erased,
        })?;

        Ok(TaskHandle::new(name))
    }
}
