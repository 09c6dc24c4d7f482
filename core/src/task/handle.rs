use std::marker::PhantomData;
use std::sync::Arc;

/// Anything that can stand on the right-hand side of a dependency
/// declaration.
pub trait TaskRef {
    fn task_name(&self) -> &str;
}

/// Typed reference to a defined task.
///
/// `T` is the type the task's body produces; the engine stores results
/// type-erased and this handle recovers them by downcast, so a handle is
/// the only way to read a task's value.
pub struct TaskHandle<T> {
    name: Arc<str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(name: Arc<str>) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle").field("name", &self.name).finish()
    }
}

impl<T> TaskRef for TaskHandle<T> {
    fn task_name(&self) -> &str {
        &self.name
    }
}
