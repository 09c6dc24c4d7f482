use std::fmt::Write as _;
use std::time::Duration;

use crate::error::TaskError;

use super::events::TaskState;

/// Terminal record of one task in a run.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task: String,
    pub state: TaskState,
    pub duration_ms: u64,
    /// Present for every state except `Succeeded`.
    pub error: Option<TaskError>,
}

/// What a run did: one entry per task in the executed closure, in
/// definition order.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub tasks: Vec<TaskReport>,
    pub duration: Duration,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.tasks
            .iter()
            .all(|t| t.state == TaskState::Succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks
            .iter()
            .filter(|t| t.state != TaskState::Succeeded)
    }

    /// Find the report for a task by name.
    pub fn task(&self, name: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.task == name)
    }

    /// Human-readable summary naming each task that did not succeed and
    /// why. Empty for a fully successful run.
    pub fn render_failures(&self) -> String {
        let mut out = String::new();
        for failure in self.failures() {
            let detail = match &failure.error {
                Some(error) => error.to_string(),
                None => "unknown failure".to_string(),
            };
            let _ = writeln!(out, "  {}: {detail}", failure.task);
        }
        out
    }
}
