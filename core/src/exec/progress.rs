use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::events::{Event, EventSink, TaskState};

const TASK_PROGRESS_TICKS: u64 = 100;

/// Visual progress renderer over [`EventSink`].
///
/// One overall bar counts finished tasks; each running task gets a spinner
/// that shows its latest status line and, when a task reports fractional
/// progress, switches to a position within 100 ticks.
pub struct ProgressRenderer {
    multi: MultiProgress,
    overall: ProgressBar,
    task_bars: Mutex<HashMap<String, ProgressBar>>,
    enabled: bool,
}

impl ProgressRenderer {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self {
                multi: MultiProgress::new(),
                overall: ProgressBar::hidden(),
                task_bars: Mutex::new(HashMap::new()),
                enabled: false,
            };
        }

        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::no_length());
        overall.set_style(
            ProgressStyle::with_template(
                "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tasks {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░  "),
        );

        Self {
            multi,
            overall,
            task_bars: Mutex::new(HashMap::new()),
            enabled: true,
        }
    }

    fn bars(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProgressBar>> {
        match self.task_bars.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl EventSink for ProgressRenderer {
    fn emit(&self, event: &Event) {
        if !self.enabled {
            return;
        }

        match event {
            Event::RunStart { total_tasks } => {
                self.overall.set_length(*total_tasks as u64);
                self.overall.set_position(0);
            }
            Event::TaskStart { task } => {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(
                    ProgressStyle::with_template("  {spinner:.green} {prefix:.bold} {wide_msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar.set_prefix(task.clone());
                bar.enable_steady_tick(Duration::from_millis(120));
                self.bars().insert(task.clone(), bar);
            }
            Event::TaskStatus { task, message } => {
                if let Some(bar) = self.bars().get(task) {
                    bar.set_message(message.clone());
                }
            }
            Event::TaskProgress { task, fraction } => {
                if let Some(bar) = self.bars().get(task) {
                    match fraction {
                        Some(fraction) => {
                            if bar.length().is_none() {
                                bar.set_length(TASK_PROGRESS_TICKS);
                            }
                            let pos = (fraction.clamp(0.0, 1.0)
                                * TASK_PROGRESS_TICKS as f32) as u64;
                            bar.set_position(pos);
                        }
                        None => bar.unset_length(),
                    }
                }
            }
            Event::TaskFinished { task, state, .. } => {
                if let Some(bar) = self.bars().remove(task) {
                    match state {
                        TaskState::Succeeded => bar.finish_and_clear(),
                        TaskState::Failed => bar.abandon_with_message("failed"),
                        TaskState::Skipped => bar.abandon_with_message("skipped"),
                        TaskState::Cancelled => bar.abandon_with_message("cancelled"),
                    }
                }
                self.overall.inc(1);
            }
            Event::RunEnd { succeeded, .. } => {
                for (_, bar) in self.bars().drain() {
                    bar.finish_and_clear();
                }
                if *succeeded {
                    self.overall.finish_with_message("done");
                } else {
                    self.overall.abandon_with_message("failed");
                }
            }
        }
    }
}
