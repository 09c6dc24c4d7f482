//! End-to-end runs through the public API: registry, graph, runner,
//! memoization, cancellation, options and persistence together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use dagrun_core::api::{
    Event, EventSink, OptionSpec, Options, Persist, Registry, Runner, TaskState,
};
use dagrun_core::error::{GraphError, TaskError};

/// Records task start order for ordering assertions.
#[derive(Default)]
struct StartOrder(Mutex<Vec<String>>);

impl EventSink for StartOrder {
    fn emit(&self, event: &Event) {
        if let Event::TaskStart { task } = event {
            self.0.lock().unwrap().push(task.clone());
        }
    }
}

impl StartOrder {
    fn names(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn position(&self, task: &str) -> usize {
        self.names()
            .iter()
            .position(|t| t == task)
            .unwrap_or_else(|| panic!("task {task} never started"))
    }
}

#[tokio::test]
async fn each_task_body_runs_once_per_run() {
    let clean_runs = Arc::new(AtomicUsize::new(0));
    let probe = clean_runs.clone();

    let mut registry = Registry::new();
    let clean = registry
        .task("clean")
        .body(move |_cx| {
            let probe = probe.clone();
            async move {
                probe.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

    // Three tasks all hard-depend on clean; it must still run once.
    for name in ["a", "b", "c"] {
        registry
            .task(name)
            .depends(&clean)
            .body(|_cx| async { Ok(()) })
            .unwrap();
    }

    let report = Runner::new(registry).run(&["a", "b", "c"]).await.unwrap();
    assert!(report.success());
    assert_eq!(clean_runs.load(Ordering::SeqCst), 1);
    assert_eq!(report.tasks.len(), 4);
}

#[tokio::test]
async fn dependency_finishing_first_does_not_strand_dependents() {
    // The dependency completes immediately; the dependent yields a few
    // times before asking for the result, so the completion flag must be
    // observable after the fact, not only at the moment it is raised.
    let mut registry = Registry::new();
    let instant = registry
        .task("instant")
        .body(|_cx| async { Ok(5u32) })
        .unwrap();
    registry
        .task("late-reader")
        .depends(&instant)
        .body(move |cx| {
            let instant = instant.clone();
            async move {
                for _ in 0..10 {
                    tokio::task::yield_now().await;
                }
                let value = cx.result_of(&instant).await?;
                Ok(*value)
            }
        })
        .unwrap();

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        Runner::new(registry).run(&["late-reader"]),
    )
    .await
    .expect("run must not hang on an already-finished dependency")
    .unwrap();
    assert!(report.success());
}

#[tokio::test]
async fn hard_dependency_value_flows_to_the_dependent() {
    let mut registry = Registry::new();
    let compute = registry
        .task("compute")
        .body(|_cx| async { Ok(41u64) })
        .unwrap();

    let observed = Arc::new(AtomicUsize::new(0));
    let probe = observed.clone();
    registry
        .task("consume")
        .depends(&compute)
        .body(move |cx| {
            let compute = compute.clone();
            let probe = probe.clone();
            async move {
                let value = cx.result_of(&compute).await?;
                probe.store(*value as usize + 1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

    let report = Runner::new(registry).run(&["consume"]).await.unwrap();
    assert!(report.success());
    assert_eq!(observed.load(Ordering::SeqCst), 42);
}

#[tokio::test]
async fn order_only_dependency_is_not_pulled_in_by_request() {
    // clean <- configure (hard) <- build (hard); clean <- docs (order-only
    // edge from docs). Requesting build must not run docs.
    let mut registry = Registry::new();
    let clean = registry.task("clean").body(|_cx| async { Ok(()) }).unwrap();
    let configure = registry
        .task("configure")
        .depends(&clean)
        .body(|_cx| async { Ok(()) })
        .unwrap();
    registry
        .task("build")
        .depends(&configure)
        .body(|_cx| async { Ok(()) })
        .unwrap();
    registry
        .task("docs")
        .order_only(&clean)
        .body(|_cx| async { Ok(()) })
        .unwrap();

    let sink = Arc::new(StartOrder::default());
    let report = Runner::new(registry)
        .events(sink.clone())
        .run(&["build"])
        .await
        .unwrap();

    assert!(report.success());
    let started = sink.names();
    assert!(started.contains(&"clean".to_string()));
    assert!(started.contains(&"configure".to_string()));
    assert!(started.contains(&"build".to_string()));
    assert!(!started.contains(&"docs".to_string()));
    assert!(report.task("docs").is_none());
}

#[tokio::test]
async fn aggregate_runs_shared_dependency_once_and_orders_both_arms() {
    let clean_runs = Arc::new(AtomicUsize::new(0));
    let probe = clean_runs.clone();

    let mut registry = Registry::new();
    let clean = registry
        .task("clean")
        .body(move |_cx| {
            let probe = probe.clone();
            async move {
                probe.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();
    let configure = registry
        .task("configure")
        .depends(&clean)
        .body(|_cx| async { Ok(()) })
        .unwrap();
    let build = registry
        .task("build")
        .depends(&configure)
        .body(|_cx| async { Ok(()) })
        .unwrap();
    let docs = registry
        .task("docs")
        .order_only(&clean)
        .body(|_cx| async { Ok(()) })
        .unwrap();
    registry.gather("all", &[&build, &docs]).unwrap();

    let sink = Arc::new(StartOrder::default());
    let report = Runner::new(registry)
        .events(sink.clone())
        .run(&["all"])
        .await
        .unwrap();

    assert!(report.success());
    assert_eq!(clean_runs.load(Ordering::SeqCst), 1);
    assert!(sink.position("clean") < sink.position("configure"));
    assert!(sink.position("configure") < sink.position("build"));
    assert!(sink.position("clean") < sink.position("docs"));
    assert!(sink.position("build") < sink.position("all"));
    assert!(sink.position("docs") < sink.position("all"));
}

#[tokio::test]
async fn failure_skips_dependents_but_not_independent_tasks() {
    let unrelated_ran = Arc::new(AtomicUsize::new(0));
    let probe = unrelated_ran.clone();

    let mut registry = Registry::new();
    let broken = registry
        .task("broken")
        .body::<(), _, _>(|_cx| async { anyhow::bail!("configure step exploded") })
        .unwrap();
    registry
        .task("dependent")
        .depends(&broken)
        .body(|_cx| async { Ok(()) })
        .unwrap();
    registry
        .task("unrelated")
        .body(move |_cx| {
            let probe = probe.clone();
            async move {
                probe.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

    let report = Runner::new(registry)
        .run(&["dependent", "unrelated"])
        .await
        .unwrap();

    assert!(!report.success());
    assert_eq!(report.task("broken").unwrap().state, TaskState::Failed);
    assert_eq!(report.task("dependent").unwrap().state, TaskState::Skipped);
    assert_eq!(report.task("unrelated").unwrap().state, TaskState::Succeeded);
    assert_eq!(unrelated_ran.load(Ordering::SeqCst), 1);

    match report.task("broken").unwrap().error.as_ref().unwrap() {
        TaskError::Failed { message, .. } => {
            assert!(message.contains("configure step exploded"));
        }
        other => panic!("unexpected error: {other}"),
    }
    match report.task("dependent").unwrap().error.as_ref().unwrap() {
        TaskError::DependencyFailed { dep, .. } => assert_eq!(dep, "broken"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn failed_order_only_dependency_blocks_the_dependent() {
    let mut registry = Registry::new();
    let broken = registry
        .task("broken")
        .body::<(), _, _>(|_cx| async { anyhow::bail!("boom") })
        .unwrap();
    registry
        .task("after")
        .order_only(&broken)
        .body(|_cx| async { Ok(()) })
        .unwrap();

    let report = Runner::new(registry).run(&["after"]).await.unwrap();
    assert_eq!(report.task("after").unwrap().state, TaskState::Skipped);
}

#[tokio::test]
async fn unknown_requested_task_fails_before_anything_runs() {
    let ran = Arc::new(AtomicUsize::new(0));
    let probe = ran.clone();

    let mut registry = Registry::new();
    registry
        .task("real")
        .body(move |_cx| {
            let probe = probe.clone();
            async move {
                probe.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

    let err = Runner::new(registry)
        .run(&["real", "imaginary"])
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::UnknownTask(name) if name == "imaginary"));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn result_of_undeclared_task_fails_fast() {
    let mut registry = Registry::new();
    let hidden = registry
        .task("hidden")
        .body(|_cx| async { Ok(7u32) })
        .unwrap();
    registry
        .task("sneaky")
        .order_only(&hidden)
        .body(move |cx| {
            let hidden = hidden.clone();
            async move {
                // Only an order-only edge exists; the value is not readable.
                let value = cx.result_of(&hidden).await?;
                Ok(*value)
            }
        })
        .unwrap();

    let report = Runner::new(registry).run(&["sneaky"]).await.unwrap();
    let sneaky = report.task("sneaky").unwrap();
    assert_eq!(sneaky.state, TaskState::Failed);
    match sneaky.error.as_ref().unwrap() {
        TaskError::Failed { message, .. } => {
            assert!(message.contains("hidden"), "got: {message}");
            assert!(
                message.contains("not in its declared dependency closure"),
                "got: {message}"
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn cancellation_stops_waiting_tasks_promptly() {
    let mut registry = Registry::new();
    let stuck = registry
        .task("stuck")
        .body::<(), _, _>(|cx| async move {
            // A body that respects the token, like the subprocess wrapper.
            cx.cancel_token().cancelled().await;
            anyhow::bail!("interrupted")
        })
        .unwrap();
    registry
        .task("next")
        .depends(&stuck)
        .body(|_cx| async { Ok(()) })
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        Runner::new(registry).cancel_token(cancel).run(&["next"]),
    )
    .await
    .expect("cancellation must not hang the run")
    .unwrap();

    assert!(!report.success());
    assert_eq!(report.task("stuck").unwrap().state, TaskState::Cancelled);
    // The dependent never starts; it observes the cancelled run.
    let next = report.task("next").unwrap();
    assert!(matches!(next.state, TaskState::Cancelled | TaskState::Skipped));
}

#[tokio::test]
async fn options_and_persistence_are_reachable_from_task_bodies() {
    let dir = tempfile::tempdir().unwrap();
    let store = Persist::open(dir.path().join("results.json"));

    let mut options = Options::new();
    let jobs = options
        .add(OptionSpec::<u64>::new("jobs").default_value(4))
        .unwrap();
    options
        .set_override(
            "jobs",
            "8",
            dagrun_core::api::OverrideLayer::CommandLine,
        )
        .unwrap();

    let mut registry = Registry::new();
    let jobs_for_body = jobs.clone();
    registry
        .task("record")
        .body(move |cx| {
            let jobs = jobs_for_body.clone();
            async move {
                let value = jobs.get(cx.options())?;
                cx.persist().set("last-jobs", &value)?;
                Ok(())
            }
        })
        .unwrap();

    let report = Runner::new(registry)
        .options(options)
        .persist(store)
        .run(&["record"])
        .await
        .unwrap();
    assert!(report.success());

    // A reopened store sees what the task wrote.
    let reopened = Persist::open(dir.path().join("results.json"));
    assert_eq!(reopened.get::<u64>("last-jobs").unwrap(), Some(8));
}

#[tokio::test]
async fn report_lists_tasks_in_definition_order() {
    let mut registry = Registry::new();
    let first = registry.task("first").body(|_cx| async { Ok(()) }).unwrap();
    registry
        .task("second")
        .depends(&first)
        .body(|_cx| async { Ok(()) })
        .unwrap();

    let report = Runner::new(registry).run(&["second"]).await.unwrap();
    let names: Vec<&str> = report.tasks.iter().map(|t| t.task.as_str()).collect();
    assert_eq!(names, vec!["first", "second"]);
}
