//! Assembly: overrides, tracing, cancellation, sink selection, execution.

use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use dagrun_core::api::{
    EventSink, LogSink, Options, OverrideLayer, ProgressRenderer, Registry, RunReport, Runner,
};
use dagrun_core::error::GraphError;

use crate::args::{parse_override, Args};

// Exit codes: clap itself exits 2 on usage errors.
const EXIT_OK: i32 = 0;
const EXIT_TASK_FAILED: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_INTERRUPTED: i32 = 130;

/// Parse the process arguments and run the given task graph. Returns the
/// process exit code; the embedding script passes it to
/// `std::process::exit`.
pub async fn run(registry: Registry, options: Options) -> i32 {
    let args = Args::parse();
    init_tracing();

    match run_with_args(args, registry, options).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_USAGE
        }
    }
}

async fn run_with_args(args: Args, registry: Registry, options: Options) -> anyhow::Result<i32> {
    if let Some(path) = &args.config {
        apply_config_file(path, &options)?;
    }
    options.apply_env_overrides()?;
    for raw in &args.options {
        let (name, value) = parse_override(raw)?;
        options.set_override(name, value, OverrideLayer::CommandLine)?;
    }

    if args.list_tasks {
        print_tasks(&registry);
        return Ok(EXIT_OK);
    }
    if args.list_options {
        print_options(&options);
        return Ok(EXIT_OK);
    }
    if args.tasks.is_empty() {
        eprintln!("no tasks requested; available tasks:\n");
        print_tasks(&registry);
        return Ok(EXIT_USAGE);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupted, stopping tasks ...");
            on_interrupt.cancel();
        }
    });

    let sink: Arc<dyn EventSink> = if args.no_progress || !std::io::stderr().is_terminal() {
        Arc::new(LogSink)
    } else {
        Arc::new(ProgressRenderer::new(true))
    };

    let requested: Vec<&str> = args.tasks.iter().map(String::as_str).collect();
    let report = Runner::new(registry)
        .options(options)
        .events(sink)
        .cancel_token(cancel.clone())
        .run(&requested)
        .await;

    match report {
        Ok(report) => Ok(exit_code_for(&report, cancel.is_cancelled())),
        Err(e @ GraphError::UnknownTask(_)) => {
            eprintln!("error: {e}");
            Ok(EXIT_USAGE)
        }
        Err(e) => Err(e.into()),
    }
}

fn exit_code_for(report: &RunReport, interrupted: bool) -> i32 {
    if report.success() {
        EXIT_OK
    } else if interrupted {
        EXIT_INTERRUPTED
    } else {
        eprintln!("the following tasks did not succeed:\n{}", report.render_failures());
        EXIT_TASK_FAILED
    }
}

/// Apply the `[options]` table of a TOML file as config-layer overrides.
fn apply_config_file(path: &Path, options: &Options) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let value: toml::Value = toml::from_str(&text)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;

    let Some(table) = value.get("options").and_then(|v| v.as_table()) else {
        return Ok(());
    };

    for (name, value) in table {
        let raw = match value {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        options
            .set_override(name, raw, OverrideLayer::ConfigFile)
            .with_context(|| format!("in config file {}", path.display()))?;
    }
    Ok(())
}

fn print_tasks(registry: &Registry) {
    for task in registry.list() {
        match task.doc {
            Some(doc) => println!("  {:<24} {doc}", task.name),
            None => println!("  {}", task.name),
        }
    }
}

fn print_options(options: &Options) {
    for option in options.list() {
        let default = option
            .default_hint
            .map(|d| format!(" [default: {d}]"))
            .unwrap_or_default();
        let doc = if option.doc.is_empty() {
            String::new()
        } else {
            format!(" {}", option.doc)
        };
        println!(
            "  {:<24} {}{}{}",
            option.name, option.type_label, default, doc
        );
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DAGRUN_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use dagrun_core::api::OptionSpec;

    use super::*;

    fn sample_registry() -> Registry {
        let mut registry = Registry::new();
        let clean = registry
            .task("clean")
            .doc("Delete prior build results")
            .body(|_cx| async { Ok(()) })
            .unwrap();
        registry
            .task("build")
            .depends(&clean)
            .body(|_cx| async { Ok(()) })
            .unwrap();
        registry
    }

    fn sample_options() -> Options {
        let mut options = Options::new();
        options
            .add(OptionSpec::<u64>::new("jobs").default_value(4))
            .unwrap();
        options
            .add(OptionSpec::<String>::new("build-dir"))
            .unwrap();
        options
    }

    fn parse(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("dagrun").chain(argv.iter().copied()))
    }

    #[tokio::test]
    async fn runs_requested_tasks_and_reports_success() {
        let args = parse(&["build", "--no-progress"]);
        let code = run_with_args(args, sample_registry(), sample_options())
            .await
            .unwrap();
        assert_eq!(code, EXIT_OK);
    }

    #[tokio::test]
    async fn unknown_task_is_a_usage_error() {
        let args = parse(&["deploy", "--no-progress"]);
        let code = run_with_args(args, sample_registry(), sample_options())
            .await
            .unwrap();
        assert_eq!(code, EXIT_USAGE);
    }

    #[tokio::test]
    async fn no_tasks_is_a_usage_error() {
        let args = parse(&["--no-progress"]);
        let code = run_with_args(args, sample_registry(), sample_options())
            .await
            .unwrap();
        assert_eq!(code, EXIT_USAGE);
    }

    #[tokio::test]
    async fn listing_flags_short_circuit_execution() {
        let args = parse(&["--list-tasks"]);
        let code = run_with_args(args, sample_registry(), sample_options())
            .await
            .unwrap();
        assert_eq!(code, EXIT_OK);
    }

    #[tokio::test]
    async fn failing_task_yields_failure_exit_code() {
        let mut registry = Registry::new();
        registry
            .task("broken")
            .body::<(), _, _>(|_cx| async { anyhow::bail!("nope") })
            .unwrap();

        let args = parse(&["broken", "--no-progress"]);
        let code = run_with_args(args, registry, Options::new()).await.unwrap();
        assert_eq!(code, EXIT_TASK_FAILED);
    }

    #[tokio::test]
    async fn cli_override_beats_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("dagrun.toml");
        let mut file = std::fs::File::create(&config).unwrap();
        writeln!(file, "[options]").unwrap();
        writeln!(file, "jobs = 2").unwrap();
        drop(file);

        let seen = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));
        let probe = seen.clone();

        let mut options = Options::new();
        let jobs = options
            .add(OptionSpec::<u64>::new("jobs").default_value(4))
            .unwrap();

        let mut registry = Registry::new();
        registry
            .task("report-jobs")
            .body(move |cx| {
                let jobs = jobs.clone();
                let probe = probe.clone();
                async move {
                    let value = jobs.get(cx.options())?;
                    probe.store(value, std::sync::atomic::Ordering::SeqCst);
                    Ok(())
                }
            })
            .unwrap();

        let args = parse(&[
            "report-jobs",
            "--no-progress",
            "--config",
            config.to_str().unwrap(),
            "-o",
            "jobs=16",
        ]);
        let code = run_with_args(args, registry, options).await.unwrap();
        assert_eq!(code, EXIT_OK);
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 16);
    }

    #[tokio::test]
    async fn config_file_override_applies_when_cli_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("dagrun.toml");
        std::fs::write(&config, "[options]\nbuild-dir = \"out\"\n").unwrap();

        let mut options = Options::new();
        let build_dir = options
            .add(OptionSpec::<String>::new("build-dir"))
            .unwrap();

        let seen = std::sync::Arc::new(std::sync::Mutex::new(String::new()));
        let probe = seen.clone();

        let mut registry = Registry::new();
        registry
            .task("report-dir")
            .body(move |cx| {
                let build_dir = build_dir.clone();
                let probe = probe.clone();
                async move {
                    *probe.lock().unwrap() = build_dir.get(cx.options())?;
                    Ok(())
                }
            })
            .unwrap();

        let args = parse(&[
            "report-dir",
            "--no-progress",
            "--config",
            config.to_str().unwrap(),
        ]);
        let code = run_with_args(args, registry, options).await.unwrap();
        assert_eq!(code, EXIT_OK);
        assert_eq!(*seen.lock().unwrap(), "out");
    }

    #[tokio::test]
    async fn malformed_override_is_rejected() {
        let args = parse(&["build", "--no-progress", "-o", "jobs"]);
        let err = run_with_args(args, sample_registry(), sample_options())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("NAME=VALUE"));
    }

    #[test]
    fn unset_default_hint_prints_cleanly() {
        // print_options must tolerate options with no default.
        print_options(&sample_options());
    }
}
