use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(about = "Run tasks from this script's task graph")]
pub struct Args {
    /// Tasks to run. Dependencies are pulled in automatically.
    pub tasks: Vec<String>,

    /// Set an option override (NAME=VALUE). May be given multiple times
    /// and wins over environment and config-file overrides.
    #[arg(
        short = 'o',
        long = "option",
        value_name = "NAME=VALUE",
        action = clap::ArgAction::Append
    )]
    pub options: Vec<String>,

    /// Read option overrides from a TOML file's [options] table.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// List the defined tasks and exit.
    #[arg(long)]
    pub list_tasks: bool,

    /// List the defined options and exit.
    #[arg(long)]
    pub list_options: bool,

    /// Disable the progress display; log task lifecycle events instead.
    #[arg(long)]
    pub no_progress: bool,
}

/// Split a `NAME=VALUE` override argument.
pub fn parse_override(raw: &str) -> anyhow::Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name, value)),
        _ => anyhow::bail!("invalid option override '{raw}', expected NAME=VALUE"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tasks_and_overrides() {
        let args = Args::parse_from([
            "dagrun",
            "build",
            "test",
            "-o",
            "cmake-version=3.27.0",
            "--option",
            "test.debug=true",
            "--no-progress",
        ]);
        assert_eq!(args.tasks, vec!["build", "test"]);
        assert_eq!(
            args.options,
            vec!["cmake-version=3.27.0", "test.debug=true"]
        );
        assert!(args.no_progress);
        assert!(!args.list_tasks);
    }

    #[test]
    fn override_requires_name_and_equals() {
        assert_eq!(
            parse_override("jobs=8").unwrap(),
            ("jobs", "8")
        );
        // An empty value is allowed; some options treat it as "set".
        assert_eq!(parse_override("flag=").unwrap(), ("flag", ""));
        assert!(parse_override("jobs").is_err());
        assert!(parse_override("=8").is_err());
    }
}
