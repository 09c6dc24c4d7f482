use std::path::PathBuf;

/// A value type usable as an option.
///
/// `parse` turns an override string (CLI flag, environment variable or
/// config-file entry) into the typed value; `render` is the inverse used
/// for `--list-options` output.
pub trait OptionValue: Clone + Send + Sync + 'static {
    /// Human-readable type label used in error messages and listings.
    const LABEL: &'static str;

    fn parse(raw: &str) -> Result<Self, String>;

    fn render(&self) -> String;
}

impl OptionValue for String {
    const LABEL: &'static str = "string";

    fn parse(raw: &str) -> Result<Self, String> {
        Ok(raw.to_string())
    }

    fn render(&self) -> String {
        self.clone()
    }
}

impl OptionValue for bool {
    const LABEL: &'static str = "bool";

    fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            other => Err(format!("expected true/false, got '{other}'")),
        }
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

impl OptionValue for i64 {
    const LABEL: &'static str = "integer";

    fn parse(raw: &str) -> Result<Self, String> {
        raw.parse().map_err(|e| format!("{e}"))
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

impl OptionValue for u64 {
    const LABEL: &'static str = "integer";

    fn parse(raw: &str) -> Result<Self, String> {
        raw.parse().map_err(|e| format!("{e}"))
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

impl OptionValue for f64 {
    const LABEL: &'static str = "float";

    fn parse(raw: &str) -> Result<Self, String> {
        raw.parse().map_err(|e| format!("{e}"))
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

impl OptionValue for PathBuf {
    const LABEL: &'static str = "path";

    fn parse(raw: &str) -> Result<Self, String> {
        if raw.is_empty() {
            return Err("empty path".to_string());
        }
        Ok(PathBuf::from(raw))
    }

    fn render(&self) -> String {
        self.display().to_string()
    }
}
