use thiserror::Error;

/// Errors raised by option declaration and resolution.
///
/// Duplicate registration and type mismatches are programming errors and
/// should surface immediately at startup rather than mid-run.
#[derive(Error, Debug)]
pub enum OptionError {
    #[error("duplicate option: '{0}' is already registered")]
    Duplicate(String),

    #[error("unknown option: '{0}'")]
    Unknown(String),

    #[error("option '{name}' expects a {expected}: {message}")]
    Parse {
        name: String,
        expected: &'static str,
        message: String,
    },

    #[error("option '{0}' has no value and no default")]
    NoValue(String),

    #[error("default for option '{name}' failed: {message}")]
    Default { name: String, message: String },
}
