use thiserror::Error;

/// Errors raised by the subprocess wrapper.
#[derive(Error, Debug)]
pub enum ProcError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("'{program}' exited with status {code}{}", render_stderr_tail(.stderr_tail))]
    ExitStatus {
        program: String,
        code: i32,
        stderr_tail: String,
    },

    #[error("'{program}' was terminated by a signal")]
    Signalled { program: String },

    #[error("stream io error on {stream} of '{program}': {source}")]
    StreamIo {
        program: String,
        stream: &'static str,
        source: std::io::Error,
    },

    #[error("'{program}' was cancelled")]
    Cancelled { program: String },
}

fn render_stderr_tail(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!("\nstderr (tail):\n{tail}")
    }
}
