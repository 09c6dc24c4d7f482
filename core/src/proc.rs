//! Cancellable subprocess execution.
//!
//! Wraps `tokio::process` with the guarantees the engine's cancellation
//! contract needs: output is streamed line-by-line to a caller-supplied
//! handler, and a cancelled run kills and reaps the child before
//! returning. Children are additionally armed with `kill_on_drop` so
//! even a dropped future cannot leak one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ProcError;
use crate::exec::EventScope;

const STDERR_TAIL_BYTES: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of child output, as delivered to the streaming handler.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// Captured result of a completed subprocess.
#[derive(Debug, Clone)]
pub struct ProcOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Builder for one subprocess invocation.
#[derive(Debug, Clone)]
pub struct Exec {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env_add: Vec<(String, String)>,
    env_replace: Option<HashMap<String, String>>,
}

impl Exec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env_add: Vec::new(),
            env_replace: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Add one variable on top of the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_add.push((key.into(), value.into()));
        self
    }

    /// Replace the child's environment wholesale, e.g. with a scraped
    /// toolchain environment.
    pub fn env_replace(mut self, env: HashMap<String, String>) -> Self {
        self.env_replace = Some(env);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(env) = &self.env_replace {
            cmd.env_clear();
            cmd.envs(env);
        }
        for (key, value) in &self.env_add {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run to completion, failing on a non-zero exit status.
    pub async fn run<F>(
        &self,
        cancel: &CancellationToken,
        on_line: F,
    ) -> Result<ProcOutput, ProcError>
    where
        F: FnMut(&OutputLine),
    {
        let output = self.run_unchecked(cancel, on_line).await?;
        if output.code != 0 {
            return Err(ProcError::ExitStatus {
                program: self.program.clone(),
                code: output.code,
                stderr_tail: tail(&output.stderr),
            });
        }
        Ok(output)
    }

    /// Run to completion without output streaming.
    pub async fn run_quiet(&self, cancel: &CancellationToken) -> Result<ProcOutput, ProcError> {
        self.run(cancel, |_| {}).await
    }

    /// Run to completion, forwarding each output line to `scope` as a
    /// status event.
    pub async fn run_logged(
        &self,
        scope: &EventScope,
        cancel: &CancellationToken,
    ) -> Result<ProcOutput, ProcError> {
        self.run(cancel, |line| scope.status(line.text.clone())).await
    }

    /// Run to completion, returning the exit status to the caller instead
    /// of failing on it.
    pub async fn run_unchecked<F>(
        &self,
        cancel: &CancellationToken,
        mut on_line: F,
    ) -> Result<ProcOutput, ProcError>
    where
        F: FnMut(&OutputLine),
    {
        let mut child = self.command().spawn().map_err(|source| ProcError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let (line_tx, mut line_rx) = mpsc::channel::<OutputLine>(64);
        let stdout_pump = child
            .stdout
            .take()
            .map(|rd| pump_lines(rd, OutputStream::Stdout, line_tx.clone()));
        let stderr_pump = child
            .stderr
            .take()
            .map(|rd| pump_lines(rd, OutputStream::Stderr, line_tx.clone()));
        drop(line_tx);

        let mut stdout = String::new();
        let mut stderr = String::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(self.kill_cancelled(child).await);
                }
                line = line_rx.recv() => match line {
                    Some(line) => {
                        let sink = match line.stream {
                            OutputStream::Stdout => &mut stdout,
                            OutputStream::Stderr => &mut stderr,
                        };
                        sink.push_str(&line.text);
                        sink.push('\n');
                        on_line(&line);
                    }
                    // Both pipes are closed; the child is exiting.
                    None => break,
                }
            }
        }

        for (pump, stream) in [(stdout_pump, "stdout"), (stderr_pump, "stderr")] {
            if let Some(pump) = pump {
                join_pump(pump, &self.program, stream).await?;
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(self.kill_cancelled(child).await);
            }
            status = child.wait() => status.map_err(|source| ProcError::StreamIo {
                program: self.program.clone(),
                stream: "wait",
                source,
            })?,
        };

        let code = status.code().ok_or_else(|| ProcError::Signalled {
            program: self.program.clone(),
        })?;

        Ok(ProcOutput {
            code,
            stdout,
            stderr,
        })
    }

    /// Start a long-lived helper process (e.g. a temporary test server).
    /// The returned guard kills and reaps it on [`ChildGuard::stop`], and
    /// the child is armed to die with the guard if the guard is dropped.
    pub fn spawn(&self) -> Result<ChildGuard, ProcError> {
        let mut cmd = self.command();
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        let child = cmd.spawn().map_err(|source| ProcError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        Ok(ChildGuard {
            child,
            program: self.program.clone(),
        })
    }

    async fn kill_cancelled(&self, mut child: Child) -> ProcError {
        // kill() both signals and reaps the child.
        if let Err(e) = child.kill().await {
            tracing::warn!(program = %self.program, "failed to kill cancelled child: {e}");
        }
        ProcError::Cancelled {
            program: self.program.clone(),
        }
    }
}

/// Guard over a long-lived child process.
pub struct ChildGuard {
    child: Child,
    program: String,
}

impl ChildGuard {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kill the child and wait for it to be reaped.
    pub async fn stop(mut self) -> Result<(), ProcError> {
        self.child
            .kill()
            .await
            .map_err(|source| ProcError::StreamIo {
                program: self.program.clone(),
                stream: "kill",
                source,
            })
    }
}

fn pump_lines<R>(
    rd: R,
    stream: OutputStream,
    tx: mpsc::Sender<OutputLine>,
) -> JoinHandle<Result<(), std::io::Error>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(rd).lines();
        while let Some(text) = lines.next_line().await? {
            if tx.send(OutputLine { stream, text }).await.is_err() {
                break;
            }
        }
        Ok(())
    })
}

async fn join_pump(
    pump: JoinHandle<Result<(), std::io::Error>>,
    program: &str,
    stream: &'static str,
) -> Result<(), ProcError> {
    match pump.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(ProcError::StreamIo {
            program: program.to_string(),
            stream,
            source,
        }),
        Err(join_err) => Err(ProcError::StreamIo {
            program: program.to_string(),
            stream,
            source: std::io::Error::other(join_err),
        }),
    }
}

fn tail(text: &str) -> String {
    if text.len() <= STDERR_TAIL_BYTES {
        return text.trim_end().to_string();
    }
    let start = text.len() - STDERR_TAIL_BYTES;
    // Avoid splitting a UTF-8 sequence.
    let start = (start..text.len())
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0);
    text[start..].trim_end().to_string()
}

/// Search `PATH` for an executable, honouring `PATHEXT` on Windows.
pub fn which(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    let exts: Vec<String> = if cfg!(windows) {
        std::env::var("PATHEXT")
            .unwrap_or_default()
            .split(';')
            .map(|s| s.to_string())
            .collect()
    } else {
        vec![String::new()]
    };

    for dir in std::env::split_paths(&paths) {
        for ext in &exts {
            let candidate = dir.join(format!("{program}{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}
