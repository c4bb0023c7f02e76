//! External command execution.
//!
//! Every interaction with `aws`, `eksctl`, `helm` and `kubectl` goes through
//! [`CommandRunner`]. Callers choose per call whether a non-zero exit aborts
//! the workflow and whether stdout is captured or streamed to the log. The
//! runner never interprets output; classification is left to the caller.

use std::fmt;
use std::io;
use std::process::Stdio;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout, Command};
use tracing::{info, warn};

use crate::{Error, Result};

/// A program invocation. Arguments are passed verbatim, no shell is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
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

    /// Feed `input` to the child's standard input.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn kubectl() -> Self {
        Self::new("kubectl")
    }

    pub fn helm() -> Self {
        Self::new("helm")
    }

    pub fn eksctl() -> Self {
        Self::new("eksctl")
    }

    pub fn aws() -> Self {
        Self::new("aws")
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Runs external commands.
///
/// Returns `Ok(Some(text))` on success, where `text` is the trimmed stdout when
/// `capture` is set and empty otherwise. A failure returns
/// `Err(Error::CommandFailed)` when `fail_on_error` is set and `Ok(None)`
/// otherwise.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, cmd: &Cmd, fail_on_error: bool, capture: bool) -> Result<Option<String>>;
}

/// Convenience wrappers for the four run modes.
#[async_trait]
pub trait RunnerExt {
    /// Stream output; any failure is fatal.
    async fn check(&self, cmd: &Cmd) -> Result<()>;
    /// Capture output; any failure is fatal.
    async fn capture(&self, cmd: &Cmd) -> Result<String>;
    /// Stream output; returns whether the command succeeded.
    async fn try_run(&self, cmd: &Cmd) -> Result<bool>;
    /// Capture output; `None` if the command failed.
    async fn try_capture(&self, cmd: &Cmd) -> Result<Option<String>>;
}

#[async_trait]
impl<R: CommandRunner + ?Sized> RunnerExt for R {
    async fn check(&self, cmd: &Cmd) -> Result<()> {
        self.run(cmd, true, false).await.map(|_| ())
    }

    async fn capture(&self, cmd: &Cmd) -> Result<String> {
        Ok(self.run(cmd, true, true).await?.unwrap_or_default())
    }

    async fn try_run(&self, cmd: &Cmd) -> Result<bool> {
        Ok(self.run(cmd, false, false).await?.is_some())
    }

    async fn try_capture(&self, cmd: &Cmd) -> Result<Option<String>> {
        self.run(cmd, false, true).await
    }
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `cmd` to completion. `Err` carries the failure message; I/O
    /// errors on the child's pipes count as a failed command. The child is
    /// always awaited once spawned.
    async fn execute(&self, cmd: &Cmd, capture: bool) -> std::result::Result<String, String> {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(if cmd.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(if capture {
                Stdio::piped()
            } else {
                Stdio::inherit()
            });

        let mut child = command
            .spawn()
            .map_err(|e| format!("failed to start {}: {}", cmd.program, e))?;
        let feed = feed_stdin(child.stdin.take(), cmd.stdin.as_deref());

        if capture {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            let output = output.map_err(|e| format!("failed to collect output: {}", e))?;
            fed.map_err(|e| format!("failed to write stdin: {}", e))?;
            if output.status.success() {
                return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
            }
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            });
        }

        let (fed, streamed) = tokio::join!(feed, stream_lines(child.stdout.take()));
        let status = child
            .wait()
            .await
            .map_err(|e| format!("failed to wait for {}: {}", cmd.program, e))?;
        fed.map_err(|e| format!("failed to write stdin: {}", e))?;
        streamed.map_err(|e| format!("failed to read output: {}", e))?;
        if status.success() {
            Ok(String::new())
        } else {
            Err(status.to_string())
        }
    }
}

async fn feed_stdin(stdin: Option<ChildStdin>, input: Option<&str>) -> io::Result<()> {
    if let (Some(mut stdin), Some(input)) = (stdin, input) {
        stdin.write_all(input.as_bytes()).await?;
    }
    Ok(())
}

/// Forward stdout to the log line by line, decoding lossily.
async fn stream_lines(stdout: Option<ChildStdout>) -> io::Result<()> {
    let Some(stdout) = stdout else {
        return Ok(());
    };
    let mut reader = BufReader::new(stdout);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(());
        }
        info!("{}", String::from_utf8_lossy(&line).trim_end());
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, cmd: &Cmd, fail_on_error: bool, capture: bool) -> Result<Option<String>> {
        info!("Running: {}", cmd);
        match self.execute(cmd, capture).await {
            Ok(stdout) => Ok(Some(stdout)),
            Err(message) if fail_on_error => Err(Error::command_failed(cmd.to_string(), message)),
            Err(message) => {
                warn!(command = %cmd, "Command failed (ignored): {}", message);
                Ok(None)
            }
        }
    }
}
