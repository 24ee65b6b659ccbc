//! External process execution
//!
//! Handles running the tools a build is made of (dotnet, docker, pulumi, git):
//! - Launching a process with arguments, working directory and environment
//! - Streaming its output into the log while capturing it
//! - Reporting launch failures and non-zero exits as structured errors
//!
//! The runner never imposes a timeout. Dropping the future of a running
//! command kills the child process, which is how interrupts stop a target.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tracing::{debug, info};

use crate::redact::Redactor;

/// A command to execute
#[derive(Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Written to the child's stdin, then stdin is closed
    pub stdin: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Command line with secrets masked
    pub fn display(&self, redactor: &Redactor) -> String {
        redactor.command_line(&self.program, &self.args)
    }
}

impl fmt::Debug for CommandSpec {
    // env values and stdin routinely carry credentials
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("cwd", &self.cwd)
            .field(
                "env",
                &self.env.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            )
            .field("stdin", &self.stdin.as_ref().map(|_| "<elided>"))
            .finish()
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turns a non-zero exit into a [`CommandFailure`]
    pub fn check(self, spec: &CommandSpec, redactor: &Redactor) -> Result<Self, CommandFailure> {
        if self.success() {
            return Ok(self);
        }
        Err(CommandFailure {
            command: spec.display(redactor),
            exit_code: self.exit_code,
            stderr: redactor.redact(self.stderr.trim()),
        })
    }
}

/// The process could not be started or waited on
#[derive(Debug, Error)]
#[error("Failed to launch `{command}`: {source}")]
pub struct LaunchError {
    /// Redacted command line
    pub command: String,
    #[source]
    pub source: std::io::Error,
}

/// The process ran and exited with a non-zero code
#[derive(Debug, Clone, Error)]
#[error("Command `{command}` failed with exit code {exit_code}")]
pub struct CommandFailure {
    /// Redacted command line
    pub command: String,
    pub exit_code: i32,
    /// Redacted standard error
    pub stderr: String,
}

/// Launches external commands
///
/// Implemented by [`SystemCommandRunner`] for real processes and by test
/// doubles that record what would have run.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs a command to completion
    ///
    /// # Arguments
    /// * `spec` - What to run
    /// * `redactor` - Applied to everything that gets logged
    ///
    /// # Returns
    /// Exit code and captured output; a non-zero exit is not an error here
    async fn run(&self, spec: &CommandSpec, redactor: &Redactor)
    -> Result<CommandOutput, LaunchError>;
}

/// Runs commands as child processes of this process
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner {
    /// Log output lines at info instead of debug
    echo_output: bool,
}

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_echo(mut self, echo_output: bool) -> Self {
        self.echo_output = echo_output;
        self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        redactor: &Redactor,
    ) -> Result<CommandOutput, LaunchError> {
        let line = spec.display(redactor);
        debug!("Executing: {}", line);

        let launch_error = |source| LaunchError {
            command: line.clone(),
            source,
        };

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(launch_error)?;

        // Fed alongside the readers; the exit status decides the outcome
        let feed = feed_stdin(spec.stdin.as_deref(), child.stdin.take(), &spec.program);
        let (_, stdout, stderr, status) = tokio::join!(
            feed,
            capture(child.stdout.take(), &spec.program, self.echo_output, redactor),
            capture(child.stderr.take(), &spec.program, self.echo_output, redactor),
            child.wait(),
        );
        let status = status.map_err(launch_error)?;

        // Killed by a signal: no code, report as failure
        let exit_code = status.code().unwrap_or(-1);
        debug!(
            "Command finished: exit_code={}, stdout_len={}, stderr_len={}",
            exit_code,
            stdout.len(),
            stderr.len()
        );

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}

/// Writes `input` to the child, then closes its stdin
async fn feed_stdin(input: Option<&str>, stdin: Option<ChildStdin>, program: &str) {
    let (Some(input), Some(mut stdin)) = (input, stdin) else {
        return;
    };
    if let Err(e) = stdin.write_all(input.as_bytes()).await {
        debug!("[{}] stopped reading stdin: {}", program, e);
    }
}

/// Reads a child stream line by line, logging and collecting it
async fn capture<R>(reader: Option<R>, program: &str, echo: bool, redactor: &Redactor) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };

    let mut captured = String::new();
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let shown = redactor.redact(&line);
        if echo {
            info!("[{}] {}", program, shown);
        } else {
            debug!("[{}] {}", program, shown);
        }
        captured.push_str(&line);
        captured.push('\n');
    }

    captured
}
