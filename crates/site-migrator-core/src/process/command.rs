//! Typed description and result of an external command.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::ExecutionConfig;

/// Whether a command changes state outside the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    ReadOnly,
    Mutating,
}

/// An external command to run.
///
/// Environment values are passed to the child but never shown by
/// `Display`, which is what gets logged.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
    pub kind: CommandKind,
    /// Name given to the container this command starts, if any. Killing
    /// the runtime client does not stop the container, so timeouts kill
    /// it by name.
    pub container: Option<String>,
}

/// Unique container name for one tool invocation of this process.
pub fn container_name(tool: &str) -> String {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    format!(
        "site-migrate-{}-{}-{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed),
        tool
    )
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: ExecutionConfig::PROBE_TIMEOUT,
            kind: CommandKind::ReadOnly,
            container: None,
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn mutating(mut self) -> Self {
        self.kind = CommandKind::Mutating;
        self
    }

    pub fn is_mutating(&self) -> bool {
        self.kind == CommandKind::Mutating
    }

    /// Name the started container (`--name`) so it can be killed later.
    pub fn container(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.args.push("--name".to_string());
        self.args.push(name.clone());
        self.container = Some(name);
        self
    }

    /// Value following the last occurrence of `flag`.
    ///
    /// Container flags precede the image and tool flags follow it, so the
    /// last occurrence is the tool's (`-e` is both an environment flag for
    /// `docker run` and the statement flag for `mysql`).
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .rposition(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, _) in &self.env {
            write!(f, "{key}=<redacted> ")?;
        }
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg.replace('\'', "'\\''"))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last lines of stderr, for error messages.
    pub fn stderr_tail(&self) -> String {
        let lines: Vec<&str> = self.stderr.lines().collect();
        let start = lines.len().saturating_sub(ExecutionConfig::STDERR_TAIL_LINES);
        lines[start..].join("\n")
    }
}

/// Outcome of running a command.
#[derive(Debug, Clone)]
pub enum CommandResult {
    Completed(CommandOutput),
    TimedOut(Duration),
    SpawnFailed(String),
}

/// Why a command did not succeed.
#[derive(Debug, Clone)]
pub enum CommandFailure {
    NonZero(CommandOutput),
    TimedOut(Duration),
    SpawnFailed(String),
}

impl CommandResult {
    /// Successful output, or the reason there is none.
    pub fn into_success(self) -> Result<CommandOutput, CommandFailure> {
        match self {
            CommandResult::Completed(out) if out.success() => Ok(out),
            CommandResult::Completed(out) => Err(CommandFailure::NonZero(out)),
            CommandResult::TimedOut(after) => Err(CommandFailure::TimedOut(after)),
            CommandResult::SpawnFailed(msg) => Err(CommandFailure::SpawnFailed(msg)),
        }
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandFailure::NonZero(out) => {
                match out.exit_code {
                    Some(code) => write!(f, "exited with status {code}")?,
                    None => write!(f, "terminated by signal")?,
                }
                let tail = out.stderr_tail();
                if !tail.is_empty() {
                    write!(f, ": {tail}")?;
                }
                Ok(())
            }
            CommandFailure::TimedOut(after) => write!(f, "timed out after {after:?}"),
            CommandFailure::SpawnFailed(msg) => write!(f, "could not start: {msg}"),
        }
    }
}
