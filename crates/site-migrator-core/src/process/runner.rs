//! Command execution seam.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::command::{CommandOutput, CommandResult, CommandSpec};

/// Runs external commands.
///
/// The production implementation spawns real processes; tests substitute a
/// scripted runner so that stage logic can be exercised without tooling.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> CommandResult;
}

/// Spawns commands with `tokio::process`, killing them on timeout.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> CommandResult {
        debug!("Running: {}", spec);

        let child = Command::new(&spec.program)
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => return CommandResult::SpawnFailed(format!("{}: {e}", spec.program)),
        };

        // Dropping the wait future on timeout drops the child, which kills it.
        match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let result = CommandOutput {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                };
                debug!(
                    "{} exited with {:?} ({} bytes stdout)",
                    spec.program,
                    result.exit_code,
                    result.stdout.len()
                );
                CommandResult::Completed(result)
            }
            Ok(Err(e)) => CommandResult::SpawnFailed(format!("{}: {e}", spec.program)),
            Err(_) => CommandResult::TimedOut(spec.timeout),
        }
    }
}
