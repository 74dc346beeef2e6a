//! Execution-mode switch for every side effect of a run.
//!
//! Stages never branch on dry-run themselves. They hand commands and
//! filesystem mutations to an `Effector`; `RealEffector` performs them and
//! `NoOpEffector` only records what would have happened.

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use super::command::{CommandResult, CommandSpec};
use super::runner::CommandRunner;
use crate::error::{MigrationError, Result};
use crate::fsutil;

/// Result of handing a command to an effector.
#[derive(Debug, Clone)]
pub enum Effect {
    Ran(CommandResult),
    Simulated,
}

/// Performs (or simulates) the side effects of a run.
#[async_trait]
pub trait Effector: Send + Sync {
    fn is_dry_run(&self) -> bool;

    async fn run(&self, spec: &CommandSpec) -> Effect;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Copy a file, returning the number of bytes copied.
    fn copy_file(&self, from: &Path, to: &Path) -> Result<u64>;

    /// Write a file atomically.
    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    fn remove_file(&self, path: &Path) -> Result<()>;

    fn remove_dir_all(&self, path: &Path) -> Result<()>;

    /// Human-readable list of the actions that were only simulated.
    fn planned_actions(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Build the effector for a run.
pub fn effector_for(dry_run: bool, runner: Arc<dyn CommandRunner>) -> Arc<dyn Effector> {
    if dry_run {
        Arc::new(NoOpEffector::new())
    } else {
        Arc::new(RealEffector::new(runner))
    }
}

/// Forwards commands to a runner and touches the real filesystem.
pub struct RealEffector {
    runner: Arc<dyn CommandRunner>,
}

impl RealEffector {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Stop a container left running after its client was killed.
    async fn kill_container(&self, runtime: &str, name: &str) {
        let kill = CommandSpec::new(runtime).args(["kill", name]).mutating();
        match self.runner.run(&kill).await.into_success() {
            Ok(_) => info!("Killed timed-out container {}", name),
            Err(e) => warn!("Could not kill timed-out container {}: {}", name, e),
        }
    }
}

#[async_trait]
impl Effector for RealEffector {
    fn is_dry_run(&self) -> bool {
        false
    }

    async fn run(&self, spec: &CommandSpec) -> Effect {
        let result = self.runner.run(spec).await;
        if let (CommandResult::TimedOut(_), Some(name)) = (&result, &spec.container) {
            self.kill_container(&spec.program, name).await;
        }
        Effect::Ran(result)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|e| MigrationError::io("creating directory", path, e))
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<u64> {
        fs::copy(from, to).map_err(|e| {
            MigrationError::io(&format!("copying {} to", from.display()), to, e)
        })
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        fsutil::atomic_write(path, contents)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).map_err(|e| MigrationError::io("renaming", from, e))
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).map_err(|e| MigrationError::io("removing file", path, e))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path).map_err(|e| MigrationError::io("removing directory", path, e))
    }
}

/// Logs every action instead of performing it.
#[derive(Debug, Default)]
pub struct NoOpEffector {
    planned: Mutex<Vec<String>>,
}

impl NoOpEffector {
    pub fn new() -> Self {
        Self::default()
    }

    fn plan(&self, action: String) {
        info!("[dry-run] would {}", action);
        self.planned
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(action);
    }
}

#[async_trait]
impl Effector for NoOpEffector {
    fn is_dry_run(&self) -> bool {
        true
    }

    async fn run(&self, spec: &CommandSpec) -> Effect {
        self.plan(format!("run: {spec}"));
        Effect::Simulated
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.plan(format!("create directory {}", path.display()));
        Ok(())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<u64> {
        self.plan(format!("copy {} to {}", from.display(), to.display()));
        Ok(0)
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.plan(format!("write {} ({} bytes)", path.display(), contents.len()));
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.plan(format!("rename {} to {}", from.display(), to.display()));
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.plan(format!("remove {}", path.display()));
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.plan(format!("remove directory {}", path.display()));
        Ok(())
    }

    fn planned_actions(&self) -> Vec<String> {
        self.planned
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::ScriptedRunner;
    use crate::process::CommandOutput;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_noop_never_reaches_runner() {
        let runner = Arc::new(ScriptedRunner::always(CommandOutput::ok("")));
        let effector = effector_for(true, runner.clone());
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("run");

        let effect = effector
            .run(&CommandSpec::new("docker").arg("info").mutating())
            .await;
        assert!(matches!(effect, Effect::Simulated));
        effector.create_dir_all(&dir).unwrap();
        effector.write_file(&dir.join("x"), b"data").unwrap();

        assert!(runner.calls().is_empty());
        assert!(!dir.exists());
        assert_eq!(effector.planned_actions().len(), 3);
        assert!(effector.is_dry_run());
    }

    #[tokio::test]
    async fn test_real_forwards_to_runner() {
        let runner = Arc::new(ScriptedRunner::always(CommandOutput::ok("42")));
        let effector = effector_for(false, runner.clone());

        match effector.run(&CommandSpec::new("mysql")).await {
            Effect::Ran(CommandResult::Completed(out)) => assert_eq!(out.stdout, "42"),
            other => panic!("unexpected effect: {other:?}"),
        }
        assert_eq!(runner.calls().len(), 1);
        assert!(effector.planned_actions().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_kills_named_container() {
        let runner = Arc::new(ScriptedRunner::new(|spec| {
            if spec.args.first().map(String::as_str) == Some("kill") {
                CommandResult::Completed(CommandOutput::ok("site-migrate-1-0-mysqldump"))
            } else {
                CommandResult::TimedOut(spec.timeout)
            }
        }));
        let effector = effector_for(false, runner.clone());
        let spec = CommandSpec::new("docker")
            .args(["run", "--rm"])
            .container("site-migrate-1-0-mysqldump")
            .args(["mysql:8.0", "mysqldump"]);

        let effect = effector.run(&spec).await;
        assert!(matches!(effect, Effect::Ran(CommandResult::TimedOut(_))));

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].program, "docker");
        assert_eq!(calls[1].args, vec!["kill", "site-migrate-1-0-mysqldump"]);
    }

    #[tokio::test]
    async fn test_failed_kill_keeps_timeout_result() {
        let runner = Arc::new(ScriptedRunner::new(|spec| {
            if spec.args.first().map(String::as_str) == Some("kill") {
                CommandResult::Completed(CommandOutput::failed(1, "No such container"))
            } else {
                CommandResult::TimedOut(spec.timeout)
            }
        }));
        let effector = effector_for(false, runner.clone());
        let spec = CommandSpec::new("docker").arg("run").container("gone");

        let effect = effector.run(&spec).await;
        assert!(matches!(effect, Effect::Ran(CommandResult::TimedOut(_))));
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_without_container_is_not_killed() {
        let runner = Arc::new(ScriptedRunner::new(|spec| CommandResult::TimedOut(spec.timeout)));
        let effector = effector_for(false, runner.clone());

        effector.run(&CommandSpec::new("aws").args(["s3", "sync"])).await;
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_real_filesystem_operations() {
        let runner = Arc::new(ScriptedRunner::always(CommandOutput::ok("")));
        let effector = RealEffector::new(runner);
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("a/b");

        effector.create_dir_all(&dir).unwrap();
        effector.write_file(&dir.join("one.sql"), b"select 1;").unwrap();
        let copied = effector
            .copy_file(&dir.join("one.sql"), &dir.join("two.sql"))
            .unwrap();
        assert_eq!(copied, 9);
        effector.remove_file(&dir.join("one.sql")).unwrap();
        assert!(!dir.join("one.sql").exists());
        effector.remove_dir_all(&dir).unwrap();
        assert!(!dir.exists());
    }
}
