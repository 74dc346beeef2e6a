//! Optional, best-effort sync of a site's uploaded media between buckets.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::{ExecutionConfig, MigratorConfig};
use crate::environment::Environment;
use crate::error::{MigrationError, Result};
use crate::process::{CommandSpec, Effect, Effector};
use crate::storage::aws_command;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSyncSummary {
    pub source_uri: String,
    pub target_uri: String,
    /// Objects copied, from the CLI's `copy:` lines.
    pub copied: usize,
    pub simulated: bool,
}

/// Mirrors `wp-content/uploads` for one site from the source media
/// bucket to the target's.
pub struct FileSync {
    effector: Arc<dyn Effector>,
    config: Arc<MigratorConfig>,
}

impl FileSync {
    pub fn new(effector: Arc<dyn Effector>, config: Arc<MigratorConfig>) -> Self {
        Self { effector, config }
    }

    fn bucket(&self, env: Environment) -> Result<&str> {
        self.config
            .file_buckets
            .get(&env)
            .map(String::as_str)
            .ok_or_else(|| MigrationError::FileSync {
                message: format!("no media bucket configured for {env}"),
            })
    }

    pub fn command(&self, tenant: u64, source: Environment, target: Environment) -> Result<CommandSpec> {
        let (from, to) = (self.bucket(source)?, self.bucket(target)?);
        let path = if tenant == crate::config::TableConfig::MAIN_SITE_ID {
            "wp-content/uploads/".to_string()
        } else {
            format!("wp-content/uploads/sites/{tenant}/")
        };

        let mut spec = aws_command(
            self.config.storage.as_ref(),
            [
                "s3".to_string(),
                "sync".to_string(),
                format!("s3://{from}/{path}"),
                format!("s3://{to}/{path}"),
                "--no-progress".to_string(),
            ],
        )
        .timeout(ExecutionConfig::FILE_SYNC_TIMEOUT)
        .mutating();

        // The main site's uploads directory also holds every other site's.
        if tenant == crate::config::TableConfig::MAIN_SITE_ID {
            spec = spec.args(["--exclude", "sites/*"]);
        }
        Ok(spec)
    }

    /// Run the sync. Every failure is a `FileSync` error, which the
    /// orchestrator downgrades to a warning.
    pub async fn sync(&self, tenant: u64, source: Environment, target: Environment) -> Result<FileSyncSummary> {
        let spec = self.command(tenant, source, target)?;
        let source_uri = spec.args[2].clone();
        let target_uri = spec.args[3].clone();
        info!("Syncing media {} -> {}", source_uri, target_uri);

        let output = match self.effector.run(&spec).await {
            Effect::Simulated => {
                return Ok(FileSyncSummary {
                    source_uri,
                    target_uri,
                    copied: 0,
                    simulated: true,
                })
            }
            Effect::Ran(result) => result.into_success().map_err(|failure| MigrationError::FileSync {
                message: failure.to_string(),
            })?,
        };

        let copied = output
            .stdout
            .lines()
            .filter(|l| l.trim_start().starts_with("copy:"))
            .count();
        info!("Media sync copied {} objects", copied);

        Ok(FileSyncSummary {
            source_uri,
            target_uri,
            copied,
            simulated: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::ScriptedRunner;
    use crate::process::{effector_for, CommandOutput, CommandResult};

    fn config() -> Arc<MigratorConfig> {
        Arc::new(
            MigratorConfig::from_json_str(
                r#"{"file_buckets": {"prod": "media-prod", "pprd": "media-pprd"}}"#,
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_sync_site_uploads() {
        let runner = Arc::new(ScriptedRunner::always(CommandOutput::ok(
            "copy: s3://media-prod/a.jpg to s3://media-pprd/a.jpg\ncopy: s3://media-prod/b.jpg to s3://media-pprd/b.jpg\n",
        )));
        let sync = FileSync::new(effector_for(false, runner.clone()), config());

        let summary = sync.sync(43, Environment::Prod, Environment::Pprd).await.unwrap();
        assert_eq!(summary.copied, 2);
        assert_eq!(summary.source_uri, "s3://media-prod/wp-content/uploads/sites/43/");
        assert_eq!(summary.target_uri, "s3://media-pprd/wp-content/uploads/sites/43/");
        assert!(runner.calls()[0].is_mutating());
    }

    #[test]
    fn test_main_site_excludes_other_sites() {
        let runner = Arc::new(ScriptedRunner::always(CommandOutput::ok("")));
        let sync = FileSync::new(effector_for(false, runner), config());
        let spec = sync.command(1, Environment::Prod, Environment::Pprd).unwrap();
        assert_eq!(spec.args[2], "s3://media-prod/wp-content/uploads/");
        assert_eq!(spec.arg_after("--exclude"), Some("sites/*"));
    }

    #[tokio::test]
    async fn test_missing_bucket_is_file_sync_error() {
        let runner = Arc::new(ScriptedRunner::always(CommandOutput::ok("")));
        let sync = FileSync::new(effector_for(false, runner.clone()), config());
        let err = sync.sync(43, Environment::Prod, Environment::Dev).await.unwrap_err();
        assert!(matches!(err, MigrationError::FileSync { .. }));
        assert!(err.is_recoverable());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cli_failure_is_file_sync_error() {
        let runner = Arc::new(ScriptedRunner::new(|_| CommandResult::TimedOut(ExecutionConfig::FILE_SYNC_TIMEOUT)));
        let sync = FileSync::new(effector_for(false, runner), config());
        let err = sync.sync(43, Environment::Prod, Environment::Pprd).await.unwrap_err();
        assert!(matches!(err, MigrationError::FileSync { .. }));
    }
}
