//! Checks run before any destructive step.
//!
//! Missing tooling, missing connection settings and a site with no tables
//! in the source are fatal. Unreachable databases, a dirty staging database
//! and unusable object storage only produce warnings; the last one moves
//! archival to the local backup directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::database::{StagingDatabase, TableScope};
use crate::environment::{DbTarget, Environment};
use crate::error::{MigrationError, Result};
use crate::process::{CommandResult, CommandSpec, Effect};
use crate::storage::aws_command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Warning,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

/// Everything preflight found out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub checks: Vec<CheckResult>,
    /// Whether archival should try object storage first.
    pub storage_available: bool,
    /// `None` when staging could not be inspected.
    pub staging_clean: Option<bool>,
    pub source_tables: Option<usize>,
    /// Set when archival will go to local disk.
    pub local_backup_dir: Option<PathBuf>,
}

impl Diagnostics {
    fn record(&mut self, name: &str, status: CheckStatus, message: impl Into<String>) {
        let message = message.into();
        match status {
            CheckStatus::Warning => warn!("Preflight {}: {}", name, message),
            _ => info!("Preflight {}: {:?} {}", name, status, message),
        }
        self.checks.push(CheckResult {
            name: name.to_string(),
            status,
            message,
        });
    }

    /// Messages of every check that ended in a warning.
    pub fn warnings(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Warning)
            .map(|c| format!("{}: {}", c.name, c.message))
            .collect()
    }

    pub fn status_of(&self, name: &str) -> Option<CheckStatus> {
        self.checks.iter().find(|c| c.name == name).map(|c| c.status)
    }
}

/// Runs the preflight checks against the configured databases.
pub struct PreflightValidator {
    staging: StagingDatabase,
}

impl PreflightValidator {
    pub fn new(staging: StagingDatabase) -> Self {
        Self { staging }
    }

    /// Check everything a migration of `scope` from `source` to `target`
    /// depends on. `use_storage` is false when the operator skipped
    /// object storage.
    pub async fn validate(
        &self,
        scope: &TableScope,
        source: Environment,
        target: Environment,
        use_storage: bool,
    ) -> Result<Diagnostics> {
        let mut diag = Diagnostics::default();
        let client = self.staging.client();
        let effector = client.effector();
        let dry_run = effector.is_dry_run();

        // (a) container runtime
        let runtime = &client.config().container.runtime;
        let probe = CommandSpec::new(runtime).args(["info", "--format", "{{.ServerVersion}}"]);
        match effector.run(&probe).await {
            Effect::Simulated => diag.record("runtime", CheckStatus::Skipped, "not probed in a dry run"),
            Effect::Ran(CommandResult::Completed(out)) if out.success() => diag.record(
                "runtime",
                CheckStatus::Passed,
                format!("{} {}", runtime, out.stdout.trim()),
            ),
            Effect::Ran(result) => {
                let message = match result.into_success() {
                    Err(failure) => failure.to_string(),
                    Ok(_) => "unexpected probe result".to_string(),
                };
                return Err(MigrationError::DependencyUnavailable {
                    name: runtime.clone(),
                    message,
                });
            }
        }

        // (b) connection settings, then reachability
        let targets = [DbTarget::Env(source), DbTarget::Env(target), DbTarget::Staging];
        for db in targets {
            client.connection(db)?.password()?;
        }
        diag.record("connections", CheckStatus::Passed, "source, target and staging configured");

        for db in targets {
            let name = format!("reach-{db}");
            if dry_run {
                diag.record(&name, CheckStatus::Skipped, "not probed in a dry run");
                continue;
            }
            match client.ping(db).await {
                Ok(()) => diag.record(&name, CheckStatus::Passed, "reachable"),
                Err(e) => diag.record(&name, CheckStatus::Warning, e.to_string()),
            }
        }

        // (c) site data in the source
        match client.list_tables(DbTarget::Env(source)).await? {
            None => diag.record("source-tables", CheckStatus::Skipped, "not listed in a dry run"),
            Some(all) => {
                let count = scope.select(&all).len();
                if count == 0 {
                    return Err(MigrationError::TenantNotFound {
                        tenant: scope.tenant(),
                        environment: source.to_string(),
                    });
                }
                diag.source_tables = Some(count);
                diag.record(
                    "source-tables",
                    CheckStatus::Passed,
                    format!("{count} tables match {}", scope.pattern()),
                );
            }
        }

        // (d) staging cleanliness
        match self.staging.tables().await {
            Ok(None) => diag.record("staging", CheckStatus::Skipped, "not inspected in a dry run"),
            Ok(Some(tables)) if tables.is_empty() => {
                diag.staging_clean = Some(true);
                diag.record("staging", CheckStatus::Passed, "empty");
            }
            Ok(Some(tables)) => {
                diag.staging_clean = Some(false);
                diag.record(
                    "staging",
                    CheckStatus::Warning,
                    format!("{} leftover tables; will be reset", tables.len()),
                );
            }
            Err(e) => diag.record("staging", CheckStatus::Warning, e.to_string()),
        }

        // (e) object storage
        let storage = client.config().storage.as_ref();
        diag.storage_available = match (use_storage, storage) {
            (false, _) => {
                diag.record("storage", CheckStatus::Skipped, "object storage skipped by operator");
                false
            }
            (true, None) => {
                diag.record("storage", CheckStatus::Skipped, "no object storage configured");
                false
            }
            (true, Some(settings)) => {
                let probe = aws_command(Some(settings), ["sts", "get-caller-identity"]);
                match effector.run(&probe).await {
                    Effect::Simulated => {
                        diag.record("storage", CheckStatus::Skipped, "not probed in a dry run");
                        true
                    }
                    Effect::Ran(result) => match result.into_success() {
                        Ok(_) => {
                            diag.record(
                                "storage",
                                CheckStatus::Passed,
                                format!("credentials valid for {}", settings.bucket),
                            );
                            true
                        }
                        Err(failure) => {
                            diag.record(
                                "storage",
                                CheckStatus::Warning,
                                format!("{failure}; archiving locally"),
                            );
                            false
                        }
                    },
                }
            }
        };

        if !diag.storage_available {
            let backup_root = client.config().backup_root();
            match effector.create_dir_all(&backup_root) {
                Ok(()) => diag.local_backup_dir = Some(backup_root),
                Err(e) => diag.record("backup-dir", CheckStatus::Warning, e.to_string()),
            }
        }

        Ok(diag)
    }
}
