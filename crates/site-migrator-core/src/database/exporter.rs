//! Dump a site's tables to a SQL file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{DatabaseClient, TableScope};
use crate::config::PathsConfig;
use crate::environment::DbTarget;
use crate::error::{MigrationError, Result};
use crate::process::{CommandFailure, Effect};

/// What an export produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub table_count: usize,
    pub byte_size: u64,
    pub tables: Vec<String>,
    /// True when the dump was only planned (dry run).
    pub simulated: bool,
}

/// Runs `mysqldump` for one site's tables.
pub struct TableExporter {
    client: DatabaseClient,
}

impl TableExporter {
    pub fn new(client: DatabaseClient) -> Self {
        Self { client }
    }

    /// Dump the site's tables in `source` to `destination`.
    ///
    /// Fails with `TenantNotFound` when the site has no tables there, with
    /// `ExportTimeout` when the dump exceeds `timeout`, and with
    /// `ExportProcess` on any other failure. A dump that did not finish is
    /// renamed to `*.partial` so it cannot be imported by mistake.
    pub async fn export(
        &self,
        scope: &TableScope,
        source: DbTarget,
        destination: &Path,
        timeout: Duration,
    ) -> Result<ExportSummary> {
        let tables = match self.client.list_tables(source).await? {
            Some(all) => {
                let selected = scope.select(&all);
                if selected.is_empty() {
                    return Err(MigrationError::TenantNotFound {
                        tenant: scope.tenant(),
                        environment: source.to_string(),
                    });
                }
                Some(selected)
            }
            None => None,
        };

        let dir = destination.parent().ok_or_else(|| MigrationError::ExportProcess {
            environment: source.to_string(),
            message: format!("invalid destination {}", destination.display()),
        })?;
        let file_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let database = self.client.connection(source)?.database.clone();
        let spec = self
            .client
            .tool_command(source, "mysqldump", Some(dir), timeout)?
            .args([
                "--single-transaction",
                "--quick",
                "--skip-lock-tables",
                "--no-tablespaces",
                "--set-gtid-purged=OFF",
                "--default-character-set=utf8mb4",
            ])
            .arg(format!(
                "--result-file={}/{}",
                PathsConfig::CONTAINER_WORK_DIR,
                file_name
            ))
            .arg(database)
            .args(tables.clone().unwrap_or_else(|| vec![scope.pattern()]))
            .mutating();

        info!(
            "Exporting site {} tables ({}) from {} to {}",
            scope.tenant(),
            scope.pattern(),
            source,
            destination.display()
        );

        let result = match self.client.effector().run(&spec).await {
            Effect::Simulated => {
                return Ok(ExportSummary {
                    simulated: true,
                    ..Default::default()
                })
            }
            Effect::Ran(result) => result,
        };

        if let Err(failure) = result.into_success() {
            self.quarantine(destination);
            return Err(match failure {
                CommandFailure::TimedOut(after) => MigrationError::ExportTimeout {
                    environment: source.to_string(),
                    after,
                },
                other => MigrationError::ExportProcess {
                    environment: source.to_string(),
                    message: other.to_string(),
                },
            });
        }

        let byte_size = std::fs::metadata(destination)
            .map(|m| m.len())
            .map_err(|e| MigrationError::ExportProcess {
                environment: source.to_string(),
                message: format!("dump finished but {} is unreadable: {e}", destination.display()),
            })?;
        if byte_size == 0 {
            return Err(MigrationError::ExportProcess {
                environment: source.to_string(),
                message: format!("dump {} is empty", destination.display()),
            });
        }

        let tables = tables.unwrap_or_default();
        debug!("Exported tables: {}", tables.join(", "));
        info!(
            "Exported {} tables ({} bytes) from {}",
            tables.len(),
            byte_size,
            source
        );

        Ok(ExportSummary {
            table_count: tables.len(),
            byte_size,
            tables,
            simulated: false,
        })
    }

    fn quarantine(&self, destination: &Path) {
        if !destination.exists() {
            return;
        }
        let partial = destination.with_extension("sql.partial");
        if let Err(e) = self.client.effector().rename(destination, &partial) {
            warn!("Could not set aside incomplete dump {}: {}", destination.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::config;
    use crate::environment::Environment;
    use crate::process::testing::ScriptedRunner;
    use crate::process::{effector_for, CommandOutput, CommandResult, CommandSpec};
    use std::sync::Arc;
    use tempfile::TempDir;

    const PROD: DbTarget = DbTarget::Env(Environment::Prod);

    fn is_show_tables(spec: &CommandSpec) -> bool {
        spec.args.iter().any(|a| a == "SHOW TABLES")
    }

    fn exporter_with(
        handler: impl Fn(&CommandSpec) -> CommandResult + Send + Sync + 'static,
    ) -> (TableExporter, Arc<ScriptedRunner>) {
        let runner = Arc::new(ScriptedRunner::new(handler));
        let client = DatabaseClient::new(config(), effector_for(false, runner.clone()));
        (TableExporter::new(client), runner)
    }

    #[tokio::test]
    async fn test_export_writes_only_site_tables() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("site43_prod_initial-export.sql");
        let dest_clone = dest.clone();

        let (exporter, runner) = exporter_with(move |spec| {
            if is_show_tables(spec) {
                CommandResult::Completed(CommandOutput::ok("wp_users\nwp_43_posts\nwp_43_options\nwp_5_posts\n"))
            } else {
                std::fs::write(&dest_clone, "CREATE TABLE `wp_43_posts` (id int);\n").unwrap();
                CommandResult::Completed(CommandOutput::ok(""))
            }
        });

        let scope = TableScope::new(43, "wp_", false).unwrap();
        let summary = exporter
            .export(&scope, PROD, &dest, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(summary.table_count, 2);
        assert!(summary.byte_size > 0);
        assert!(!summary.simulated);

        let dump = &runner.calls()[1];
        assert!(dump.is_mutating());
        assert!(dump.args.contains(&"wp_43_posts".to_string()));
        assert!(!dump.args.contains(&"wp_users".to_string()));
        assert!(dump
            .args
            .contains(&"--result-file=/work/site43_prod_initial-export.sql".to_string()));
    }

    #[tokio::test]
    async fn test_export_unknown_site_is_tenant_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let (exporter, runner) =
            exporter_with(|_| CommandResult::Completed(CommandOutput::ok("wp_users\nwp_5_posts\n")));

        let scope = TableScope::new(43, "wp_", false).unwrap();
        let err = exporter
            .export(&scope, PROD, &temp_dir.path().join("x.sql"), Duration::from_secs(60))
            .await
            .unwrap_err();

        assert!(matches!(err, MigrationError::TenantNotFound { tenant: 43, .. }));
        assert_eq!(runner.calls().len(), 1, "no dump after an empty listing");
    }

    #[tokio::test]
    async fn test_export_timeout_quarantines_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("site43_prod_initial-export.sql");
        let dest_clone = dest.clone();

        let (exporter, _) = exporter_with(move |spec| {
            if is_show_tables(spec) {
                CommandResult::Completed(CommandOutput::ok("wp_43_posts\n"))
            } else {
                std::fs::write(&dest_clone, "CREATE TABLE `wp_43_po").unwrap();
                CommandResult::TimedOut(Duration::from_secs(60))
            }
        });

        let scope = TableScope::new(43, "wp_", false).unwrap();
        let err = exporter
            .export(&scope, PROD, &dest, Duration::from_secs(60))
            .await
            .unwrap_err();

        assert!(matches!(err, MigrationError::ExportTimeout { .. }));
        assert!(!dest.exists());
        assert!(temp_dir
            .path()
            .join("site43_prod_initial-export.sql.partial")
            .exists());
    }

    #[tokio::test]
    async fn test_export_nonzero_exit_is_process_error() {
        let temp_dir = TempDir::new().unwrap();
        let (exporter, _) = exporter_with(|spec| {
            if is_show_tables(spec) {
                CommandResult::Completed(CommandOutput::ok("wp_43_posts\n"))
            } else {
                CommandResult::Completed(CommandOutput::failed(2, "mysqldump: Got error: 1045"))
            }
        });

        let scope = TableScope::new(43, "wp_", false).unwrap();
        let err = exporter
            .export(&scope, PROD, &temp_dir.path().join("x.sql"), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::ExportProcess { .. }));
        assert!(err.to_string().contains("1045"));
    }

    #[tokio::test]
    async fn test_export_dry_run_is_simulated() {
        let temp_dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::always(CommandOutput::ok("")));
        let client = DatabaseClient::new(config(), effector_for(true, runner.clone()));
        let exporter = TableExporter::new(client);

        let scope = TableScope::new(43, "wp_", false).unwrap();
        let summary = exporter
            .export(&scope, PROD, &temp_dir.path().join("x.sql"), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(summary.simulated);
        assert!(runner.calls().is_empty());
    }
}
