//! Database access through containerised MySQL client tools.
//!
//! The migrator never links a database driver. Every query, dump and
//! restore is a `docker run` of the configured MySQL image against one of
//! the configured connections, with the password passed as `MYSQL_PWD`.

mod exporter;
mod importer;
mod staging;
mod tables;

pub use exporter::{ExportSummary, TableExporter};
pub use importer::{count_created_tables, ImportSummary, TableImporter};
pub use staging::{StagingDatabase, StagingLock};
pub use tables::TableScope;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{DbConnection, ExecutionConfig, MigratorConfig, PathsConfig};
use crate::environment::DbTarget;
use crate::error::{MigrationError, Result};
use crate::process::{container_name, CommandSpec, Effect, Effector};

/// Builds and runs MySQL client commands for the configured databases.
#[derive(Clone)]
pub struct DatabaseClient {
    config: Arc<MigratorConfig>,
    effector: Arc<dyn Effector>,
}

impl DatabaseClient {
    pub fn new(config: Arc<MigratorConfig>, effector: Arc<dyn Effector>) -> Self {
        Self { config, effector }
    }

    pub fn effector(&self) -> &Arc<dyn Effector> {
        &self.effector
    }

    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    pub fn connection(&self, target: DbTarget) -> Result<&DbConnection> {
        self.config.connection(target)
    }

    /// `docker run` prefix for a MySQL client tool, up to the connection flags.
    ///
    /// `mount` is bind-mounted at `/work` inside the container.
    pub fn tool_command(
        &self,
        target: DbTarget,
        tool: &str,
        mount: Option<&Path>,
        timeout: Duration,
    ) -> Result<CommandSpec> {
        let conn = self.connection(target)?;
        let container = &self.config.container;

        let mut spec = CommandSpec::new(&container.runtime)
            .args(["run", "--rm"])
            .container(container_name(tool))
            .args(["--network", container.network.as_str()])
            .args(["--memory", container.memory.as_str()])
            .args(["--cpus", container.cpus.as_str()])
            .timeout(timeout);

        if let Some(password) = conn.password()? {
            spec = spec.args(["-e", "MYSQL_PWD"]).env("MYSQL_PWD", password);
        }
        if let Some(dir) = mount {
            spec = spec.args([
                "-v".to_string(),
                format!("{}:{}", dir.display(), PathsConfig::CONTAINER_WORK_DIR),
            ]);
        }

        Ok(spec
            .arg(&container.mysql_image)
            .arg(tool)
            .args(["-h", conn.host.as_str()])
            .args(["-P".to_string(), conn.port().to_string()])
            .args(["-u", conn.user.as_str()]))
    }

    /// Run one SQL statement and return its tab-separated output.
    ///
    /// Returns `None` when the effector only simulated the call.
    pub async fn query(&self, target: DbTarget, sql: &str) -> Result<Option<String>> {
        let spec = self.sql_command(target, sql, ExecutionConfig::PROBE_TIMEOUT)?;
        self.run_sql(target, spec).await
    }

    /// Run a state-changing SQL statement.
    pub async fn execute(&self, target: DbTarget, sql: &str, timeout: Duration) -> Result<Option<String>> {
        let spec = self.sql_command(target, sql, timeout)?.mutating();
        self.run_sql(target, spec).await
    }

    /// Every table in the target database, or `None` in a dry run.
    pub async fn list_tables(&self, target: DbTarget) -> Result<Option<Vec<String>>> {
        let output = self.query(target, "SHOW TABLES").await?;
        Ok(output.map(|out| {
            out.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect()
        }))
    }

    /// Whether the database answers a trivial query.
    pub async fn ping(&self, target: DbTarget) -> Result<()> {
        self.query(target, "SELECT 1").await.map(|_| ())
    }

    fn sql_command(&self, target: DbTarget, sql: &str, timeout: Duration) -> Result<CommandSpec> {
        let database = self.connection(target)?.database.clone();
        Ok(self
            .tool_command(target, "mysql", None, timeout)?
            .args(["-N", "-B", "-e", sql])
            .arg(database))
    }

    async fn run_sql(&self, target: DbTarget, spec: CommandSpec) -> Result<Option<String>> {
        match self.effector.run(&spec).await {
            Effect::Simulated => Ok(None),
            Effect::Ran(result) => result
                .into_success()
                .map(|out| Some(out.stdout))
                .map_err(|failure| MigrationError::Database {
                    target: target.to_string(),
                    message: failure.to_string(),
                }),
        }
    }
}

/// Quote a table name for MySQL.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
