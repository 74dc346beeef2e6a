//! Load a SQL artifact into a database.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::DatabaseClient;
use crate::config::PathsConfig;
use crate::environment::DbTarget;
use crate::error::{MigrationError, Result};
use crate::process::{CommandFailure, Effect};

/// What an import loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub table_count: usize,
    pub simulated: bool,
}

/// Runs the `mysql` client to source a dump file.
pub struct TableImporter {
    client: DatabaseClient,
}

impl TableImporter {
    pub fn new(client: DatabaseClient) -> Self {
        Self { client }
    }

    /// Load `source_file` into `destination`.
    ///
    /// Failures are never retried: a half-applied dump has already run DDL
    /// against the destination, so its state has to be reported as is.
    pub async fn import(
        &self,
        source_file: &Path,
        destination: DbTarget,
        timeout: Duration,
    ) -> Result<ImportSummary> {
        let process_error = |message: String| MigrationError::ImportProcess {
            environment: destination.to_string(),
            message,
        };

        let dir = source_file
            .parent()
            .ok_or_else(|| process_error(format!("invalid source {}", source_file.display())))?;
        let file_name = source_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let database = self.client.connection(destination)?.database.clone();
        let spec = self
            .client
            .tool_command(destination, "mysql", Some(dir), timeout)?
            .arg("--default-character-set=utf8mb4")
            .args([
                "-e".to_string(),
                format!("source {}/{}", PathsConfig::CONTAINER_WORK_DIR, file_name),
            ])
            .arg(database)
            .mutating();

        info!("Importing {} into {}", source_file.display(), destination);

        let result = match self.client.effector().run(&spec).await {
            Effect::Simulated => {
                return Ok(ImportSummary {
                    table_count: 0,
                    simulated: true,
                })
            }
            Effect::Ran(result) => result,
        };

        result.into_success().map_err(|failure| match failure {
            CommandFailure::TimedOut(after) => MigrationError::ImportTimeout {
                environment: destination.to_string(),
                after,
            },
            other => process_error(other.to_string()),
        })?;

        let table_count = count_created_tables(source_file)?;
        info!("Imported {} tables into {}", table_count, destination);

        Ok(ImportSummary {
            table_count,
            simulated: false,
        })
    }
}

/// Number of `CREATE TABLE` statements in a dump.
pub fn count_created_tables(path: &Path) -> Result<usize> {
    let file = File::open(path).map_err(|e| MigrationError::io("opening dump", path, e))?;
    let mut count = 0;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| MigrationError::io("reading dump", path, e))?;
        if line.trim_start().starts_with("CREATE TABLE") {
            count += 1;
        }
    }
    Ok(count)
}
