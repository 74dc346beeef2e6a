//! The shared staging database used as the rewrite workspace.
//!
//! Staging is one database shared by every run on a host. Its handle can
//! only be built from a `StagingLock`, an exclusive advisory lock on a file
//! in the work root, so two runs in the same work root cannot interleave.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{quote_ident, DatabaseClient};
use crate::config::{ExecutionConfig, PathsConfig};
use crate::environment::DbTarget;
use crate::error::{MigrationError, Result};

/// Exclusive hold on the staging database. Released on drop.
#[derive(Debug)]
pub struct StagingLock {
    file: File,
    path: PathBuf,
}

impl StagingLock {
    /// Take the lock in `dir`, failing fast if another run holds it.
    pub fn acquire(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| MigrationError::io("creating lock directory", dir, e))?;
        let path = dir.join(PathsConfig::LOCK_FILE_NAME);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| MigrationError::io("opening lock file", &path, e))?;

        file.try_lock_exclusive()
            .map_err(|_| MigrationError::StagingLocked {
                lock_file: path.clone(),
            })?;

        debug!("Acquired staging lock {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release staging lock {}: {}", self.path.display(), e);
        }
    }
}

/// Handle to the staging database.
#[derive(Clone)]
pub struct StagingDatabase {
    client: DatabaseClient,
    _lock: Arc<StagingLock>,
}

impl StagingDatabase {
    pub fn new(client: DatabaseClient, lock: Arc<StagingLock>) -> Self {
        Self {
            client,
            _lock: lock,
        }
    }

    pub fn client(&self) -> &DatabaseClient {
        &self.client
    }

    /// Tables currently in staging, or `None` in a dry run.
    pub async fn tables(&self) -> Result<Option<Vec<String>>> {
        self.client.list_tables(DbTarget::Staging).await
    }

    /// Drop every table in staging.
    pub async fn reset(&self) -> Result<()> {
        let tables = match self.tables().await? {
            Some(tables) if tables.is_empty() => {
                debug!("Staging already empty");
                return Ok(());
            }
            Some(tables) => tables,
            // Dry run: plan the drop without knowing the table names.
            None => Vec::new(),
        };

        let statement = if tables.is_empty() {
            "SET FOREIGN_KEY_CHECKS=0; DROP TABLE IF EXISTS <every staging table>".to_string()
        } else {
            let list: Vec<String> = tables.iter().map(|t| quote_ident(t)).collect();
            format!("SET FOREIGN_KEY_CHECKS=0; DROP TABLE IF EXISTS {}", list.join(", "))
        };

        info!("Resetting staging database ({} tables)", tables.len());
        self.client
            .execute(DbTarget::Staging, &statement, ExecutionConfig::PROBE_TIMEOUT * 10)
            .await?;
        Ok(())
    }

    /// Whether staging has no tables. A dry run reports clean.
    pub async fn verify_clean(&self) -> Result<bool> {
        Ok(self
            .tables()
            .await?
            .map(|tables| tables.is_empty())
            .unwrap_or(true))
    }
}
