//! Returning staging and the working directory to a clean state.
//!
//! Every failure in here is logged and reported as a warning; cleanup never
//! replaces the outcome of the run it follows.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::PathsConfig;
use crate::database::StagingDatabase;
use crate::error::{MigrationError, Result};
use crate::fsutil::dir_usage;
use crate::run::MigrationRun;

/// What a standalone recovery did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySummary {
    pub staging_clean: bool,
    pub removed_dir: Option<PathBuf>,
    pub files_removed: usize,
    pub bytes_freed: u64,
    pub warnings: Vec<String>,
}

pub struct CleanupCoordinator {
    staging: StagingDatabase,
}

impl CleanupCoordinator {
    pub fn new(staging: StagingDatabase) -> Self {
        Self { staging }
    }

    /// Reset staging and, unless `keep_files`, delete the run's artifacts
    /// and working directory.
    pub async fn cleanup(&self, run: &MigrationRun, keep_files: bool) -> Vec<String> {
        let mut warnings = self.reset_staging().await;

        if keep_files {
            info!("Keeping working directory {}", run.work_dir.display());
            return warnings;
        }

        let effector = self.staging.client().effector();
        for artifact in run.artifacts() {
            if let Err(e) = effector.remove_file(&artifact.path) {
                warnings.push(cleanup_warning(e));
            }
        }
        if effector.is_dry_run() || run.work_dir.exists() {
            if let Err(e) = effector.remove_dir_all(&run.work_dir) {
                warnings.push(cleanup_warning(e));
            }
        }
        warnings
    }

    /// Best-effort reset after a failed run. Artifacts are left alone.
    pub async fn after_failure(&self) -> Vec<String> {
        self.reset_staging().await
    }

    /// Empty staging and confirm it is empty.
    pub async fn reset_staging(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Err(e) = self.staging.reset().await {
            warnings.push(cleanup_warning(e));
            return warnings;
        }
        match self.staging.verify_clean().await {
            Ok(true) => {}
            Ok(false) => warnings.push(cleanup_warning(MigrationError::Cleanup {
                message: "staging still has tables after reset".to_string(),
            })),
            Err(e) => warnings.push(cleanup_warning(e)),
        }
        warnings
    }

    /// Standalone recovery after an interrupted run: reset staging and
    /// remove an orphaned working directory.
    pub async fn recover(&self, work_dir: Option<&Path>) -> Result<RecoverySummary> {
        let mut summary = RecoverySummary {
            warnings: self.reset_staging().await,
            ..Default::default()
        };
        summary.staging_clean = summary.warnings.is_empty();

        if let Some(dir) = work_dir {
            check_work_dir(dir)?;
            let (files, bytes) = dir_usage(dir);
            info!(
                "Removing {} ({} files, {} bytes)",
                dir.display(),
                files,
                bytes
            );
            self.staging.client().effector().remove_dir_all(dir)?;
            summary.removed_dir = Some(dir.to_path_buf());
            summary.files_removed = files;
            summary.bytes_freed = bytes;
        }
        Ok(summary)
    }
}

/// Working directories left under `work_root`, oldest first.
pub fn orphaned_runs(work_root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(work_root) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir() && check_work_dir(p).is_ok())
        .collect();
    dirs.sort();
    dirs
}

/// Refuse to delete anything that is not a migration working directory.
fn check_work_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(MigrationError::validation(
            "work_dir",
            format!("{} is not a directory", dir.display()),
        ));
    }
    let looks_like_run = dir
        .file_name()
        .map(|n| n.to_string_lossy().contains("_site-"))
        .unwrap_or(false);
    let foreign = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .find(|e| {
            let name = e.file_name().to_string_lossy();
            !(name.ends_with(".sql")
                || name.ends_with(".sql.partial")
                || name == PathsConfig::METADATA_FILE_NAME)
        });
    if !looks_like_run || foreign.is_some() {
        return Err(MigrationError::validation(
            "work_dir",
            format!("{} does not look like a migration working directory", dir.display()),
        ));
    }
    Ok(())
}

fn cleanup_warning(err: MigrationError) -> String {
    let message = match err {
        MigrationError::Cleanup { message } => message,
        other => other.to_string(),
    };
    warn!("Cleanup: {}", message);
    format!("cleanup: {message}")
}
