//! Stages and outcomes of a migration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::archive::ArchiveReceipt;
use crate::environment::Environment;
use crate::error::MigrationError;
use crate::file_sync::FileSyncSummary;
use crate::preflight::Diagnostics;
use crate::run::MigrationArtifact;
use crate::search_replace::RewriteSummary;

/// Pipeline stages, in execution order.
///
/// A run ends in `Done` or, after a fatal error and its best-effort
/// cleanup, in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationStage {
    Validating,
    ExportingSource,
    ImportingStaging,
    Rewriting,
    BackingUpTarget,
    ExportingStaging,
    ImportingTarget,
    SyncingFiles,
    Archiving,
    CleaningUp,
    Done,
    Failed,
}

impl MigrationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStage::Validating => "validation",
            MigrationStage::ExportingSource => "source export",
            MigrationStage::ImportingStaging => "staging import",
            MigrationStage::Rewriting => "search-replace",
            MigrationStage::BackingUpTarget => "target backup",
            MigrationStage::ExportingStaging => "staging export",
            MigrationStage::ImportingTarget => "target import",
            MigrationStage::SyncingFiles => "file sync",
            MigrationStage::Archiving => "archival",
            MigrationStage::CleaningUp => "cleanup",
            MigrationStage::Done => "done",
            MigrationStage::Failed => "failed",
        }
    }
}

impl fmt::Display for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a completed run (or dry run).
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub tenant: u64,
    pub source: Environment,
    pub target: Environment,
    pub dry_run: bool,
    pub work_dir: PathBuf,
    pub rules: Vec<String>,
    pub diagnostics: Diagnostics,
    pub artifacts: Vec<MigrationArtifact>,
    pub rewrite: Option<RewriteSummary>,
    pub backup_skipped: bool,
    pub file_sync: Option<FileSyncSummary>,
    pub archive: Option<ArchiveReceipt>,
    pub warnings: Vec<String>,
    pub stages: Vec<MigrationStage>,
    /// Actions a dry run would have performed.
    pub planned_actions: Vec<String>,
    pub elapsed_ms: u64,
}

/// A run that stopped at a fatal error.
#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct MigrationFailure {
    /// Stage whose error ended the run.
    pub stage: MigrationStage,
    #[source]
    pub error: MigrationError,
    /// Left in place for inspection.
    pub work_dir: Option<PathBuf>,
    pub warnings: Vec<String>,
    /// Stages entered, ending with `Failed`.
    pub stages: Vec<MigrationStage>,
}

impl MigrationFailure {
    pub fn exit_code(&self) -> i32 {
        self.error.exit_code()
    }
}
