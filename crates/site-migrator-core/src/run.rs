//! One migration run: its working directory and the artifacts it produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::environment::{DbTarget, Environment};
use crate::error::Result;
use crate::process::Effector;

/// Why an artifact was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactPurpose {
    /// Source tables as exported, before any rewrite.
    InitialExport,
    /// The target's tables before they were overwritten.
    BackupExport,
    /// Rewritten tables exported from staging, imported into the target.
    MigratedExport,
}

impl ArtifactPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactPurpose::InitialExport => "initial-export",
            ArtifactPurpose::BackupExport => "backup-export",
            ArtifactPurpose::MigratedExport => "migrated-export",
        }
    }
}

impl fmt::Display for ArtifactPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A SQL file produced by an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationArtifact {
    pub path: PathBuf,
    /// Database the tables were exported from.
    pub environment: String,
    pub table_count: usize,
    pub byte_size: u64,
    pub purpose: ArtifactPurpose,
}

impl MigrationArtifact {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// The unit of work for one (site, source, target) triple.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRun {
    pub tenant: u64,
    pub source: Environment,
    pub target: Environment,
    pub timestamp: DateTime<Utc>,
    pub work_dir: PathBuf,
    artifacts: Vec<MigrationArtifact>,
}

impl MigrationRun {
    /// Describe a run starting now. The directory is not created yet.
    pub fn new(tenant: u64, source: Environment, target: Environment, work_root: &Path) -> Self {
        Self::at(tenant, source, target, work_root, Utc::now())
    }

    pub fn at(
        tenant: u64,
        source: Environment,
        target: Environment,
        work_root: &Path,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let work_dir = work_root.join(format!(
            "{}_site-{}_{}-to-{}",
            timestamp.format("%Y%m%d_%H%M%S"),
            tenant,
            source,
            target
        ));
        Self {
            tenant,
            source,
            target,
            timestamp,
            work_dir,
            artifacts: Vec::new(),
        }
    }

    /// Create the working directory.
    pub fn create(&self, effector: &dyn Effector) -> Result<()> {
        effector.create_dir_all(&self.work_dir)?;
        info!("Working directory: {}", self.work_dir.display());
        Ok(())
    }

    /// Compact timestamp used in directory and object names.
    pub fn timestamp_label(&self) -> String {
        self.timestamp.format("%Y%m%d_%H%M%S").to_string()
    }

    /// Where the export of `database` for `purpose` is written.
    pub fn artifact_path(&self, database: DbTarget, purpose: ArtifactPurpose) -> PathBuf {
        self.work_dir
            .join(format!("site{}_{}_{}.sql", self.tenant, database, purpose))
    }

    pub fn record(&mut self, artifact: MigrationArtifact) {
        self.artifacts.push(artifact);
    }

    pub fn artifacts(&self) -> &[MigrationArtifact] {
        &self.artifacts
    }

    pub fn artifact(&self, purpose: ArtifactPurpose) -> Option<&MigrationArtifact> {
        self.artifacts.iter().find(|a| a.purpose == purpose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn run() -> MigrationRun {
        let ts = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        MigrationRun::at(43, Environment::Prod, Environment::Pprd, Path::new("/var/work"), ts)
    }

    #[test]
    fn test_work_dir_is_named_by_timestamp() {
        let run = run();
        assert_eq!(
            run.work_dir,
            PathBuf::from("/var/work/20260314_092653_site-43_prod-to-pprd")
        );
        assert_eq!(run.timestamp_label(), "20260314_092653");
    }

    #[test]
    fn test_artifact_paths() {
        let run = run();
        assert_eq!(
            run.artifact_path(DbTarget::Staging, ArtifactPurpose::MigratedExport),
            run.work_dir.join("site43_staging_migrated-export.sql")
        );
        assert_eq!(
            run.artifact_path(Environment::Pprd.into(), ArtifactPurpose::BackupExport)
                .file_name()
                .unwrap(),
            "site43_pprd_backup-export.sql"
        );
    }

    #[test]
    fn test_record_keeps_order() {
        let mut run = run();
        for purpose in [ArtifactPurpose::InitialExport, ArtifactPurpose::MigratedExport] {
            run.record(MigrationArtifact {
                path: run.artifact_path(DbTarget::Staging, purpose),
                environment: "staging".into(),
                table_count: 2,
                byte_size: 10,
                purpose,
            });
        }
        assert_eq!(run.artifacts().len(), 2);
        assert_eq!(run.artifacts()[0].purpose, ArtifactPurpose::InitialExport);
        assert!(run.artifact(ArtifactPurpose::BackupExport).is_none());
    }

    #[test]
    fn test_purpose_serializes_as_tag() {
        assert_eq!(
            serde_json::to_string(&ArtifactPurpose::BackupExport).unwrap(),
            "\"backup-export\""
        );
    }
}
