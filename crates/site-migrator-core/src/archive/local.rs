//! Local backup directory sink.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{ArchiveMetadata, ArchiveReceipt, ArchiveSink};
use crate::config::PathsConfig;
use crate::error::{MigrationError, Result};
use crate::process::Effector;
use crate::run::MigrationArtifact;

/// Copies artifacts into `<backup_root>/site-<id>_<source>-to-<target>_<timestamp>/`.
pub struct LocalSink {
    effector: Arc<dyn Effector>,
    backup_root: PathBuf,
}

impl LocalSink {
    pub fn new(effector: Arc<dyn Effector>, backup_root: impl Into<PathBuf>) -> Self {
        Self {
            effector,
            backup_root: backup_root.into(),
        }
    }

    pub fn directory_for(&self, metadata: &ArchiveMetadata) -> PathBuf {
        self.backup_root.join(format!(
            "site-{}_{}-to-{}_{}",
            metadata.tenant,
            metadata.source,
            metadata.target,
            metadata.timestamp_label()
        ))
    }

    fn verify(&self, dir: &Path, expected: usize) -> Result<()> {
        if self.effector.is_dry_run() {
            return Ok(());
        }
        let found = std::fs::read_dir(dir)
            .map_err(|e| MigrationError::io("listing backup directory", dir, e))?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .count();
        if found != expected {
            return Err(MigrationError::Archival {
                message: format!(
                    "{} holds {found} files, expected {expected}",
                    dir.display()
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveSink for LocalSink {
    fn name(&self) -> &str {
        "local"
    }

    async fn try_store(
        &self,
        artifacts: &[MigrationArtifact],
        metadata: &ArchiveMetadata,
    ) -> Result<ArchiveReceipt> {
        let dir = self.directory_for(metadata);
        self.effector.create_dir_all(&dir)?;

        let mut files = Vec::with_capacity(artifacts.len() + 1);
        for artifact in artifacts {
            let name = artifact.file_name();
            let bytes = self.effector.copy_file(&artifact.path, &dir.join(&name))?;
            debug!("Copied {} ({} bytes)", name, bytes);
            files.push(name);
        }

        self.effector
            .write_file(&dir.join(PathsConfig::METADATA_FILE_NAME), &metadata.to_json_bytes()?)?;
        files.push(PathsConfig::METADATA_FILE_NAME.to_string());

        self.verify(&dir, files.len())?;

        Ok(ArchiveReceipt {
            sink: self.name().to_string(),
            location: dir.display().to_string(),
            files,
        })
    }
}
