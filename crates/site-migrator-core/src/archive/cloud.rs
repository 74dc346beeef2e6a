//! Object-storage sink, driven through the `aws` CLI.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{ArchiveMetadata, ArchiveReceipt, ArchiveSink};
use crate::config::{ExecutionConfig, PathsConfig, StorageSettings};
use crate::error::{MigrationError, Result};
use crate::process::{CommandSpec, Effect, Effector};
use crate::run::MigrationArtifact;
use crate::storage::{archive_uri, aws_command};

/// Uploads to `s3://<bucket>/<prefix>/site-<id>/<timestamp>/`.
pub struct CloudSink {
    effector: Arc<dyn Effector>,
    settings: StorageSettings,
}

impl CloudSink {
    pub fn new(effector: Arc<dyn Effector>, settings: StorageSettings) -> Self {
        Self { effector, settings }
    }

    async fn run(&self, spec: CommandSpec) -> Result<Option<String>> {
        match self.effector.run(&spec).await {
            Effect::Simulated => Ok(None),
            Effect::Ran(result) => result
                .into_success()
                .map(|out| Some(out.stdout))
                .map_err(|failure| MigrationError::Archival {
                    message: format!("{spec}: {failure}"),
                }),
        }
    }

    fn upload(&self, local: &std::path::Path, uri: &str) -> CommandSpec {
        aws_command(
            Some(&self.settings),
            [
                "s3".to_string(),
                "cp".to_string(),
                local.display().to_string(),
                uri.to_string(),
                "--only-show-errors".to_string(),
            ],
        )
        .timeout(ExecutionConfig::UPLOAD_TIMEOUT)
        .mutating()
    }
}

#[async_trait]
impl ArchiveSink for CloudSink {
    fn name(&self) -> &str {
        "s3"
    }

    async fn try_store(
        &self,
        artifacts: &[MigrationArtifact],
        metadata: &ArchiveMetadata,
    ) -> Result<ArchiveReceipt> {
        let base = archive_uri(&self.settings, metadata.tenant, &metadata.timestamp_label());

        let mut files = Vec::with_capacity(artifacts.len() + 1);
        for artifact in artifacts {
            let name = artifact.file_name();
            self.run(self.upload(&artifact.path, &format!("{base}{name}")))
                .await?;
            debug!("Uploaded {}", name);
            files.push(name);
        }

        // Stage the metadata next to the artifacts so the CLI can upload it.
        let staged = artifacts
            .first()
            .and_then(|a| a.path.parent())
            .map(|dir| dir.join(PathsConfig::METADATA_FILE_NAME))
            .ok_or_else(|| MigrationError::Archival {
                message: "no artifacts to archive".to_string(),
            })?;
        self.effector.write_file(&staged, &metadata.to_json_bytes()?)?;
        self.run(self.upload(
            &staged,
            &format!("{base}{}", PathsConfig::METADATA_FILE_NAME),
        ))
        .await?;
        files.push(PathsConfig::METADATA_FILE_NAME.to_string());

        // A zero exit does not prove anything arrived; count what is there.
        let listing = self
            .run(aws_command(Some(&self.settings), ["s3".to_string(), "ls".to_string(), base.clone()]))
            .await?;
        if let Some(listing) = listing {
            let present = files
                .iter()
                .filter(|f| listing.lines().any(|l| l.split_whitespace().last() == Some(f.as_str())))
                .count();
            if present != files.len() {
                return Err(MigrationError::Archival {
                    message: format!("{present} of {} files present at {base}", files.len()),
                });
            }
        }

        Ok(ArchiveReceipt {
            sink: self.name().to_string(),
            location: base,
            files,
        })
    }
}
