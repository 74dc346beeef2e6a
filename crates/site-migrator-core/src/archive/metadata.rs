//! The metadata record stored next to every archive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::environment::Environment;
use crate::error::Result;
use crate::fsutil;
use crate::run::{MigrationArtifact, MigrationRun};

/// Same shape for every sink so archives can be audited uniformly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub tenant: u64,
    pub source: Environment,
    pub target: Environment,
    pub timestamp: DateTime<Utc>,
    /// Artifact file names, in production order.
    pub files: Vec<String>,
    /// File name to SHA-256 hex digest.
    pub checksums: BTreeMap<String, String>,
    #[serde(default)]
    pub dry_run: bool,
}

impl ArchiveMetadata {
    /// Describe `artifacts` of `run`, hashing each file.
    pub fn for_run(run: &MigrationRun, artifacts: &[MigrationArtifact]) -> Result<Self> {
        let mut files = Vec::with_capacity(artifacts.len());
        let mut checksums = BTreeMap::new();
        for artifact in artifacts {
            let name = artifact.file_name();
            checksums.insert(name.clone(), fsutil::sha256_file(&artifact.path)?);
            files.push(name);
        }
        Ok(Self {
            tenant: run.tenant,
            source: run.source,
            target: run.target,
            timestamp: run.timestamp,
            files,
            checksums,
            dry_run: false,
        })
    }

    /// Compact timestamp used in archive locations.
    pub fn timestamp_label(&self) -> String {
        self.timestamp.format("%Y%m%d_%H%M%S").to_string()
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        fsutil::to_json_bytes(self)
    }
}
