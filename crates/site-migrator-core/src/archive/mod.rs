//! Archival of the SQL artifacts a run produced.
//!
//! Sinks are tried in order and the first success wins. The orchestrator
//! puts object storage first (when configured and reachable) and the local
//! backup directory last, so a run with artifacts always ends with at least
//! one archived copy unless the local disk fails too.

mod cloud;
mod local;
mod metadata;

pub use cloud::CloudSink;
pub use local::LocalSink;
pub use metadata::ArchiveMetadata;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MigrationError, Result};
use crate::run::MigrationArtifact;

/// Where an archive ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveReceipt {
    pub sink: String,
    /// Cloud URI or local directory.
    pub location: String,
    pub files: Vec<String>,
}

/// Archive plus the failures of sinks tried before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutcome {
    pub receipt: ArchiveReceipt,
    pub warnings: Vec<String>,
}

/// One archival destination.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    fn name(&self) -> &str;

    /// Store every artifact plus the metadata record.
    async fn try_store(
        &self,
        artifacts: &[MigrationArtifact],
        metadata: &ArchiveMetadata,
    ) -> Result<ArchiveReceipt>;
}

/// Ordered chain of sinks.
pub struct ArchivalService {
    sinks: Vec<Box<dyn ArchiveSink>>,
}

impl ArchivalService {
    pub fn new(sinks: Vec<Box<dyn ArchiveSink>>) -> Self {
        Self { sinks }
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Archive `artifacts`, falling through the sinks until one succeeds.
    pub async fn archive(
        &self,
        artifacts: &[MigrationArtifact],
        metadata: &ArchiveMetadata,
        verbose: bool,
    ) -> Result<ArchiveOutcome> {
        if artifacts.is_empty() {
            return Err(MigrationError::Archival {
                message: "no artifacts to archive".to_string(),
            });
        }

        let mut warnings = Vec::new();
        for sink in &self.sinks {
            if verbose {
                info!("Archiving {} files to {}", artifacts.len(), sink.name());
            }
            match sink.try_store(artifacts, metadata).await {
                Ok(receipt) => {
                    info!("Archived to {} ({})", receipt.location, receipt.sink);
                    return Ok(ArchiveOutcome { receipt, warnings });
                }
                Err(e) => {
                    warn!("Archival to {} failed: {}", sink.name(), e);
                    warnings.push(format!("{} archival failed: {}", sink.name(), e));
                }
            }
        }

        Err(MigrationError::Archival {
            message: if warnings.is_empty() {
                "no archive destinations".to_string()
            } else {
                warnings.join("; ")
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::run::{ArtifactPurpose, MigrationRun};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeSink {
        name: &'static str,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ArchiveSink for FakeSink {
        fn name(&self) -> &str {
            self.name
        }

        async fn try_store(
            &self,
            artifacts: &[MigrationArtifact],
            _metadata: &ArchiveMetadata,
        ) -> Result<ArchiveReceipt> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MigrationError::Archival {
                    message: "unreachable".into(),
                });
            }
            Ok(ArchiveReceipt {
                sink: self.name.to_string(),
                location: format!("{}://archive", self.name),
                files: artifacts.iter().map(|a| a.file_name()).collect(),
            })
        }
    }

    fn sink(name: &'static str, fail: bool) -> (Box<dyn ArchiveSink>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(FakeSink {
                name,
                fail,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    fn inputs() -> (Vec<MigrationArtifact>, ArchiveMetadata) {
        let run = MigrationRun::new(43, Environment::Prod, Environment::Pprd, std::path::Path::new("/w"));
        let artifacts = vec![MigrationArtifact {
            path: "/w/a.sql".into(),
            environment: "prod".into(),
            table_count: 1,
            byte_size: 1,
            purpose: ArtifactPurpose::InitialExport,
        }];
        let metadata = ArchiveMetadata {
            tenant: 43,
            source: run.source,
            target: run.target,
            timestamp: run.timestamp,
            files: vec!["a.sql".into()],
            checksums: Default::default(),
            dry_run: false,
        };
        (artifacts, metadata)
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let (cloud, cloud_calls) = sink("cloud", false);
        let (local, local_calls) = sink("local", false);
        let service = ArchivalService::new(vec![cloud, local]);
        let (artifacts, metadata) = inputs();

        let outcome = service.archive(&artifacts, &metadata, false).await.unwrap();
        assert_eq!(outcome.receipt.sink, "cloud");
        assert!(outcome.warnings.is_empty());
        assert_eq!(cloud_calls.load(Ordering::SeqCst), 1);
        assert_eq!(local_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_back_and_reports_warning() {
        let (cloud, _) = sink("cloud", true);
        let (local, _) = sink("local", false);
        let service = ArchivalService::new(vec![cloud, local]);
        let (artifacts, metadata) = inputs();

        let outcome = service.archive(&artifacts, &metadata, true).await.unwrap();
        assert_eq!(outcome.receipt.sink, "local");
        assert!(!outcome.receipt.location.is_empty());
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("cloud"));
    }

    #[tokio::test]
    async fn test_every_sink_failing_is_an_error() {
        let (cloud, _) = sink("cloud", true);
        let (local, _) = sink("local", true);
        let service = ArchivalService::new(vec![cloud, local]);
        let (artifacts, metadata) = inputs();

        let err = service.archive(&artifacts, &metadata, false).await.unwrap_err();
        assert!(matches!(err, MigrationError::Archival { .. }));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_empty_artifact_list_is_rejected() {
        let (local, calls) = sink("local", false);
        let service = ArchivalService::new(vec![local]);
        let (_, metadata) = inputs();

        assert!(service.archive(&[], &metadata, false).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
