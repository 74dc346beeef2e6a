//! Site Migrator Core - Headless library for moving one multisite tenant
//! between deployment environments.
//!
//! A migration exports the site's tables from the source database, rewrites
//! environment-specific hostnames and bucket names in an isolated staging
//! database, backs up the target, imports the rewritten tables into the
//! target and archives every dump. The CLI lives in `site-migrator-cli`.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use site_migrator::{
//!     AutoConfirm, Environment, MigrationOptions, MigratorConfig, Orchestrator, ProcessRunner,
//!     StagingLock,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(MigratorConfig::load(None)?);
//!     let lock = StagingLock::acquire(&config.work_root())?;
//!     let orchestrator = Orchestrator::new(config, Arc::new(ProcessRunner::new()), lock);
//!
//!     let mut options = MigrationOptions::new(43, Environment::Prod, Environment::Pprd);
//!     options.dry_run = true;
//!     let report = orchestrator.run(&options, &AutoConfirm).await?;
//!     println!("{} actions planned", report.planned_actions.len());
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cleanup;
pub mod config;
pub mod database;
pub mod environment;
pub mod error;
pub mod file_sync;
pub mod fsutil;
pub mod orchestrator;
pub mod preflight;
pub mod process;
pub mod rules;
pub mod run;
pub mod search_replace;
pub mod storage;

// Re-export commonly used types
pub use archive::{ArchivalService, ArchiveMetadata, ArchiveReceipt, ArchiveSink, CloudSink, LocalSink};
pub use cleanup::{orphaned_runs, CleanupCoordinator, RecoverySummary};
pub use config::{DbConnection, MigratorConfig, StorageSettings};
pub use database::{DatabaseClient, StagingDatabase, StagingLock, TableScope};
pub use environment::{DbTarget, Environment};
pub use error::{MigrationError, Result};
pub use orchestrator::{
    AutoConfirm, ConfirmationGate, ConfirmationRequest, MigrationFailure, MigrationOptions,
    MigrationReport, MigrationStage, Orchestrator,
};
pub use preflight::{CheckResult, CheckStatus, Diagnostics, PreflightValidator};
pub use process::{
    CommandOutput, CommandResult, CommandRunner, CommandSpec, Effector, ProcessRunner,
};
pub use rules::{EnvironmentMappingResolver, RewriteRule, RuleKind, RuleSet};
pub use run::{ArtifactPurpose, MigrationArtifact, MigrationRun};
pub use search_replace::{RewriteSummary, SearchReplaceEngine};
