//! The migration pipeline.
//!
//! ```text
//! validate -> export source -> reset + import staging -> rewrite staging
//!   -> back up target -> export staging -> import target
//!   -> sync files (optional) -> archive -> clean up
//! ```
//!
//! Stages run strictly in order and are never retried. A fatal error from
//! any export, import or rewrite stage still resets staging before the
//! failure is returned, and leaves the working directory in place.

mod options;
mod report;

pub use options::MigrationOptions;
pub use report::{MigrationFailure, MigrationReport, MigrationStage};

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::archive::{
    ArchivalService, ArchiveMetadata, ArchiveOutcome, ArchiveSink, CloudSink, LocalSink,
};
use crate::cleanup::{CleanupCoordinator, RecoverySummary};
use crate::config::MigratorConfig;
use crate::database::{
    DatabaseClient, ExportSummary, StagingDatabase, StagingLock, TableExporter, TableImporter,
    TableScope,
};
use crate::environment::DbTarget;
use crate::error::{MigrationError, Result};
use crate::file_sync::FileSync;
use crate::preflight::{Diagnostics, PreflightValidator};
use crate::process::{effector_for, CommandRunner, Effector};
use crate::rules::{EnvironmentMappingResolver, RuleSet};
use crate::run::{ArtifactPurpose, MigrationArtifact, MigrationRun};
use crate::search_replace::{RewriteSummary, SearchReplaceEngine};

/// What the operator is asked to approve.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationRequest {
    pub tenant: u64,
    pub source: String,
    pub target: String,
    pub target_is_production: bool,
    pub skip_backup: bool,
    pub rules: Vec<String>,
}

/// Decides whether destructive work may start.
pub trait ConfirmationGate: Send + Sync {
    fn confirm(&self, request: &ConfirmationRequest) -> Result<bool>;
}

/// Approves everything; used with `--force`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

impl ConfirmationGate for AutoConfirm {
    fn confirm(&self, _request: &ConfirmationRequest) -> Result<bool> {
        Ok(true)
    }
}

/// Runs migrations against one staging database.
///
/// Holding the `StagingLock` is a precondition of construction, so at most
/// one orchestrator per work root can touch staging.
pub struct Orchestrator {
    config: Arc<MigratorConfig>,
    runner: Arc<dyn CommandRunner>,
    lock: Arc<StagingLock>,
}

/// Mutable state threaded through the stages of one run.
struct RunState {
    run: MigrationRun,
    stage: MigrationStage,
    stages: Vec<MigrationStage>,
    warnings: Vec<String>,
    report_rewrite: Option<RewriteSummary>,
    backup_skipped: bool,
}

impl RunState {
    fn enter(&mut self, stage: MigrationStage) {
        info!("Stage: {}", stage);
        self.stage = stage;
        self.stages.push(stage);
    }
}

impl Orchestrator {
    pub fn new(config: Arc<MigratorConfig>, runner: Arc<dyn CommandRunner>, lock: StagingLock) -> Self {
        Self {
            config,
            runner,
            lock: Arc::new(lock),
        }
    }

    fn staging(&self, effector: Arc<dyn Effector>) -> StagingDatabase {
        let client = DatabaseClient::new(self.config.clone(), effector);
        StagingDatabase::new(client, self.lock.clone())
    }

    fn resolve(&self, options: &MigrationOptions) -> Result<(RuleSet, TableScope)> {
        options.validate()?;
        let rules = EnvironmentMappingResolver::new(&self.config.profiles).resolve_with_custom(
            options.source,
            options.target,
            options.custom_domain.as_deref(),
        )?;
        let prefix = self
            .config
            .connection(DbTarget::Env(options.source))?
            .table_prefix()
            .to_string();
        let scope = TableScope::new(options.tenant, prefix, options.include_main_site)?;
        Ok((rules, scope))
    }

    /// Validation and preflight only, without touching anything.
    pub async fn check(&self, options: &MigrationOptions) -> Result<Diagnostics> {
        let (_, scope) = self.resolve(options)?;
        let staging = self.staging(effector_for(false, self.runner.clone()));
        PreflightValidator::new(staging)
            .validate(&scope, options.source, options.target, !options.skip_s3)
            .await
    }

    /// Reset staging and remove an orphaned working directory.
    pub async fn recover(&self, work_dir: Option<&Path>, dry_run: bool) -> Result<RecoverySummary> {
        let staging = self.staging(effector_for(dry_run, self.runner.clone()));
        CleanupCoordinator::new(staging).recover(work_dir).await
    }

    /// Run one migration end to end.
    pub async fn run(
        &self,
        options: &MigrationOptions,
        gate: &dyn ConfirmationGate,
    ) -> std::result::Result<MigrationReport, MigrationFailure> {
        let started = Instant::now();
        let validation_failure = |error: MigrationError| MigrationFailure {
            stage: MigrationStage::Validating,
            error,
            work_dir: None,
            warnings: Vec::new(),
            stages: vec![MigrationStage::Validating, MigrationStage::Failed],
        };

        let effector = effector_for(options.dry_run, self.runner.clone());
        let staging = self.staging(effector.clone());
        let client = staging.client().clone();

        info!(
            "Migrating site {} from {} to {}{}",
            options.tenant,
            options.source,
            options.target,
            if options.dry_run { " (dry run)" } else { "" }
        );

        let (rules, scope) = self.resolve(options).map_err(validation_failure)?;
        for rule in rules.rules() {
            info!("Rule: {}", rule);
        }

        let diagnostics = PreflightValidator::new(staging.clone())
            .validate(&scope, options.source, options.target, !options.skip_s3)
            .await
            .map_err(validation_failure)?;

        if !options.dry_run && !options.force {
            let request = ConfirmationRequest {
                tenant: options.tenant,
                source: options.source.to_string(),
                target: options.target.to_string(),
                target_is_production: options.target.is_production(),
                skip_backup: options.skip_backup,
                rules: rules.rules().iter().map(|r| r.to_string()).collect(),
            };
            if !gate.confirm(&request).map_err(validation_failure)? {
                return Err(validation_failure(MigrationError::Aborted));
            }
        }

        let work_root = options
            .work_dir
            .clone()
            .unwrap_or_else(|| self.config.work_root());
        let mut state = RunState {
            run: MigrationRun::new(options.tenant, options.source, options.target, &work_root),
            stage: MigrationStage::Validating,
            stages: vec![MigrationStage::Validating],
            warnings: diagnostics.warnings(),
            report_rewrite: None,
            backup_skipped: false,
        };

        let cleanup = CleanupCoordinator::new(staging.clone());
        if let Err(error) = self
            .transfer(options, &client, &staging, &rules, &scope, &mut state)
            .await
        {
            return Err(self.fail(options, &cleanup, state, error).await);
        }

        // Recoverable stages: failures become warnings.
        let mut keep_files = options.keep_files;

        let mut file_sync = None;
        if options.sync_files {
            state.enter(MigrationStage::SyncingFiles);
            match FileSync::new(effector.clone(), self.config.clone())
                .sync(options.tenant, options.source, options.target)
                .await
            {
                Ok(summary) => file_sync = Some(summary),
                Err(e) => {
                    warn!("File sync failed: {}", e);
                    state.warnings.push(e.to_string());
                }
            }
        }

        state.enter(MigrationStage::Archiving);
        let archive = self
            .archive(options, &effector, &diagnostics, &state.run)
            .await;
        let archive = match archive {
            Ok(outcome) => outcome.map(|o| {
                state.warnings.extend(o.warnings);
                o.receipt
            }),
            Err(e) => {
                warn!("{}; keeping {}", e, state.run.work_dir.display());
                state.warnings.push(e.to_string());
                keep_files = true;
                None
            }
        };

        state.enter(MigrationStage::CleaningUp);
        let cleanup_warnings = cleanup.cleanup(&state.run, keep_files).await;
        state.warnings.extend(cleanup_warnings);

        state.enter(MigrationStage::Done);
        info!(
            "Site {} migrated from {} to {} with {} warnings",
            options.tenant,
            options.source,
            options.target,
            state.warnings.len()
        );

        Ok(MigrationReport {
            tenant: options.tenant,
            source: options.source,
            target: options.target,
            dry_run: options.dry_run,
            work_dir: state.run.work_dir.clone(),
            rules: rules.rules().iter().map(|r| r.to_string()).collect(),
            diagnostics,
            artifacts: state.run.artifacts().to_vec(),
            rewrite: state.report_rewrite,
            backup_skipped: state.backup_skipped,
            file_sync,
            archive,
            warnings: state.warnings,
            stages: state.stages,
            planned_actions: effector.planned_actions(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// The fatal stages: every export, import and the rewrite.
    async fn transfer(
        &self,
        options: &MigrationOptions,
        client: &DatabaseClient,
        staging: &StagingDatabase,
        rules: &RuleSet,
        scope: &TableScope,
        state: &mut RunState,
    ) -> Result<()> {
        let timeout = options.timeout();
        let exporter = TableExporter::new(client.clone());
        let importer = TableImporter::new(client.clone());
        let source = DbTarget::Env(options.source);
        let target = DbTarget::Env(options.target);

        state.enter(MigrationStage::ExportingSource);
        state.run.create(client.effector().as_ref())?;
        let initial = state.run.artifact_path(source, ArtifactPurpose::InitialExport);
        let summary = exporter.export(scope, source, &initial, timeout).await?;
        record(state, source, &initial, ArtifactPurpose::InitialExport, &summary);

        state.enter(MigrationStage::ImportingStaging);
        staging.reset().await?;
        if !staging.verify_clean().await? {
            return Err(MigrationError::Database {
                target: DbTarget::Staging.to_string(),
                message: "still has tables after reset".to_string(),
            });
        }
        importer.import(&initial, DbTarget::Staging, timeout).await?;

        state.enter(MigrationStage::Rewriting);
        let rewrite = SearchReplaceEngine::new(timeout)
            .apply(staging, options.target, rules, scope, options.verbose)
            .await?;
        state.report_rewrite = Some(rewrite);

        state.enter(MigrationStage::BackingUpTarget);
        if options.skip_backup {
            warn!(
                "Skipping backup of {} at operator request; its current site {} tables will not be recoverable from this run",
                options.target, options.tenant
            );
            state.backup_skipped = true;
        } else {
            let backup = state.run.artifact_path(target, ArtifactPurpose::BackupExport);
            match exporter.export(scope, target, &backup, timeout).await {
                Ok(summary) => record(state, target, &backup, ArtifactPurpose::BackupExport, &summary),
                Err(MigrationError::TenantNotFound { .. }) => {
                    info!("Site {} has no tables in {}; nothing to back up", options.tenant, target);
                    state
                        .warnings
                        .push(format!("site {} is new to {}; no backup taken", options.tenant, target));
                }
                Err(e) => return Err(e),
            }
        }

        state.enter(MigrationStage::ExportingStaging);
        let migrated = state
            .run
            .artifact_path(DbTarget::Staging, ArtifactPurpose::MigratedExport);
        let summary = exporter
            .export(scope, DbTarget::Staging, &migrated, timeout)
            .await?;
        record(state, DbTarget::Staging, &migrated, ArtifactPurpose::MigratedExport, &summary);

        state.enter(MigrationStage::ImportingTarget);
        importer.import(&migrated, target, timeout).await?;
        Ok(())
    }

    async fn archive(
        &self,
        options: &MigrationOptions,
        effector: &Arc<dyn Effector>,
        diagnostics: &Diagnostics,
        run: &MigrationRun,
    ) -> Result<Option<ArchiveOutcome>> {
        if run.artifacts().is_empty() {
            info!("No artifacts to archive");
            return Ok(None);
        }

        let mut sinks: Vec<Box<dyn ArchiveSink>> = Vec::new();
        if let (false, true, Some(settings)) =
            (options.skip_s3, diagnostics.storage_available, &self.config.storage)
        {
            sinks.push(Box::new(CloudSink::new(effector.clone(), settings.clone())));
        }
        let backup_root = diagnostics
            .local_backup_dir
            .clone()
            .unwrap_or_else(|| self.config.backup_root());
        sinks.push(Box::new(LocalSink::new(effector.clone(), backup_root)));

        let metadata = ArchiveMetadata::for_run(run, run.artifacts()).map_err(|e| MigrationError::Archival {
            message: e.to_string(),
        })?;
        let outcome = ArchivalService::new(sinks)
            .archive(run.artifacts(), &metadata, options.verbose)
            .await?;
        Ok(Some(outcome))
    }

    async fn fail(
        &self,
        options: &MigrationOptions,
        cleanup: &CleanupCoordinator,
        mut state: RunState,
        error: MigrationError,
    ) -> MigrationFailure {
        let failed_at = state.stage;
        warn!("{} failed: {}", failed_at, error);

        if failed_at == MigrationStage::ImportingTarget {
            state.warnings.push(format!(
                "{} may hold a partial import of site {}; restore it from the backup export in {}",
                options.target,
                options.tenant,
                state.run.work_dir.display()
            ));
        }

        state.enter(MigrationStage::CleaningUp);
        let cleanup_warnings = cleanup.after_failure().await;
        state.warnings.extend(cleanup_warnings);
        state.enter(MigrationStage::Failed);

        let work_dir = (!options.dry_run && state.run.work_dir.exists()).then(|| {
            info!("Keeping {} for inspection", state.run.work_dir.display());
            state.run.work_dir.clone()
        });

        MigrationFailure {
            stage: failed_at,
            error,
            work_dir,
            warnings: state.warnings,
            stages: state.stages,
        }
    }
}

fn record(
    state: &mut RunState,
    database: DbTarget,
    path: &Path,
    purpose: ArtifactPurpose,
    summary: &ExportSummary,
) {
    if summary.simulated {
        return;
    }
    state.run.record(MigrationArtifact {
        path: path.to_path_buf(),
        environment: database.to_string(),
        table_count: summary.table_count,
        byte_size: summary.byte_size,
        purpose,
    });
}
