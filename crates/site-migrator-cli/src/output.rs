//! Rendering of reports for the terminal.

use serde_json::json;
use site_migrator::{
    CheckStatus, Diagnostics, MigrationFailure, MigrationReport, RecoverySummary, RuleSet,
};
use std::io::{self, Write};
use std::path::PathBuf;

pub fn write_report(out: &mut impl Write, report: &MigrationReport) -> io::Result<()> {
    writeln!(
        out,
        "Site {}: {} -> {}{}",
        report.tenant,
        report.source,
        report.target,
        if report.dry_run { " (dry run)" } else { "" }
    )?;

    let stages: Vec<&str> = report.stages.iter().map(|s| s.as_str()).collect();
    writeln!(out, "Stages: {}", stages.join(", "))?;

    if let Some(rewrite) = &report.rewrite {
        writeln!(
            out,
            "Rewrite: {} rules over {} tables, {} replacements",
            rewrite.rules_applied, rewrite.tables, rewrite.replacements
        )?;
    }
    if report.backup_skipped {
        writeln!(out, "Backup: skipped")?;
    }

    if !report.artifacts.is_empty() {
        writeln!(out, "Artifacts:")?;
        for artifact in &report.artifacts {
            writeln!(
                out,
                "  {} ({} tables, {} bytes)",
                artifact.file_name(),
                artifact.table_count,
                artifact.byte_size
            )?;
        }
    }
    if let Some(sync) = &report.file_sync {
        writeln!(
            out,
            "Files: {} objects from {} to {}",
            sync.copied, sync.source_uri, sync.target_uri
        )?;
    }
    if let Some(archive) = &report.archive {
        writeln!(out, "Archive ({}): {}", archive.sink, archive.location)?;
    }
    if report.dry_run {
        writeln!(out, "Planned actions:")?;
        for action in &report.planned_actions {
            writeln!(out, "  {action}")?;
        }
    }
    write_warnings(out, &report.warnings)?;
    writeln!(out, "Finished in {:.1}s", report.elapsed_ms as f64 / 1000.0)
}

pub fn write_failure(out: &mut impl Write, failure: &MigrationFailure) -> io::Result<()> {
    writeln!(out, "Migration failed during {}: {}", failure.stage, failure.error)?;
    if let Some(dir) = &failure.work_dir {
        writeln!(out, "Working files kept in {}", dir.display())?;
    }
    write_warnings(out, &failure.warnings)
}

pub fn failure_json(failure: &MigrationFailure) -> serde_json::Value {
    json!({
        "stage": failure.stage,
        "error": failure.error.to_string(),
        "exit_code": failure.exit_code(),
        "work_dir": failure.work_dir,
        "warnings": failure.warnings,
        "stages": failure.stages,
    })
}

pub fn write_diagnostics(out: &mut impl Write, diagnostics: &Diagnostics) -> io::Result<()> {
    for check in &diagnostics.checks {
        let status = match check.status {
            CheckStatus::Passed => "ok",
            CheckStatus::Warning => "WARN",
            CheckStatus::Failed => "FAIL",
            CheckStatus::Skipped => "skip",
        };
        writeln!(out, "[{status:>4}] {}: {}", check.name, check.message)?;
    }
    if let Some(dir) = &diagnostics.local_backup_dir {
        writeln!(out, "Archives will go to {}", dir.display())?;
    }
    Ok(())
}

pub fn write_rules(out: &mut impl Write, rules: &RuleSet, sample: Option<&str>) -> io::Result<()> {
    for (i, rule) in rules.rules().iter().enumerate() {
        writeln!(out, "{}. {rule}", i + 1)?;
    }
    if let Some(sample) = sample {
        writeln!(out)?;
        writeln!(out, "{}", rules.rewrite(sample))?;
    }
    Ok(())
}

pub fn write_recovery(out: &mut impl Write, summary: &RecoverySummary) -> io::Result<()> {
    writeln!(
        out,
        "Staging: {}",
        if summary.staging_clean { "clean" } else { "NOT clean" }
    )?;
    if let Some(dir) = &summary.removed_dir {
        writeln!(
            out,
            "Removed {} ({} files, {} bytes)",
            dir.display(),
            summary.files_removed,
            summary.bytes_freed
        )?;
    }
    write_warnings(out, &summary.warnings)
}

pub fn write_orphans(out: &mut impl Write, orphans: &[PathBuf]) -> io::Result<()> {
    if orphans.is_empty() {
        return writeln!(out, "No orphaned run directories");
    }
    writeln!(out, "Orphaned run directories (remove with --work-dir):")?;
    for dir in orphans {
        writeln!(out, "  {}", dir.display())?;
    }
    Ok(())
}

fn write_warnings(out: &mut impl Write, warnings: &[String]) -> io::Result<()> {
    if warnings.is_empty() {
        return Ok(());
    }
    writeln!(out, "Warnings:")?;
    for warning in warnings {
        writeln!(out, "  - {warning}")?;
    }
    Ok(())
}
