//! site-migrate - move one multisite tenant between deployment environments.
//!
//! Logs go to stderr; the final report goes to stdout (as JSON with
//! `--log-json`). The exit code is the failing error's category.

use anyhow::Result;
use clap::Parser;
use site_migrator::{
    orphaned_runs, AutoConfirm, ConfirmationGate, EnvironmentMappingResolver, MigrationError,
    MigratorConfig, Orchestrator, ProcessRunner, StagingLock,
};
use site_migrator_cli::cli::{CheckArgs, CleanupArgs, MigrateArgs, RulesArgs};
use site_migrator_cli::{output, Cli, Command, PromptGate};
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            let code = e
                .downcast_ref::<MigrationError>()
                .map(MigrationError::exit_code)
                .unwrap_or(1);
            exit_code(code)
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

async fn run(cli: &Cli) -> Result<ExitCode> {
    match &cli.command {
        Command::Migrate(args) => migrate(cli, args).await,
        Command::Rules(args) => rules(cli, args),
        Command::Cleanup(args) => cleanup(cli, args).await,
        Command::Check(args) => check(cli, args).await,
    }
}

fn orchestrator(config: MigratorConfig) -> Result<Orchestrator> {
    let lock = StagingLock::acquire(&config.work_root())?;
    debug!("Holding {}", lock.path().display());
    Ok(Orchestrator::new(
        Arc::new(config),
        Arc::new(ProcessRunner::new()),
        lock,
    ))
}

async fn migrate(cli: &Cli, args: &MigrateArgs) -> Result<ExitCode> {
    let orchestrator = orchestrator(MigratorConfig::load(cli.config.as_deref())?)?;
    let options = args.to_options(cli.verbose);
    let gate: Box<dyn ConfirmationGate> = if args.force {
        Box::new(AutoConfirm)
    } else {
        Box::new(PromptGate::stdio())
    };

    match orchestrator.run(&options, gate.as_ref()).await {
        Ok(report) => {
            let mut stdout = io::stdout().lock();
            if cli.log_json {
                serde_json::to_writer_pretty(&mut stdout, &report)?;
                writeln!(stdout)?;
            } else {
                output::write_report(&mut stdout, &report)?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            error!("{}", failure);
            if cli.log_json {
                let mut stdout = io::stdout().lock();
                serde_json::to_writer_pretty(&mut stdout, &output::failure_json(&failure))?;
                writeln!(stdout)?;
            } else {
                output::write_failure(&mut io::stderr().lock(), &failure)?;
            }
            Ok(exit_code(failure.exit_code()))
        }
    }
}

fn rules(cli: &Cli, args: &RulesArgs) -> Result<ExitCode> {
    let config = load_or_builtin(cli.config.as_deref())?;
    let rules = EnvironmentMappingResolver::new(&config.profiles).resolve_with_custom(
        args.pair.from,
        args.pair.to,
        args.custom_domain.as_deref(),
    )?;
    output::write_rules(&mut io::stdout().lock(), &rules, args.sample.as_deref())?;
    Ok(ExitCode::SUCCESS)
}

/// `rules` works without a configuration file, from the built-in profiles.
fn load_or_builtin(path: Option<&Path>) -> Result<MigratorConfig> {
    match MigratorConfig::load(path) {
        Ok(config) => Ok(config),
        Err(MigrationError::Io { .. }) if path.is_none() => {
            debug!("No configuration file; using built-in profiles");
            Ok(MigratorConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

async fn cleanup(cli: &Cli, args: &CleanupArgs) -> Result<ExitCode> {
    let config = MigratorConfig::load(cli.config.as_deref())?;
    let work_root = config.work_root();
    let orchestrator = orchestrator(config)?;

    let summary = orchestrator
        .recover(args.work_dir.as_deref(), args.dry_run)
        .await?;

    let mut stdout = io::stdout().lock();
    if cli.log_json {
        serde_json::to_writer_pretty(&mut stdout, &summary)?;
        writeln!(stdout)?;
    } else {
        output::write_recovery(&mut stdout, &summary)?;
        if args.work_dir.is_none() {
            output::write_orphans(&mut stdout, &orphaned_runs(&work_root))?;
        }
    }
    Ok(if summary.staging_clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn check(cli: &Cli, args: &CheckArgs) -> Result<ExitCode> {
    let orchestrator = orchestrator(MigratorConfig::load(cli.config.as_deref())?)?;
    let diagnostics = orchestrator.check(&args.to_options()).await?;

    let mut stdout = io::stdout().lock();
    if cli.log_json {
        serde_json::to_writer_pretty(&mut stdout, &diagnostics)?;
        writeln!(stdout)?;
    } else {
        output::write_diagnostics(&mut stdout, &diagnostics)?;
    }
    Ok(ExitCode::SUCCESS)
}
