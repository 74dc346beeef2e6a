//! Command-line arguments.

use clap::{Args, Parser, Subcommand};
use site_migrator::{Environment, MigrationOptions};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "site-migrate", version)]
#[command(about = "Move one multisite tenant between deployment environments")]
pub struct Cli {
    /// Configuration file (defaults to $SITE_MIGRATOR_CONFIG, then the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs and the final report as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Migrate a site's tables from one environment to another
    Migrate(MigrateArgs),
    /// Print the rewrite rules for an environment pair
    Rules(RulesArgs),
    /// Reset staging and remove an orphaned working directory
    Cleanup(CleanupArgs),
    /// Run the preflight checks only
    Check(CheckArgs),
}

#[derive(Args, Debug, Clone, Copy)]
pub struct PairArgs {
    /// Source environment (dev, uat, pprd, prod)
    #[arg(long)]
    pub from: Environment,

    /// Target environment (dev, uat, pprd, prod)
    #[arg(long)]
    pub to: Environment,
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Site id
    pub tenant: u64,

    #[command(flatten)]
    pub pair: PairArgs,

    /// Log every action without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub force: bool,

    /// Do not back up the target's current tables
    #[arg(long)]
    pub skip_backup: bool,

    /// Archive locally instead of to object storage
    #[arg(long)]
    pub skip_s3: bool,

    /// Also sync the site's uploaded media between buckets
    #[arg(long)]
    pub sync_s3: bool,

    /// Root for this run's working directory
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Keep dump files after a successful run
    #[arg(long)]
    pub keep_files: bool,

    /// Per export/import timeout in minutes
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Extra rewrite rule applied last
    #[arg(long, value_name = "SOURCE:TARGET")]
    pub custom_domain: Option<String>,

    /// Allow migrating the main site (id 1)
    #[arg(long)]
    pub include_main_site: bool,
}

impl MigrateArgs {
    pub fn to_options(&self, verbose: bool) -> MigrationOptions {
        let mut options = MigrationOptions::new(self.tenant, self.pair.from, self.pair.to);
        options.dry_run = self.dry_run;
        options.force = self.force;
        options.skip_backup = self.skip_backup;
        options.skip_s3 = self.skip_s3;
        options.sync_files = self.sync_s3;
        options.keep_files = self.keep_files;
        options.include_main_site = self.include_main_site;
        options.verbose = verbose;
        options.work_dir = self.work_dir.clone();
        options.timeout_minutes = self.timeout;
        options.custom_domain = self.custom_domain.clone();
        options
    }
}

#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(flatten)]
    pub pair: PairArgs,

    /// Extra rewrite rule applied last
    #[arg(long, value_name = "SOURCE:TARGET")]
    pub custom_domain: Option<String>,

    /// Text to rewrite with the resolved rules
    #[arg(long)]
    pub sample: Option<String>,
}

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Orphaned run directory to remove; without it, orphans are only listed
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Log what would be removed without removing it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Site id
    pub tenant: u64,

    #[command(flatten)]
    pub pair: PairArgs,

    /// Do not probe object storage
    #[arg(long)]
    pub skip_s3: bool,

    /// Allow checking the main site (id 1)
    #[arg(long)]
    pub include_main_site: bool,
}

impl CheckArgs {
    pub fn to_options(&self) -> MigrationOptions {
        let mut options = MigrationOptions::new(self.tenant, self.pair.from, self.pair.to);
        options.skip_s3 = self.skip_s3;
        options.include_main_site = self.include_main_site;
        options
    }
}
