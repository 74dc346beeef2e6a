//! Apply rewrite rules to the site's tables in staging.
//!
//! Rewrites go through `wp search-replace` so that PHP-serialized values
//! keep valid length prefixes. The engine only accepts a `StagingDatabase`;
//! source and target databases are never rewritten in place.
//!
//! wp-cli needs a WordPress install to bootstrap, and staging holds only
//! the site's own tables. Each run therefore fetches core into the
//! container (unless the image already has it) and writes a
//! `wp-config.php` whose table prefix is the site's (`wp_43_`), so
//! WordPress loads against the site's options table.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

use crate::database::{StagingDatabase, TableScope};
use crate::environment::{DbTarget, Environment};
use crate::error::{MigrationError, Result};
use crate::process::{container_name, CommandSpec, Effect};
use crate::rules::{RewriteRule, RuleSet};

/// Shell wrapper run as `sh -c BOOTSTRAP wp <wp args>`; `"$@"` are the
/// wp-cli arguments. Connection settings arrive as environment variables.
const BOOTSTRAP: &str = concat!(
    "set -e; ",
    "if [ ! -f \"$WORDPRESS_PATH/wp-load.php\" ]; then ",
    "wp core download --path=\"$WORDPRESS_PATH\" --skip-content --quiet; fi; ",
    "wp config create --path=\"$WORDPRESS_PATH\" ",
    "--dbhost=\"$WORDPRESS_DB_HOST\" --dbname=\"$WORDPRESS_DB_NAME\" ",
    "--dbuser=\"$WORDPRESS_DB_USER\" --dbpass=\"${WORDPRESS_DB_PASSWORD:-}\" ",
    "--dbprefix=\"$WORDPRESS_TABLE_PREFIX\" --skip-check --force --quiet; ",
    "exec wp --path=\"$WORDPRESS_PATH\" \"$@\"",
);

fn replacements_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Made (\d+) replacements?").expect("static regex"))
}

/// Outcome of rewriting staging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteSummary {
    /// Environment the rewritten data is destined for.
    pub target: Option<Environment>,
    pub rules_applied: usize,
    pub replacements: u64,
    pub tables: usize,
    pub simulated: bool,
}

/// Runs each rewrite rule against staging, in order.
pub struct SearchReplaceEngine {
    timeout: Duration,
}

impl SearchReplaceEngine {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Apply `rules` to the site's tables in staging.
    ///
    /// Not transactional across rules: a failure leaves staging partly
    /// rewritten, which is harmless because staging is reset afterwards
    /// and only a fully rewritten export is ever imported.
    pub async fn apply(
        &self,
        staging: &StagingDatabase,
        target: Environment,
        rules: &RuleSet,
        scope: &TableScope,
        verbose: bool,
    ) -> Result<RewriteSummary> {
        let tables = match staging.tables().await? {
            Some(all) => {
                let selected = scope.select(&all);
                if selected.is_empty() {
                    return Err(MigrationError::Rewrite {
                        rule: "-".to_string(),
                        message: format!("no {} tables in staging", scope.pattern()),
                    });
                }
                Some(selected)
            }
            None => None,
        };
        let table_args = tables
            .clone()
            .unwrap_or_else(|| vec![scope.pattern()]);

        info!(
            "Rewriting site {} for {} with {} rules across {} tables",
            scope.tenant(),
            target,
            rules.len(),
            tables.as_ref().map(Vec::len).unwrap_or(0)
        );

        let mut summary = RewriteSummary {
            target: Some(target),
            tables: tables.as_ref().map(Vec::len).unwrap_or(0),
            ..Default::default()
        };

        for (index, rule) in rules.rules().iter().enumerate() {
            let spec = self.command(staging, rule, &table_args, scope, verbose)?;
            debug!("Rule {}/{}: {}", index + 1, rules.len(), rule);

            let output = match staging.client().effector().run(&spec).await {
                Effect::Simulated => {
                    summary.simulated = true;
                    summary.rules_applied += 1;
                    continue;
                }
                Effect::Ran(result) => result.into_success().map_err(|failure| {
                    MigrationError::Rewrite {
                        rule: rule.to_string(),
                        message: failure.to_string(),
                    }
                })?,
            };

            let made = parse_replacements(&output.stdout);
            if verbose {
                info!("{}: {} replacements", rule, made);
            }
            summary.replacements += made;
            summary.rules_applied += 1;
        }

        info!(
            "Rewrite finished: {} rules, {} replacements",
            summary.rules_applied, summary.replacements
        );
        Ok(summary)
    }

    fn command(
        &self,
        staging: &StagingDatabase,
        rule: &RewriteRule,
        tables: &[String],
        scope: &TableScope,
        verbose: bool,
    ) -> Result<CommandSpec> {
        let client = staging.client();
        let conn = client.connection(DbTarget::Staging)?;
        let container = &client.config().container;

        let mut spec = CommandSpec::new(&container.runtime)
            .args(["run", "--rm"])
            .container(container_name("wp"))
            .args(["--network", container.network.as_str()])
            .args(["--memory", container.memory.as_str()])
            .args(["--cpus", container.cpus.as_str()])
            .args([
                "-e".to_string(),
                format!("WORDPRESS_DB_HOST={}:{}", conn.host, conn.port()),
                "-e".to_string(),
                format!("WORDPRESS_DB_USER={}", conn.user),
                "-e".to_string(),
                format!("WORDPRESS_DB_NAME={}", conn.database),
                "-e".to_string(),
                format!("WORDPRESS_TABLE_PREFIX={}", scope.site_prefix()),
                "-e".to_string(),
                format!("WORDPRESS_PATH={}", container.wordpress_path),
            ])
            .timeout(self.timeout)
            .mutating();

        if let Some(password) = conn.password()? {
            spec = spec
                .args(["-e", "WORDPRESS_DB_PASSWORD"])
                .env("WORDPRESS_DB_PASSWORD", password);
        }

        spec = spec
            .arg(&container.wpcli_image)
            .args(["sh", "-c", BOOTSTRAP, "wp", "search-replace"])
            .arg(&rule.from)
            .arg(&rule.to)
            .args(tables.iter().cloned())
            .arg(format!("--skip-tables={}", scope.network_tables().join(",")))
            .args([
                "--skip-columns=guid",
                "--precise",
                "--recurse-objects",
                "--report-changed-only",
                "--skip-plugins",
                "--skip-themes",
            ]);
        if verbose {
            spec = spec.arg("--verbose");
        }
        Ok(spec)
    }
}

/// Replacement count from `wp search-replace` output.
fn parse_replacements(stdout: &str) -> u64 {
    replacements_line()
        .captures_iter(stdout)
        .filter_map(|c| c[1].parse::<u64>().ok())
        .last()
        .unwrap_or(0)
}
