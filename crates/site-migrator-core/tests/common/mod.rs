//! In-memory stand-in for the container runtime, the MySQL client tools,
//! wp-cli and the aws CLI.
//!
//! Databases are keyed by host name and hold `table -> rows`, where a row
//! is one plain string. Dumps written by the fake `mysqldump` are real
//! files in the bind-mounted directory, so imports read back exactly what
//! an export produced.

#![allow(dead_code)]

use async_trait::async_trait;
use site_migrator::{CommandOutput, CommandResult, CommandRunner, CommandSpec, MigratorConfig};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub type Tables = BTreeMap<String, Vec<String>>;
type FailWhen = Box<dyn Fn(&CommandSpec) -> bool + Send + Sync>;

#[derive(Default)]
struct State {
    databases: HashMap<String, Tables>,
    objects: Vec<String>,
    calls: Vec<CommandSpec>,
}

#[derive(Default)]
pub struct FakeInfra {
    state: Mutex<State>,
    fail_when: Mutex<Option<FailWhen>>,
    credentials_missing: bool,
    uploads_fail: bool,
}

impl FakeInfra {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, host: &str, table: &str, rows: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .databases
            .entry(host.to_string())
            .or_default()
            .insert(table.to_string(), rows.iter().map(|r| r.to_string()).collect());
        self
    }

    /// `aws sts get-caller-identity` fails, as without credentials.
    pub fn without_credentials(mut self) -> Self {
        self.credentials_missing = true;
        self
    }

    /// Credentials work but every upload fails.
    pub fn with_failing_uploads(mut self) -> Self {
        self.uploads_fail = true;
        self
    }

    /// Make every command matching `predicate` exit non-zero.
    pub fn fail_when(&self, predicate: impl Fn(&CommandSpec) -> bool + Send + Sync + 'static) {
        *self.fail_when.lock().unwrap() = Some(Box::new(predicate));
    }

    pub fn tables(&self, host: &str) -> Tables {
        self.state
            .lock()
            .unwrap()
            .databases
            .get(host)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn objects(&self) -> Vec<String> {
        self.state.lock().unwrap().objects.clone()
    }

    fn handle(&self, spec: &CommandSpec) -> CommandResult {
        if let Some(predicate) = self.fail_when.lock().unwrap().as_ref() {
            if predicate(spec) {
                return failed("injected failure");
            }
        }
        let mut state = self.state.lock().unwrap();
        match spec.program.as_str() {
            "docker" => match spec.args.first().map(String::as_str) {
                Some("info") => ok("27.1.1\n"),
                Some("run") if spec.args.iter().any(|a| a == "wordpress:cli") => search_replace(&mut state, spec),
                Some("run") => mysql_tool(&mut state, spec),
                _ => failed("unknown docker command"),
            },
            "aws" => self.aws(&mut state, spec),
            other => failed(&format!("{other}: command not found")),
        }
    }

    fn aws(&self, state: &mut State, spec: &CommandSpec) -> CommandResult {
        let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["sts", "get-caller-identity", ..] if self.credentials_missing => {
                failed("Unable to locate credentials. You can configure credentials by running \"aws configure\".")
            }
            ["sts", "get-caller-identity", ..] => ok("{\"Account\": \"123456789012\"}"),
            ["s3", "cp", _, uri, ..] if !self.uploads_fail => {
                state.objects.push(uri.to_string());
                ok("")
            }
            ["s3", "cp", ..] => failed("upload failed: Could not connect to the endpoint URL"),
            ["s3", "ls", base, ..] => {
                let listing: Vec<String> = state
                    .objects
                    .iter()
                    .filter_map(|o| o.strip_prefix(base))
                    .map(|name| format!("2026-03-14 09:27:01       42 {name}"))
                    .collect();
                ok(&listing.join("\n"))
            }
            ["s3", "sync", ..] => ok("copy: s3://a/x.jpg to s3://b/x.jpg\n"),
            _ => failed("unknown aws command"),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeInfra {
    async fn run(&self, spec: &CommandSpec) -> CommandResult {
        self.state.lock().unwrap().calls.push(spec.clone());
        self.handle(spec)
    }
}

fn ok(stdout: &str) -> CommandResult {
    CommandResult::Completed(CommandOutput::ok(stdout))
}

fn failed(stderr: &str) -> CommandResult {
    CommandResult::Completed(CommandOutput::failed(1, stderr))
}

fn mount(spec: &CommandSpec) -> Option<PathBuf> {
    spec.arg_after("-v")
        .and_then(|m| m.strip_suffix(":/work"))
        .map(PathBuf::from)
}

fn mysql_tool(state: &mut State, spec: &CommandSpec) -> CommandResult {
    let Some(image) = spec.args.iter().position(|a| a == "mysql:8.0") else {
        return failed("unknown image");
    };
    let tool = spec.args[image + 1].as_str();
    let host = spec.arg_after("-h").unwrap_or_default().to_string();
    let db = state.databases.entry(host).or_default();

    match tool {
        "mysqldump" => {
            let Some(at) = spec.args.iter().position(|a| a.starts_with("--result-file=")) else {
                return failed("no result file");
            };
            let name = spec.args[at].trim_start_matches("--result-file=/work/");
            // database name, then tables
            let tables = &spec.args[at + 2..];
            let mut dump = String::from("-- MySQL dump (fake)\n");
            for table in tables {
                let Some(rows) = db.get(table) else {
                    return failed(&format!("mysqldump: Couldn't find table: \"{table}\""));
                };
                dump.push_str(&format!("DROP TABLE IF EXISTS `{table}`;\n"));
                dump.push_str(&format!("CREATE TABLE `{table}` (v text);\n"));
                for row in rows {
                    dump.push_str(&format!("INSERT INTO `{table}` VALUES ('{row}');\n"));
                }
            }
            let Some(dir) = mount(spec) else {
                return failed("no mount");
            };
            match std::fs::write(dir.join(name), dump) {
                Ok(()) => ok(""),
                Err(e) => failed(&e.to_string()),
            }
        }
        "mysql" => {
            let sql = spec.arg_after("-e").unwrap_or_default();
            if sql == "SHOW TABLES" {
                ok(&db.keys().cloned().collect::<Vec<_>>().join("\n"))
            } else if sql == "SELECT 1" {
                ok("1\n")
            } else if sql.contains("DROP TABLE") {
                for name in backticked(sql) {
                    db.remove(&name);
                }
                ok("")
            } else if let Some(file) = sql.strip_prefix("source /work/") {
                let Some(dir) = mount(spec) else {
                    return failed("no mount");
                };
                match std::fs::read_to_string(dir.join(file)) {
                    Ok(dump) => {
                        load_dump(db, &dump);
                        ok("")
                    }
                    Err(e) => failed(&format!("Failed to open file '{file}': {e}")),
                }
            } else {
                failed(&format!("unsupported statement: {sql}"))
            }
        }
        _ => failed("unknown tool"),
    }
}

fn backticked(sql: &str) -> Vec<String> {
    sql.split('`')
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, s)| s.to_string())
        .collect()
}

fn load_dump(db: &mut Tables, dump: &str) {
    for line in dump.lines() {
        let names = backticked(line);
        let Some(table) = names.first() else { continue };
        if line.starts_with("DROP TABLE") {
            db.remove(table);
        } else if line.starts_with("CREATE TABLE") {
            db.insert(table.clone(), Vec::new());
        } else if line.starts_with("INSERT INTO") {
            if let Some(row) = line
                .split_once("VALUES ('")
                .and_then(|(_, rest)| rest.strip_suffix("');"))
            {
                db.entry(table.clone()).or_default().push(row.to_string());
            }
        }
    }
}

fn search_replace(state: &mut State, spec: &CommandSpec) -> CommandResult {
    // wp-cli refuses to run without core and a wp-config.php
    let bootstrapped = spec
        .arg_after("-c")
        .is_some_and(|script| script.contains("wp core download") && script.contains("wp config create"));
    if !bootstrapped {
        return failed("Error: This does not seem to be a WordPress installation.");
    }
    let prefix = spec
        .args
        .iter()
        .find_map(|a| a.strip_prefix("WORDPRESS_TABLE_PREFIX="))
        .unwrap_or_default()
        .to_string();
    let host = spec
        .args
        .iter()
        .find_map(|a| a.strip_prefix("WORDPRESS_DB_HOST="))
        .and_then(|h| h.split(':').next())
        .unwrap_or_default()
        .to_string();
    let Some(at) = spec.args.iter().position(|a| a == "search-replace") else {
        return failed("not a search-replace");
    };
    let from = spec.args[at + 1].clone();
    let to = spec.args[at + 2].clone();
    let skip: Vec<String> = spec
        .args
        .iter()
        .find_map(|a| a.strip_prefix("--skip-tables="))
        .map(|s| s.split(',').map(String::from).collect())
        .unwrap_or_default();
    let tables: Vec<String> = spec.args[at + 3..]
        .iter()
        .take_while(|a| !a.starts_with("--"))
        .filter(|t| !skip.contains(t))
        .filter(|t| t.starts_with(&prefix))
        .cloned()
        .collect();

    let db = state.databases.entry(host).or_default();
    let mut made = 0;
    for table in tables {
        if let Some(rows) = db.get_mut(&table) {
            for row in rows.iter_mut() {
                made += row.matches(from.as_str()).count();
                *row = row.replace(&from, &to);
            }
        }
    }
    ok(&format!("Success: Made {made} replacements."))
}

/// Configuration pointing every root at `dir`.
pub fn config(dir: &Path, with_storage: bool) -> Arc<MigratorConfig> {
    let storage = if with_storage {
        r#""storage": {"bucket": "wfu-site-archive", "prefix": "site-migrations"},"#
    } else {
        ""
    };
    let json = format!(
        r#"{{
            {storage}
            "work_root": {work:?},
            "backup_root": {backups:?},
            "file_buckets": {{"prod": "media-prod", "pprd": "media-pprd"}},
            "databases": {{
                "prod": {{"host": "prod-db", "user": "migrator", "password": "prod-secret", "database": "wordpress"}},
                "pprd": {{"host": "pprd-db", "user": "migrator", "password": "pprd-secret", "database": "wordpress"}},
                "staging": {{"host": "staging-db", "user": "root", "database": "staging"}}
            }}
        }}"#,
        work = dir.join("work").display().to_string(),
        backups = dir.join("backups").display().to_string(),
    );
    Arc::new(MigratorConfig::from_json_str(&json).unwrap())
}

/// Prod holds site 43 plus network and other-site tables; pprd holds an
/// older copy of site 43.
pub fn network() -> FakeInfra {
    FakeInfra::new()
        .with_table(
            "prod-db",
            "wp_43_posts",
            &[
                "<a href=\"https://magazine.wfu.edu/x\">story</a>",
                "https://wfu-cer-wordpress-prod-us.s3.amazonaws.com/sites/43/logo.png",
                "https://d1ckb6ynmxdxtv.cloudfront.net/sites/43/hero.jpg",
            ],
        )
        .with_table("prod-db", "wp_43_options", &["siteurl=https://magazine.wfu.edu"])
        .with_table("prod-db", "wp_users", &["admin admin@wfu.edu"])
        .with_table("prod-db", "wp_5_posts", &["https://other.wfu.edu/"])
        .with_table("pprd-db", "wp_43_posts", &["stale pprd content"])
        .with_table("pprd-db", "wp_43_options", &["siteurl=https://magazine.pprd.wfu.edu"])
        .with_table("pprd-db", "wp_users", &["admin admin@wfu.edu"])
}

pub fn every_row(tables: &Tables) -> Vec<String> {
    tables.values().flatten().cloned().collect()
}
