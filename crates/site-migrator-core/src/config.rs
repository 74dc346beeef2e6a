//! Centralized configuration for the site migrator.
//!
//! Constant groups hold the fixed defaults. `MigratorConfig` is the
//! operator-supplied part (database connections, archival bucket, container
//! settings), loaded from a JSON file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::environment::{DbTarget, Environment};
use crate::error::{MigrationError, Result};

/// Timeouts and execution limits.
pub struct ExecutionConfig;

impl ExecutionConfig {
    pub const DEFAULT_TIMEOUT_MINUTES: u64 = 30;
    pub const MAX_TIMEOUT_MINUTES: u64 = 24 * 60;
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
    pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30 * 60);
    pub const FILE_SYNC_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);
    /// Lines of child stderr kept in error messages.
    pub const STDERR_TAIL_LINES: usize = 20;
}

/// Directory and file names.
pub struct PathsConfig;

impl PathsConfig {
    pub const APP_DIR_NAME: &'static str = "site-migrator";
    pub const CONFIG_FILE_NAME: &'static str = "config.json";
    pub const CONFIG_ENV_VAR: &'static str = "SITE_MIGRATOR_CONFIG";
    pub const WORK_DIR_NAME: &'static str = "work";
    pub const BACKUP_DIR_NAME: &'static str = "backups";
    pub const LOCK_FILE_NAME: &'static str = "staging.lock";
    pub const METADATA_FILE_NAME: &'static str = "metadata.json";
    /// Mount point of the run directory inside tool containers.
    pub const CONTAINER_WORK_DIR: &'static str = "/work";
}

/// Multisite table layout.
pub struct TableConfig;

impl TableConfig {
    pub const DEFAULT_PREFIX: &'static str = "wp_";
    pub const MAIN_SITE_ID: u64 = 1;
    /// Network-wide tables, without prefix. Never exported per site and never rewritten.
    pub const NETWORK_TABLES: &'static [&'static str] = &[
        "users",
        "usermeta",
        "blogs",
        "blogmeta",
        "site",
        "sitemeta",
        "signups",
        "registration_log",
        "blog_versions",
    ];
}

/// Connection descriptor for one database.
#[derive(Clone, Serialize, Deserialize)]
pub struct DbConnection {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub user: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Name of an environment variable holding the password.
    #[serde(default)]
    pub password_env: Option<String>,
    pub database: String,
    #[serde(default)]
    pub table_prefix: Option<String>,
}

impl DbConnection {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(3306)
    }

    pub fn table_prefix(&self) -> &str {
        self.table_prefix
            .as_deref()
            .unwrap_or(TableConfig::DEFAULT_PREFIX)
    }

    /// Resolve the password, preferring the literal value over `password_env`.
    pub fn password(&self) -> Result<Option<String>> {
        if let Some(password) = &self.password {
            return Ok(Some(password.clone()));
        }
        match &self.password_env {
            Some(var) => std::env::var(var).map(Some).map_err(|_| MigrationError::Config {
                message: format!("environment variable {var} is not set (password for {})", self.host),
            }),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConnection")
            .field("host", &self.host)
            .field("port", &self.port())
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("password_env", &self.password_env)
            .field("database", &self.database)
            .finish()
    }
}

/// Container runtime settings for the dump, restore and rewrite tools.
///
/// Tool containers join `network`, Docker's default `bridge` unless
/// configured: they get their own network namespace and reach database
/// hosts through NAT, but not services bound to the operator's loopback.
/// Databases listening only on `127.0.0.1` need `"host"` here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    pub runtime: String,
    pub mysql_image: String,
    pub wpcli_image: String,
    /// WordPress core inside the wp-cli container. Downloaded there on
    /// each rewrite unless the image already ships it at this path.
    pub wordpress_path: String,
    pub network: String,
    pub memory: String,
    pub cpus: String,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            mysql_image: "mysql:8.0".to_string(),
            wpcli_image: "wordpress:cli".to_string(),
            wordpress_path: "/tmp/wordpress".to_string(),
            network: "bridge".to_string(),
            memory: "2g".to_string(),
            cpus: "2".to_string(),
        }
    }
}

/// Object-storage location for archived artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    pub bucket: String,
    #[serde(default = "default_archive_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

fn default_archive_prefix() -> String {
    "site-migrations".to_string()
}

/// Per-environment override of the built-in rewrite profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverride {
    #[serde(default)]
    pub url_suffix: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub cdn_domain: Option<String>,
}

/// Operator-supplied configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigratorConfig {
    /// Keyed by `dev`, `uat`, `pprd`, `prod` and `staging`.
    #[serde(default)]
    pub databases: HashMap<String, DbConnection>,
    #[serde(default)]
    pub storage: Option<StorageSettings>,
    /// Media buckets used by the optional file sync.
    #[serde(default)]
    pub file_buckets: HashMap<Environment, String>,
    #[serde(default)]
    pub profiles: HashMap<Environment, ProfileOverride>,
    #[serde(default)]
    pub container: ContainerSettings,
    #[serde(default)]
    pub backup_root: Option<PathBuf>,
    #[serde(default)]
    pub work_root: Option<PathBuf>,
}

impl MigratorConfig {
    /// Load configuration from `path`, `$SITE_MIGRATOR_CONFIG`, or the
    /// default location, in that order.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match std::env::var_os(PathsConfig::CONFIG_ENV_VAR) {
                Some(p) => PathBuf::from(p),
                None => Self::default_path().ok_or_else(|| MigrationError::Config {
                    message: "cannot determine the user config directory; pass --config".into(),
                })?,
            },
        };

        debug!("Loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| MigrationError::io("reading configuration", &path, e))?;
        Self::from_json_str(&contents).map_err(|e| MigrationError::Config {
            message: format!("{}: {e}", path.display()),
        })
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let config: MigratorConfig = serde_json::from_str(contents)?;
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| {
            d.join(PathsConfig::APP_DIR_NAME)
                .join(PathsConfig::CONFIG_FILE_NAME)
        })
    }

    /// Connection descriptor for a database, or `MissingConnection`.
    pub fn connection(&self, target: DbTarget) -> Result<&DbConnection> {
        self.databases
            .get(target.as_str())
            .ok_or_else(|| MigrationError::MissingConnection {
                target: target.to_string(),
            })
    }

    pub fn work_root(&self) -> PathBuf {
        self.work_root
            .clone()
            .unwrap_or_else(|| Self::data_dir().join(PathsConfig::WORK_DIR_NAME))
    }

    pub fn backup_root(&self) -> PathBuf {
        self.backup_root
            .clone()
            .unwrap_or_else(|| Self::data_dir().join(PathsConfig::BACKUP_DIR_NAME))
    }

    fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join(PathsConfig::APP_DIR_NAME)
    }
}
