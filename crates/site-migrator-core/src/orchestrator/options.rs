//! Operator choices for one migration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::ExecutionConfig;
use crate::environment::Environment;
use crate::error::{MigrationError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationOptions {
    pub tenant: u64,
    pub source: Environment,
    pub target: Environment,
    /// Log every action instead of performing it.
    pub dry_run: bool,
    /// Skip the confirmation prompt.
    pub force: bool,
    /// Do not export the target's tables before overwriting them.
    pub skip_backup: bool,
    /// Archive locally even when object storage is configured.
    pub skip_s3: bool,
    /// Also sync uploaded media between the environments' buckets.
    pub sync_files: bool,
    /// Keep the working directory and artifacts after a successful run.
    pub keep_files: bool,
    /// Allow migrating the network's main site.
    pub include_main_site: bool,
    pub verbose: bool,
    /// Parent directory for the run's working directory.
    pub work_dir: Option<PathBuf>,
    /// Per export/import call.
    pub timeout_minutes: u64,
    /// Extra `source:target` rewrite rule.
    pub custom_domain: Option<String>,
}

impl MigrationOptions {
    pub fn new(tenant: u64, source: Environment, target: Environment) -> Self {
        Self {
            tenant,
            source,
            target,
            dry_run: false,
            force: false,
            skip_backup: false,
            skip_s3: false,
            sync_files: false,
            keep_files: false,
            include_main_site: false,
            verbose: false,
            work_dir: None,
            timeout_minutes: ExecutionConfig::DEFAULT_TIMEOUT_MINUTES,
            custom_domain: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes * 60)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tenant == 0 {
            return Err(MigrationError::validation("tenant", "site id must be positive"));
        }
        if self.source == self.target {
            return Err(MigrationError::validation(
                "target",
                format!("source and target are both {}", self.source),
            ));
        }
        if self.timeout_minutes == 0 || self.timeout_minutes > ExecutionConfig::MAX_TIMEOUT_MINUTES {
            return Err(MigrationError::validation(
                "timeout",
                format!(
                    "must be between 1 and {} minutes",
                    ExecutionConfig::MAX_TIMEOUT_MINUTES
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let options = MigrationOptions::new(43, Environment::Prod, Environment::Pprd);
        assert!(options.validate().is_ok());
        assert_eq!(options.timeout(), Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_rejects_bad_input() {
        let mut options = MigrationOptions::new(0, Environment::Prod, Environment::Pprd);
        assert!(options.validate().is_err());

        options.tenant = 43;
        options.target = Environment::Prod;
        let err = options.validate().unwrap_err();
        assert_eq!(err.exit_code(), 2);

        options.target = Environment::Pprd;
        options.timeout_minutes = 0;
        assert!(options.validate().is_err());
        options.timeout_minutes = ExecutionConfig::MAX_TIMEOUT_MINUTES + 1;
        assert!(options.validate().is_err());
    }
}
