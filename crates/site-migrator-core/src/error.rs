//! Error types for the site migrator.
//!
//! Fatal variants abort a run; `Archival`, `FileSync` and `Cleanup` are
//! absorbed by the orchestrator and surface as warnings in the report.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::environment::Environment;

/// Main error type for the site migrator.
#[derive(Debug, Error)]
pub enum MigrationError {
    // Input validation
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("No rewrite rules registered for {source_env} -> {target_env}")]
    UnsupportedPath {
        source_env: Environment,
        target_env: Environment,
    },

    #[error("Invalid custom domain rule {input:?}: {reason}")]
    InvalidCustomRule { input: String, reason: String },

    // Preflight
    #[error("Required dependency unavailable: {name}: {message}")]
    DependencyUnavailable { name: String, message: String },

    #[error("No database connection configured for {target}")]
    MissingConnection { target: String },

    #[error("Site {tenant} has no tables in {environment}")]
    TenantNotFound { tenant: u64, environment: String },

    #[error("Staging database is locked by another run ({lock_file})")]
    StagingLocked { lock_file: PathBuf },

    // Export / import
    #[error("Export from {environment} timed out after {after:?}")]
    ExportTimeout { environment: String, after: Duration },

    #[error("Export from {environment} failed: {message}")]
    ExportProcess { environment: String, message: String },

    #[error("Import into {environment} timed out after {after:?}")]
    ImportTimeout { environment: String, after: Duration },

    #[error("Import into {environment} failed: {message}")]
    ImportProcess { environment: String, message: String },

    #[error("Database command on {target} failed: {message}")]
    Database { target: String, message: String },

    #[error("Search-replace failed on rule {rule}: {message}")]
    Rewrite { rule: String, message: String },

    // Recoverable
    #[error("Archival failed: {message}")]
    Archival { message: String },

    #[error("File sync failed: {message}")]
    FileSync { message: String },

    #[error("Cleanup failed: {message}")]
    Cleanup { message: String },

    #[error("Migration aborted by operator")]
    Aborted,

    // Configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Result type alias for migrator operations.
pub type Result<T> = std::result::Result<T, MigrationError>;

impl From<std::io::Error> for MigrationError {
    fn from(err: std::io::Error) -> Self {
        MigrationError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for MigrationError {
    fn from(err: serde_json::Error) -> Self {
        MigrationError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl MigrationError {
    /// Create an IO error with a description of what was being attempted.
    pub fn io(context: &str, path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        MigrationError::Io {
            message: format!("{context}: {err}"),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Shorthand for a field validation failure.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        MigrationError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Map the error to a process exit code.
    ///
    /// - 2: bad input or unsupported environment pair
    /// - 3: missing tooling or configuration
    /// - 4: site has no data in the source
    /// - 5: export, import or rewrite failure
    /// - 6: archival failed on every sink
    /// - 7: operator declined the confirmation
    /// - 8: another run holds the staging lock
    pub fn exit_code(&self) -> i32 {
        match self {
            MigrationError::Validation { .. }
            | MigrationError::UnsupportedPath { .. }
            | MigrationError::InvalidCustomRule { .. } => 2,

            MigrationError::DependencyUnavailable { .. }
            | MigrationError::MissingConnection { .. }
            | MigrationError::Config { .. } => 3,

            MigrationError::TenantNotFound { .. } => 4,

            MigrationError::ExportTimeout { .. }
            | MigrationError::ExportProcess { .. }
            | MigrationError::ImportTimeout { .. }
            | MigrationError::ImportProcess { .. }
            | MigrationError::Database { .. }
            | MigrationError::Rewrite { .. } => 5,

            MigrationError::Archival { .. } => 6,

            MigrationError::Aborted => 7,

            MigrationError::StagingLocked { .. } => 8,

            _ => 1,
        }
    }

    /// Whether the orchestrator absorbs this error as a warning.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MigrationError::Archival { .. }
                | MigrationError::FileSync { .. }
                | MigrationError::Cleanup { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MigrationError::TenantNotFound {
            tenant: 43,
            environment: "prod".into(),
        };
        assert_eq!(err.to_string(), "Site 43 has no tables in prod");

        let err = MigrationError::UnsupportedPath {
            source_env: Environment::Dev,
            target_env: Environment::Prod,
        };
        assert_eq!(err.to_string(), "No rewrite rules registered for dev -> prod");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            MigrationError::validation("tenant", "must be positive").exit_code(),
            2
        );
        assert_eq!(
            MigrationError::ExportTimeout {
                environment: "prod".into(),
                after: Duration::from_secs(60),
            }
            .exit_code(),
            5
        );
        assert_eq!(MigrationError::Aborted.exit_code(), 7);
        assert_eq!(
            MigrationError::Io {
                message: "boom".into(),
                path: None,
                source: None,
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(MigrationError::Archival {
            message: "s3 down".into()
        }
        .is_recoverable());
        assert!(MigrationError::Cleanup {
            message: "busy".into()
        }
        .is_recoverable());
        assert!(!MigrationError::ImportProcess {
            environment: "pprd".into(),
            message: "exit 1".into()
        }
        .is_recoverable());
    }
}
