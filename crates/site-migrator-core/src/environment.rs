//! Deployment environments and database endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MigrationError;

/// A named deployment environment that can be a migration endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Uat,
    Pprd,
    Prod,
}

impl Environment {
    pub const ALL: [Environment; 4] = [
        Environment::Dev,
        Environment::Uat,
        Environment::Pprd,
        Environment::Prod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Uat => "uat",
            Environment::Pprd => "pprd",
            Environment::Prod => "prod",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Prod)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "uat" => Ok(Environment::Uat),
            "pprd" => Ok(Environment::Pprd),
            "prod" => Ok(Environment::Prod),
            other => Err(MigrationError::validation(
                "environment",
                format!("unknown environment {other:?} (expected dev, uat, pprd or prod)"),
            )),
        }
    }
}

/// A database the migrator can talk to.
///
/// `Staging` is the transformation workspace; it is never a migration
/// source or target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbTarget {
    Env(Environment),
    Staging,
}

impl DbTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbTarget::Env(env) => env.as_str(),
            DbTarget::Staging => "staging",
        }
    }
}

impl From<Environment> for DbTarget {
    fn from(env: Environment) -> Self {
        DbTarget::Env(env)
    }
}

impl fmt::Display for DbTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
