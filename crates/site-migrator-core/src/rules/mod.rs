//! Rewrite rules and the environment mapping resolver.
//!
//! A rule is a literal `from -> to` substring replacement. Rules run in
//! order, so a later rule sees the output of the earlier ones. Migrations
//! out of production rely on this: the suffix rule turns `.wfu.edu` into
//! `.pprd.wfu.edu` everywhere, including hosts that were already
//! `.pprd.wfu.edu`, and the following collapse rule removes the doubled
//! label again.

mod profile;

pub use profile::EnvironmentProfile;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::ProfileOverride;
use crate::environment::Environment;
use crate::error::{MigrationError, Result};

/// Environment pairs with a registered rule set.
const SUPPORTED_PATHS: &[(Environment, Environment)] = &[
    (Environment::Prod, Environment::Pprd),
    (Environment::Prod, Environment::Uat),
    (Environment::Prod, Environment::Dev),
    (Environment::Pprd, Environment::Prod),
    (Environment::Pprd, Environment::Uat),
    (Environment::Pprd, Environment::Dev),
    (Environment::Uat, Environment::Pprd),
    (Environment::Uat, Environment::Dev),
    (Environment::Dev, Environment::Uat),
];

/// Which partition a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Url,
    ObjectStorage,
    Custom,
}

/// An ordered literal replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub from: String,
    pub to: String,
    pub kind: RuleKind,
}

impl RewriteRule {
    pub fn new(from: impl Into<String>, to: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
        }
    }

    /// Parse an operator-supplied `source:target` rule.
    ///
    /// Exactly one `:` is allowed and both sides must be non-empty, so
    /// values containing a scheme (`https://...`) are rejected.
    pub fn parse_custom(input: &str) -> Result<Self> {
        let invalid = |reason: &str| MigrationError::InvalidCustomRule {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let delimiters = input.matches(':').count();
        if delimiters != 1 {
            return Err(invalid(&format!(
                "expected exactly one ':' delimiter, found {delimiters}"
            )));
        }

        let (from, to) = input.split_once(':').ok_or_else(|| invalid("missing ':'"))?;
        let (from, to) = (from.trim(), to.trim());
        if from.is_empty() || to.is_empty() {
            return Err(invalid("both sides must be non-empty"));
        }
        if from == to {
            return Err(invalid("source and target are identical"));
        }

        Ok(Self::new(from, to, RuleKind::Custom))
    }

    pub fn apply(&self, text: &str) -> String {
        text.replace(&self.from, &self.to)
    }
}

impl fmt::Display for RewriteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// The resolved, ordered rules for one migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub source: Environment,
    pub target: Environment,
    rules: Vec<RewriteRule>,
}

impl RuleSet {
    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn of_kind(&self, kind: RuleKind) -> impl Iterator<Item = &RewriteRule> {
        self.rules.iter().filter(move |r| r.kind == kind)
    }

    /// Apply every rule in order to an in-memory string.
    pub fn rewrite(&self, text: &str) -> String {
        self.rules
            .iter()
            .fold(text.to_string(), |acc, rule| rule.apply(&acc))
    }
}

/// Maps an environment pair to its rewrite rules.
#[derive(Debug, Clone)]
pub struct EnvironmentMappingResolver {
    profiles: HashMap<Environment, EnvironmentProfile>,
}

impl Default for EnvironmentMappingResolver {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

impl EnvironmentMappingResolver {
    /// Build from the built-in profiles plus operator overrides.
    pub fn new(overrides: &HashMap<Environment, ProfileOverride>) -> Self {
        let profiles = Environment::ALL
            .into_iter()
            .map(|env| {
                let profile = EnvironmentProfile::builtin(env);
                let profile = match overrides.get(&env) {
                    Some(over) => profile.with_override(over),
                    None => profile,
                };
                (env, profile)
            })
            .collect();
        Self { profiles }
    }

    pub fn profile(&self, env: Environment) -> &EnvironmentProfile {
        // Every environment is inserted in `new`.
        &self.profiles[&env]
    }

    pub fn is_supported(source: Environment, target: Environment) -> bool {
        SUPPORTED_PATHS.contains(&(source, target))
    }

    pub fn supported_paths() -> &'static [(Environment, Environment)] {
        SUPPORTED_PATHS
    }

    /// Registered rules for `source -> target`: URL rules, then
    /// object-storage rules.
    pub fn resolve(&self, source: Environment, target: Environment) -> Result<Vec<RewriteRule>> {
        if source == target {
            return Err(MigrationError::validation(
                "target",
                format!("source and target are both {source}"),
            ));
        }
        if !Self::is_supported(source, target) {
            return Err(MigrationError::UnsupportedPath {
                source_env: source,
                target_env: target,
            });
        }

        let from = self.profile(source);
        let to = self.profile(target);
        let mut rules = Vec::new();

        rules.push(RewriteRule::new(&from.url_suffix, &to.url_suffix, RuleKind::Url));
        if let Some(label) = to.url_suffix.strip_suffix(from.url_suffix.as_str()) {
            if !label.is_empty() {
                rules.push(RewriteRule::new(
                    format!("{label}{}", to.url_suffix),
                    &to.url_suffix,
                    RuleKind::Url,
                ));
            }
        }

        rules.push(RewriteRule::new(&from.bucket, &to.bucket, RuleKind::ObjectStorage));
        rules.push(RewriteRule::new(
            &from.cdn_domain,
            &to.cdn_domain,
            RuleKind::ObjectStorage,
        ));

        rules.retain(|r| r.from != r.to);
        Ok(rules)
    }

    /// Resolve the registered rules and append the optional custom rule.
    ///
    /// The custom rule is validated even when the pair is unsupported, so a
    /// malformed argument is always reported as such.
    pub fn resolve_with_custom(
        &self,
        source: Environment,
        target: Environment,
        custom: Option<&str>,
    ) -> Result<RuleSet> {
        let custom = custom.map(RewriteRule::parse_custom).transpose()?;
        let mut rules = self.resolve(source, target)?;
        rules.extend(custom);
        Ok(RuleSet {
            source,
            target,
            rules,
        })
    }
}
