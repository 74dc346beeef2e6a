//! Per-environment literals that appear inside site content.

use serde::{Deserialize, Serialize};

use crate::config::ProfileOverride;
use crate::environment::Environment;

/// The environment-specific strings embedded in a site's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentProfile {
    pub environment: Environment,
    /// Host suffix shared by every site in the environment, with leading dot.
    pub url_suffix: String,
    /// Media offload bucket.
    pub bucket: String,
    /// CDN domain fronting the bucket.
    pub cdn_domain: String,
}

impl EnvironmentProfile {
    /// Built-in profile for an environment.
    pub fn builtin(environment: Environment) -> Self {
        let (url_suffix, bucket, cdn_domain) = match environment {
            Environment::Prod => (
                ".wfu.edu",
                "wfu-cer-wordpress-prod-us",
                "d1ckb6ynmxdxtv.cloudfront.net",
            ),
            Environment::Pprd => (
                ".pprd.wfu.edu",
                "wfu-cer-wordpress-pprd-us",
                "d2f5lbc9pjx7qs.cloudfront.net",
            ),
            Environment::Uat => (
                ".uat.wfu.edu",
                "wfu-cer-wordpress-uat-us",
                "d3ovz1kl9jt5hm.cloudfront.net",
            ),
            Environment::Dev => (
                ".dev.wfu.edu",
                "wfu-cer-wordpress-dev-us",
                "d4j8ywq2ax0nre.cloudfront.net",
            ),
        };

        Self {
            environment,
            url_suffix: url_suffix.to_string(),
            bucket: bucket.to_string(),
            cdn_domain: cdn_domain.to_string(),
        }
    }

    /// Apply the non-empty fields of an operator override.
    pub fn with_override(mut self, over: &ProfileOverride) -> Self {
        if let Some(suffix) = over.url_suffix.as_deref().filter(|s| !s.is_empty()) {
            self.url_suffix = suffix.to_string();
        }
        if let Some(bucket) = over.bucket.as_deref().filter(|s| !s.is_empty()) {
            self.bucket = bucket.to_string();
        }
        if let Some(cdn) = over.cdn_domain.as_deref().filter(|s| !s.is_empty()) {
            self.cdn_domain = cdn.to_string();
        }
        self
    }

    /// Example host for a site in this environment.
    pub fn site_host(&self, slug: &str) -> String {
        format!("{slug}{}", self.url_suffix)
    }
}
