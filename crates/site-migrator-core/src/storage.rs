//! Object-storage CLI invocations.

use crate::config::{ExecutionConfig, StorageSettings};
use crate::process::CommandSpec;

/// `aws <args>` with the configured profile and region appended.
pub fn aws_command<I, S>(settings: Option<&StorageSettings>, args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut spec = CommandSpec::new("aws")
        .args(args)
        .timeout(ExecutionConfig::PROBE_TIMEOUT);
    if let Some(settings) = settings {
        if let Some(profile) = &settings.profile {
            spec = spec.args(["--profile", profile.as_str()]);
        }
        if let Some(region) = &settings.region {
            spec = spec.args(["--region", region.as_str()]);
        }
    }
    spec
}

/// `s3://<bucket>/<prefix>/site-<id>/<timestamp>/`
pub fn archive_uri(settings: &StorageSettings, tenant: u64, timestamp_label: &str) -> String {
    let prefix = settings.prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("s3://{}/site-{}/{}/", settings.bucket, tenant, timestamp_label)
    } else {
        format!(
            "s3://{}/{}/site-{}/{}/",
            settings.bucket, prefix, tenant, timestamp_label
        )
    }
}
