//! Which tables belong to a site.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::TableConfig;
use crate::error::{MigrationError, Result};

fn numbered_table() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+_").expect("static regex"))
}

/// Table selection for one site.
///
/// Site `N > 1` owns `<prefix>N_*`. The main site owns the unnumbered
/// `<prefix>*` tables except the network-wide ones, and may only be
/// selected when the operator asked for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableScope {
    tenant: u64,
    prefix: String,
}

impl TableScope {
    pub fn new(tenant: u64, prefix: impl Into<String>, include_main_site: bool) -> Result<Self> {
        if tenant == 0 {
            return Err(MigrationError::validation("tenant", "site id must be positive"));
        }
        if tenant == TableConfig::MAIN_SITE_ID && !include_main_site {
            return Err(MigrationError::validation(
                "tenant",
                "site 1 is the network's main site; pass --include-main-site to migrate it",
            ));
        }
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(MigrationError::validation("table_prefix", "must not be empty"));
        }
        Ok(Self { tenant, prefix })
    }

    pub fn tenant(&self) -> u64 {
        self.tenant
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_main_site(&self) -> bool {
        self.tenant == TableConfig::MAIN_SITE_ID
    }

    /// Table prefix WordPress uses for this site alone: `wp_43_`, or the
    /// bare prefix for the main site.
    pub fn site_prefix(&self) -> String {
        if self.is_main_site() {
            self.prefix.clone()
        } else {
            format!("{}{}_", self.prefix, self.tenant)
        }
    }

    /// LIKE-style pattern describing the site's tables, for log output.
    pub fn pattern(&self) -> String {
        if self.is_main_site() {
            format!("{}* (unnumbered)", self.prefix)
        } else {
            format!("{}{}_*", self.prefix, self.tenant)
        }
    }

    pub fn is_network_table(&self, table: &str) -> bool {
        table
            .strip_prefix(&self.prefix)
            .is_some_and(|rest| TableConfig::NETWORK_TABLES.contains(&rest))
    }

    /// Network tables with prefix, as passed to `--skip-tables`.
    pub fn network_tables(&self) -> Vec<String> {
        TableConfig::NETWORK_TABLES
            .iter()
            .map(|t| format!("{}{t}", self.prefix))
            .collect()
    }

    pub fn contains(&self, table: &str) -> bool {
        let Some(rest) = table.strip_prefix(&self.prefix) else {
            return false;
        };
        if self.is_network_table(table) {
            return false;
        }
        if self.is_main_site() {
            !rest.is_empty() && !numbered_table().is_match(rest)
        } else {
            rest.strip_prefix(&self.tenant.to_string())
                .and_then(|r| r.strip_prefix('_'))
                .is_some_and(|r| !r.is_empty())
        }
    }

    /// The site's tables out of `tables`, sorted.
    pub fn select(&self, tables: &[String]) -> Vec<String> {
        let mut selected: Vec<String> = tables.iter().filter(|t| self.contains(t)).cloned().collect();
        selected.sort();
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> Vec<String> {
        [
            "wp_users",
            "wp_usermeta",
            "wp_blogs",
            "wp_site",
            "wp_sitemeta",
            "wp_options",
            "wp_posts",
            "wp_4_options",
            "wp_43_options",
            "wp_43_posts",
            "wp_43_postmeta",
            "wp_430_posts",
            "other_table",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[test]
    fn test_select_numbered_site() {
        let scope = TableScope::new(43, "wp_", false).unwrap();
        assert_eq!(
            scope.select(&tables()),
            vec!["wp_43_options", "wp_43_postmeta", "wp_43_posts"]
        );
        assert_eq!(scope.pattern(), "wp_43_*");
    }

    #[test]
    fn test_select_main_site_excludes_network_and_numbered() {
        let scope = TableScope::new(1, "wp_", true).unwrap();
        assert_eq!(scope.select(&tables()), vec!["wp_options", "wp_posts"]);
    }

    #[test]
    fn test_main_site_requires_opt_in() {
        let err = TableScope::new(1, "wp_", false).unwrap_err();
        assert!(matches!(err, MigrationError::Validation { .. }));
        assert!(TableScope::new(0, "wp_", true).is_err());
    }

    #[test]
    fn test_network_tables() {
        let scope = TableScope::new(43, "wp_", false).unwrap();
        assert!(scope.is_network_table("wp_users"));
        assert!(!scope.is_network_table("wp_43_users"));
        assert!(scope.network_tables().contains(&"wp_blogs".to_string()));
    }

    #[test]
    fn test_custom_prefix() {
        let scope = TableScope::new(7, "cms_", false).unwrap();
        let tables = vec!["cms_7_posts".to_string(), "wp_7_posts".to_string()];
        assert_eq!(scope.select(&tables), vec!["cms_7_posts"]);
        assert_eq!(scope.site_prefix(), "cms_7_");
    }

    #[test]
    fn test_site_prefix_for_main_site() {
        let scope = TableScope::new(1, "wp_", true).unwrap();
        assert_eq!(scope.site_prefix(), "wp_");
    }
}
