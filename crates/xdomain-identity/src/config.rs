//! Tracking configuration: site table, vendor identifiers and tag URLs.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{TrackingError, TrackingResult};

/// Marker class identifying links that carry identity to another origin.
pub const DEFAULT_MARKER_CLASS: &str = "cross-domain-link";

/// Maximum number of persisted log entries.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Per-site settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    pub name: String,
    /// Host (with port) this site is served from, e.g. `site-a.local:3001`.
    pub domain: String,
    #[serde(default)]
    pub cross_domain_enabled: bool,
    #[serde(default)]
    pub link_internal_filters: String,
}

/// Which tag URL to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagEnvironment {
    #[default]
    Production,
    Development,
    Staging,
}

/// Full tracking configuration.
///
/// Every field has a default, so a partial (or empty) JSON document is a
/// valid configuration. Empty strings mean "not configured".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackingConfig {
    pub tags_url: String,
    pub tags_url_dev: String,
    pub tags_url_staging: String,
    /// Whether the tag script is loaded without blocking the page.
    pub async_load: bool,
    /// Ordered; the first site whose domain matches wins.
    pub sites: Vec<SiteConfig>,
    pub cross_domain_domains: Vec<String>,
    pub marketing_cloud_org_id: String,
    pub tracking_server: String,
    pub tracking_server_secure: String,
    pub marker_class: String,
    pub log_capacity: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tags_url: String::new(),
            tags_url_dev: String::new(),
            tags_url_staging: String::new(),
            async_load: true,
            sites: Vec::new(),
            cross_domain_domains: Vec::new(),
            marketing_cloud_org_id: String::new(),
            tracking_server: String::new(),
            tracking_server_secure: String::new(),
            marker_class: DEFAULT_MARKER_CLASS.to_string(),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl TrackingConfig {
    /// The three-site demo family: A and B share identity, C stays isolated.
    pub fn demo() -> Self {
        let site = |name: &str, domain: &str, cross_domain_enabled: bool| SiteConfig {
            name: name.to_string(),
            domain: domain.to_string(),
            cross_domain_enabled,
            link_internal_filters: domain.to_string(),
        };

        Self {
            sites: vec![
                site("Site A", "site-a.local:3001", true),
                site("Site B", "site-b.local:3002", true),
                site("Site C", "site-c.local:3003", false),
            ],
            cross_domain_domains: vec![
                "site-a.local:3001".to_string(),
                "site-b.local:3002".to_string(),
            ],
            ..Self::default()
        }
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> TrackingResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_file(path: &Path) -> TrackingResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Check structural constraints that serde cannot express.
    pub fn validate(&self) -> TrackingResult<()> {
        if self.log_capacity == 0 {
            return Err(TrackingError::Config(
                "logCapacity must be at least 1".to_string(),
            ));
        }

        for (i, site) in self.sites.iter().enumerate() {
            if site.name.trim().is_empty() {
                return Err(TrackingError::Config(format!("sites[{i}] has an empty name")));
            }
            if site.domain.trim().is_empty() {
                return Err(TrackingError::Config(format!(
                    "site {:?} has an empty domain",
                    site.name
                )));
            }
            if self.sites[..i].iter().any(|s| s.name == site.name) {
                return Err(TrackingError::Config(format!(
                    "duplicate site name {:?}",
                    site.name
                )));
            }
        }

        Ok(())
    }

    /// Whether a tag URL is configured at all.
    pub fn is_tags_configured(&self) -> bool {
        !self.tags_url.is_empty()
    }

    /// The tag URL for an environment, falling back to production.
    pub fn tags_url_for(&self, env: TagEnvironment) -> Option<&str> {
        let candidate = match env {
            TagEnvironment::Production => &self.tags_url,
            TagEnvironment::Development => &self.tags_url_dev,
            TagEnvironment::Staging => &self.tags_url_staging,
        };
        [candidate, &self.tags_url]
            .into_iter()
            .find(|url| !url.is_empty())
            .map(String::as_str)
    }

    /// Marker class, falling back to the default when blank.
    pub fn marker_class(&self) -> &str {
        if self.marker_class.trim().is_empty() {
            DEFAULT_MARKER_CLASS
        } else {
            &self.marker_class
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_valid() {
        let config = TrackingConfig::from_json("{}").unwrap();
        assert!(config.sites.is_empty());
        assert!(!config.is_tags_configured());
        assert!(config.marketing_cloud_org_id.is_empty());
        assert_eq!(config.log_capacity, DEFAULT_LOG_CAPACITY);
        assert!(config.async_load);
    }

    #[test]
    fn test_partial_document() {
        let config = TrackingConfig::from_json(
            r#"{
                "sites": [{"name": "Shop", "domain": "shop.example"}],
                "marketingCloudOrgId": "ACME@AdobeOrg"
            }"#,
        )
        .unwrap();
        assert_eq!(config.sites[0].name, "Shop");
        assert!(!config.sites[0].cross_domain_enabled);
        assert_eq!(config.marketing_cloud_org_id, "ACME@AdobeOrg");
        assert_eq!(config.marker_class(), DEFAULT_MARKER_CLASS);
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut config = TrackingConfig::demo();
        config.sites.push(config.sites[0].clone());
        assert!(matches!(config.validate(), Err(TrackingError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_domain() {
        let result = TrackingConfig::from_json(r#"{"sites": [{"name": "X", "domain": " "}]}"#);
        assert!(matches!(result, Err(TrackingError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let result = TrackingConfig::from_json(r#"{"logCapacity": 0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_tags_url_fallback() {
        let mut config = TrackingConfig::demo();
        assert_eq!(config.tags_url_for(TagEnvironment::Staging), None);

        config.tags_url = "//assets.example/launch.min.js".to_string();
        assert!(config.is_tags_configured());
        assert_eq!(
            config.tags_url_for(TagEnvironment::Development),
            Some("//assets.example/launch.min.js")
        );

        config.tags_url_dev = "//assets.example/launch-dev.min.js".to_string();
        assert_eq!(
            config.tags_url_for(TagEnvironment::Development),
            Some("//assets.example/launch-dev.min.js")
        );
    }

    #[test]
    fn test_demo_config() {
        let config = TrackingConfig::demo();
        assert!(config.validate().is_ok());
        assert_eq!(config.sites.len(), 3);
        assert!(!config.sites[2].cross_domain_enabled);
        assert!(!config
            .cross_domain_domains
            .contains(&"site-c.local:3003".to_string()));
    }
}
