//! Maps the current host to a site profile.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::TrackingConfig;

/// Everything the tracker needs to know about the site it runs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteProfile {
    pub name: String,
    pub domain: String,
    pub cross_domain_enabled: bool,
    pub internal_filter_domain: String,
    pub org_id: String,
    pub tracking_server: String,
    pub tracking_server_secure: String,
    pub cross_domain_domain_set: BTreeSet<String>,
}

impl SiteProfile {
    /// Profile used when no configured site matches: cross-domain disabled,
    /// every vendor field empty.
    pub fn unresolved(host: &str) -> Self {
        Self {
            name: String::new(),
            domain: host.to_string(),
            cross_domain_enabled: false,
            internal_filter_domain: String::new(),
            org_id: String::new(),
            tracking_server: String::new(),
            tracking_server_secure: String::new(),
            cross_domain_domain_set: BTreeSet::new(),
        }
    }

    /// Whether this profile came from configuration.
    pub fn is_resolved(&self) -> bool {
        !self.name.is_empty()
    }

    /// Name used for first-touch attribution: the site name, or the host.
    pub fn attribution_name(&self) -> &str {
        if self.name.is_empty() {
            &self.domain
        } else {
            &self.name
        }
    }

    /// Whether `host` belongs to the cross-domain family.
    pub fn is_cross_domain_target(&self, host: &str) -> bool {
        self.cross_domain_domain_set.contains(host)
    }
}

/// Resolves hosts against a configuration.
#[derive(Debug, Clone)]
pub struct SiteResolver<'a> {
    config: &'a TrackingConfig,
}

impl<'a> SiteResolver<'a> {
    pub fn new(config: &'a TrackingConfig) -> Self {
        Self { config }
    }

    /// First site whose `domain` equals `host` exactly.
    pub fn resolve_current_site(&self, host: &str) -> Option<SiteProfile> {
        let site = self.config.sites.iter().find(|s| s.domain == host)?;
        Some(SiteProfile {
            name: site.name.clone(),
            domain: site.domain.clone(),
            cross_domain_enabled: site.cross_domain_enabled,
            internal_filter_domain: site.link_internal_filters.clone(),
            org_id: self.config.marketing_cloud_org_id.clone(),
            tracking_server: self.config.tracking_server.clone(),
            tracking_server_secure: self.config.tracking_server_secure.clone(),
            cross_domain_domain_set: self.config.cross_domain_domains.iter().cloned().collect(),
        })
    }

    /// Resolve `host`, degrading to [`SiteProfile::unresolved`] on a miss.
    pub fn resolve_or_default(&self, host: &str) -> SiteProfile {
        self.resolve_current_site(host).unwrap_or_else(|| {
            tracing::debug!(host, "No site profile matches host; cross-domain disabled");
            SiteProfile::unresolved(host)
        })
    }
}
