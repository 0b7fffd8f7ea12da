//! Per-page tracker: wires site resolution, identity, decoration and beacons.
//!
//! One [`Tracker`] is built per page load. Nothing is global; sinks and
//! storage are handed in explicitly.

use serde_json::{json, Map, Value};
use url::Url;

use crate::clock::{Clock, SystemClock};
use crate::codec::{decode_inbound, OutboundIdentity, PLACEHOLDER_ORG_ID};
use crate::config::TrackingConfig;
use crate::decorator::{DecorateOutcome, LinkDecorator};
use crate::document::{Anchor, Document};
use crate::identity::IdentityStore;
use crate::log::{TrackingLog, RECENT_LOG_LEN};
use crate::sink::{TrackingSink, TrackingSnapshot};
use crate::site::{SiteProfile, SiteResolver};
use crate::storage::StorageScopes;
use crate::types::{BeaconKind, BeaconPayload, FirstTouchRecord, LogCategory, TagStatus, TrackingLogEntry};

/// Events delivered by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// The anchor at `index` was clicked.
    LinkClicked { index: usize },
}

/// Where a click leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub url: Url,
    pub target_domain: Option<String>,
    /// Whether the link was (re)decorated before navigating.
    pub decorated: bool,
}

pub struct Tracker {
    site: SiteProfile,
    page_url: Url,
    referrer: String,
    tags_configured: bool,
    identity: IdentityStore,
    log: TrackingLog,
    decorator: LinkDecorator,
    clock: Box<dyn Clock>,
    sinks: Vec<Box<dyn TrackingSink>>,
    tags: TagStatus,
    visitor_id: Option<String>,
    session_id: Option<String>,
    analytics_id: Option<String>,
    initialized: bool,
}

impl Tracker {
    /// Build the tracker for `page_url`, resolving its site profile.
    pub fn new(config: &TrackingConfig, page_url: Url, storage: StorageScopes) -> Self {
        let host = host_with_port(&page_url);
        let site = SiteResolver::new(config).resolve_or_default(&host);
        let decorator = LinkDecorator::new(&page_url, config.marker_class());

        Self {
            site,
            page_url,
            referrer: String::new(),
            tags_configured: config.is_tags_configured(),
            identity: IdentityStore::new(storage),
            log: TrackingLog::with_capacity(config.log_capacity),
            decorator,
            clock: Box::new(SystemClock),
            sinks: Vec::new(),
            tags: TagStatus::default(),
            visitor_id: None,
            session_id: None,
            analytics_id: None,
            initialized: false,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = referrer.into();
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn TrackingSink>) {
        self.sinks.push(sink);
    }

    /// Page-load sequence. A second call is a no-op.
    pub fn init(&mut self, doc: &mut Document, tags: TagStatus) {
        if self.initialized {
            return;
        }
        self.tags = tags;

        self.record(
            LogCategory::System,
            "Tracking core initializing",
            json!({
                "tagsConfigured": self.tags_configured,
                "tagsLoaded": tags.loaded,
                "tagsLoadError": tags.load_error,
            }),
        );

        self.consume_inbound();

        let visitor_id = self
            .identity
            .get_or_create_visitor_id(self.clock.as_ref(), &mut self.log);
        let session_id = self
            .identity
            .get_or_create_session_id(self.clock.as_ref(), &mut self.log);
        self.visitor_id = Some(visitor_id);
        self.session_id = Some(session_id);

        let attribution = self.site.attribution_name().to_string();
        self.identity
            .record_first_touch_if_absent(&attribution, self.clock.as_ref(), &mut self.log);

        self.decorate_marked(doc);
        self.initialized = true;

        self.record(
            LogCategory::System,
            "Tracking core initialized",
            json!({
                "visitorId": self.visitor_id,
                "sessionId": self.session_id,
                "currentSite": self.site.name,
                "crossDomainEnabled": self.site.cross_domain_enabled,
            }),
        );
        self.notify();
    }

    /// Adopt identity carried in the page URL. Composite first, then the
    /// individual parameter, so the individual parameter wins.
    ///
    /// A site with cross-domain disabled ignores inbound identity entirely,
    /// even when a link into it carries one, so an isolated site never joins
    /// the shared visitor.
    fn consume_inbound(&mut self) {
        let inbound = decode_inbound(&self.page_url);
        if inbound.is_empty() {
            return;
        }

        if !self.site.cross_domain_enabled {
            self.record(
                LogCategory::Crossdomain,
                "Ignoring inbound identity; cross-domain disabled for this site",
                json!({ "domain": self.site.domain }),
            );
            return;
        }

        if let Some(composite) = &inbound.composite {
            self.record(
                LogCategory::Crossdomain,
                "Received adobe_mc parameter",
                json!({
                    "visitorId": composite.visitor_id,
                    "orgId": composite.org_id,
                    "timestamp": composite.timestamp,
                    "skippedSegments": composite.skipped,
                }),
            );
            if let Some(visitor_id) = &composite.visitor_id {
                self.identity.adopt_visitor_id(
                    visitor_id,
                    "Stored visitor ID from adobe_mc",
                    self.clock.as_ref(),
                    &mut self.log,
                );
            }
        }

        if let Some(visitor_id) = &inbound.visitor_id {
            self.identity.adopt_visitor_id(
                visitor_id,
                "Received MCID from URL",
                self.clock.as_ref(),
                &mut self.log,
            );
        }

        self.analytics_id = inbound.effective_analytics_id().map(str::to_string);
    }

    /// Decorate every marked link. Returns how many were decorated.
    pub fn decorate_all(&mut self, doc: &mut Document) -> usize {
        let decorated = self.decorate_marked(doc);
        self.notify();
        decorated
    }

    /// Decorate one anchor with the identity current at this instant.
    ///
    /// A malformed href is logged and left as it was.
    pub fn decorate_one(&mut self, anchor: &mut Anchor) -> bool {
        let decorated = self.decorate_anchor(anchor);
        self.notify();
        decorated
    }

    fn decorate_marked(&mut self, doc: &mut Document) -> usize {
        if !self.site.cross_domain_enabled {
            self.record(
                LogCategory::Crossdomain,
                "Cross-domain disabled; links left undecorated",
                json!({ "domain": self.site.domain }),
            );
            return 0;
        }

        let Some(visitor_id) = self.current_visitor_id() else {
            self.record(
                LogCategory::Error,
                "No visitor ID; links left undecorated",
                json!({ "marked": doc.marked(self.decorator.marker_class()).len() }),
            );
            return 0;
        };
        let org_id = self.outbound_org_id();
        let identity = OutboundIdentity {
            visitor_id: &visitor_id,
            org_id: &org_id,
            analytics_id: self.analytics_id.as_deref(),
            timestamp_millis: self.clock.now_millis(),
        };

        let report = self.decorator.decorate_all(doc, &identity);
        for (_, outcome) in report.outcomes.iter().cloned() {
            self.record_outcome(outcome);
        }

        let decorated = report.decorated();
        self.record(
            LogCategory::Crossdomain,
            format!("Decorated {decorated} cross-domain links"),
            json!({
                "marked": report.outcomes.len(),
                "decorated": decorated,
                "failed": report.failed(),
            }),
        );
        decorated
    }

    fn decorate_anchor(&mut self, anchor: &mut Anchor) -> bool {
        let Some(visitor_id) = self.current_visitor_id() else {
            self.record(
                LogCategory::Error,
                "No visitor ID; link left undecorated",
                json!({ "href": anchor.href }),
            );
            return false;
        };
        let org_id = self.outbound_org_id();
        let identity = OutboundIdentity {
            visitor_id: &visitor_id,
            org_id: &org_id,
            analytics_id: self.analytics_id.as_deref(),
            timestamp_millis: self.clock.now_millis(),
        };

        let outcome = self.decorator.decorate_one(anchor, &identity);
        self.record_outcome(outcome)
    }

    /// Log a decoration outcome; true when the anchor was rewritten.
    fn record_outcome(&mut self, outcome: DecorateOutcome) -> bool {
        match outcome {
            DecorateOutcome::Decorated { .. } => true,
            DecorateOutcome::NoHref => false,
            DecorateOutcome::Skipped { href } => {
                tracing::debug!(href = %href, "Skipping non-http link");
                false
            }
            DecorateOutcome::Failed { href, error } => {
                self.record(
                    LogCategory::Error,
                    "Failed to decorate link",
                    json!({ "href": href, "error": error }),
                );
                false
            }
        }
    }

    fn outbound_org_id(&self) -> String {
        match self.site.org_id.as_str() {
            "" => PLACEHOLDER_ORG_ID.to_string(),
            org => org.to_string(),
        }
    }

    /// Visitor id from storage (another tab may have replaced it), else memory.
    fn current_visitor_id(&mut self) -> Option<String> {
        if let Some(stored) = self.identity.visitor_id() {
            self.visitor_id = Some(stored.id);
        }
        self.visitor_id.clone()
    }

    /// Dispatch a page event.
    pub fn handle(&mut self, doc: &mut Document, event: PageEvent) -> Option<Navigation> {
        match event {
            PageEvent::LinkClicked { index } => self.on_link_clicked(doc, index),
        }
    }

    fn on_link_clicked(&mut self, doc: &mut Document, index: usize) -> Option<Navigation> {
        let anchor = doc.anchor_mut(index)?;
        let marked = self.decorator.is_marked(anchor);

        let decorated = marked && self.site.cross_domain_enabled && self.decorate_anchor(anchor);
        let href = anchor.href.clone()?;
        let target_domain = anchor.target_domain.clone();

        let url = match self.decorator.resolve(&href) {
            Ok(url) => url,
            Err(e) => {
                self.record(
                    LogCategory::Error,
                    "Clicked link has an invalid href",
                    json!({ "href": href, "error": e.to_string() }),
                );
                self.notify();
                return None;
            }
        };

        if marked {
            let host = host_with_port(&url);
            self.record(
                LogCategory::Crossdomain,
                "Cross-domain link clicked",
                json!({
                    "targetDomain": target_domain.as_deref().unwrap_or("unknown"),
                    "href": href,
                    "visitorId": self.visitor_id,
                    "inDomainSet": self.site.is_cross_domain_target(&host),
                }),
            );
            self.notify();
        }

        Some(Navigation {
            url,
            target_domain,
            decorated,
        })
    }

    pub fn track_page_view(&mut self, extra: Map<String, Value>) -> BeaconPayload {
        let mut defaults = self.site_fields();
        defaults.insert("referrer".into(), json!(self.referrer));
        let payload = self.beacon(BeaconKind::PageView, defaults, extra);
        self.emit(payload, LogCategory::Pageview, "Page view tracked".to_string())
    }

    pub fn track_event(&mut self, extra: Map<String, Value>) -> BeaconPayload {
        let name = extra
            .get("eventType")
            .and_then(Value::as_str)
            .unwrap_or("(unnamed)")
            .to_string();
        let payload = self.beacon(BeaconKind::Event, self.site_fields(), extra);
        self.emit(payload, LogCategory::Event, format!("Event tracked: {name}"))
    }

    fn site_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("site".into(), json!(self.site.name));
        fields.insert("domain".into(), json!(self.site.domain));
        fields
    }

    /// Merge caller fields over defaults; timestamp and ids stay authoritative.
    fn beacon(
        &self,
        kind: BeaconKind,
        mut fields: Map<String, Value>,
        extra: Map<String, Value>,
    ) -> BeaconPayload {
        for (key, value) in extra {
            if !BeaconPayload::RESERVED_FIELDS.contains(&key.as_str()) {
                fields.insert(key, value);
            }
        }
        BeaconPayload {
            kind,
            timestamp: self.clock.now_rfc3339(),
            visitor_id: self.visitor_id.clone(),
            session_id: self.session_id.clone(),
            fields,
        }
    }

    fn emit(&mut self, payload: BeaconPayload, category: LogCategory, message: String) -> BeaconPayload {
        let data = serde_json::to_value(&payload).unwrap_or(Value::Null);
        self.record(category, message, data);
        for sink in &mut self.sinks {
            sink.add_entry(&payload);
        }
        self.notify();
        payload
    }

    /// Forget all identity and the log. Call [`Tracker::init`] to resume.
    pub fn reset(&mut self) {
        self.identity.reset(&mut self.log);
        self.visitor_id = None;
        self.session_id = None;
        self.analytics_id = None;
        self.initialized = false;
        self.notify();
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn site(&self) -> &SiteProfile {
        &self.site
    }

    pub fn page_url(&self) -> &Url {
        &self.page_url
    }

    pub fn visitor_id(&self) -> Option<&str> {
        self.visitor_id.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Analytics id received from an inbound link, if any.
    pub fn analytics_id(&self) -> Option<&str> {
        self.analytics_id.as_deref()
    }

    pub fn first_touch(&mut self) -> Option<FirstTouchRecord> {
        self.identity.first_touch()
    }

    pub fn first_touch_site(&mut self) -> Option<String> {
        self.first_touch().map(|record| record.site)
    }

    /// Entries recorded by this page.
    pub fn page_log(&self) -> &TrackingLog {
        &self.log
    }

    /// The persisted log of this origin.
    pub fn tracking_log(&mut self) -> Vec<TrackingLogEntry> {
        TrackingLog::load(self.identity.local_mut())
    }

    pub fn snapshot(&mut self) -> TrackingSnapshot {
        TrackingSnapshot {
            visitor_id: self.visitor_id.clone(),
            session_id: self.session_id.clone(),
            first_touch_site: self.first_touch_site(),
            site_context: self.site.clone(),
            tags: self.tags,
            recent_log: self.log.recent(RECENT_LOG_LEN),
        }
    }

    /// Hand the storage back, e.g. to end the session.
    pub fn into_storage(self) -> StorageScopes {
        self.identity.into_scopes()
    }

    fn record(&mut self, category: LogCategory, message: impl Into<String>, data: Value) {
        let timestamp = self.clock.now_rfc3339();
        self.log
            .record(self.identity.local_mut(), timestamp, category, message, data);
    }

    fn notify(&mut self) {
        if self.sinks.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for sink in &mut self.sinks {
            sink.update(&snapshot);
        }
    }
}

/// `host[:port]` as it appears in the address bar.
pub fn host_with_port(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_with_port() {
        let url = Url::parse("http://site-a.local:3001/x").unwrap();
        assert_eq!(host_with_port(&url), "site-a.local:3001");
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(host_with_port(&url), "example.com");
        let url = Url::parse("http://example.com:80/").unwrap();
        assert_eq!(host_with_port(&url), "example.com");
    }
}
