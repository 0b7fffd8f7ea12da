//! A scripted browser: loads pages into per-origin storage, clicks links,
//! follows navigations.

use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

use xdomain_identity::tracker::host_with_port;
use xdomain_identity::{
    BeaconPayload, Document, FirstTouchRecord, PageEvent, TagStatus, TracingSink, Tracker,
    TrackingConfig,
};

use crate::error::{CliError, CliResult};
use crate::pages::demo_page;
use crate::profile::BrowserProfile;

/// Upper bound on navigations in one [`Browser::journey`].
pub const MAX_JOURNEY_HOPS: usize = 64;

/// A page after its load sequence has run.
pub struct LoadedPage {
    pub tracker: Tracker,
    pub document: Document,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkReport {
    pub index: usize,
    pub text: String,
    pub href: Option<String>,
    pub marked: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageVisit {
    pub url: String,
    pub site: String,
    pub cross_domain_enabled: bool,
    pub visitor_id: Option<String>,
    pub session_id: Option<String>,
    pub first_touch: Option<FirstTouchRecord>,
    pub links: Vec<LinkReport>,
    pub page_view: BeaconPayload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickReport {
    pub visit: PageVisit,
    pub link: usize,
    pub navigation: String,
    pub decorated: bool,
}

/// One page of a journey.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hop {
    pub step: usize,
    pub url: String,
    pub site: String,
    pub visitor_id: Option<String>,
    pub session_id: Option<String>,
    /// Same visitor id as the previous hop.
    pub continued: bool,
}

pub struct Browser<'a> {
    config: &'a TrackingConfig,
    profile: BrowserProfile,
    tags: TagStatus,
    trace_sink: bool,
}

impl<'a> Browser<'a> {
    pub fn new(config: &'a TrackingConfig, profile: BrowserProfile) -> Self {
        Self {
            config,
            profile,
            tags: TagStatus::default(),
            trace_sink: false,
        }
    }

    /// Tag loader state reported to every page.
    pub fn with_tags(mut self, tags: TagStatus) -> Self {
        self.tags = tags;
        self
    }

    /// Attach a [`TracingSink`] to every page.
    pub fn with_trace_sink(mut self, enabled: bool) -> Self {
        self.trace_sink = enabled;
        self
    }

    pub fn profile(&self) -> &BrowserProfile {
        &self.profile
    }

    /// Load `url`, using `html` or the demo page for its host.
    pub fn load(&self, url: &Url, html: Option<&str>, referrer: Option<&str>) -> LoadedPage {
        let mut document = match html {
            Some(html) => Document::parse_html(html),
            None => Document::parse_html(&demo_page(self.config, &host_with_port(url))),
        };

        let mut tracker = Tracker::new(self.config, url.clone(), self.profile.storage_for(url));
        if let Some(referrer) = referrer {
            tracker = tracker.with_referrer(referrer);
        }
        if self.trace_sink {
            tracker.add_sink(Box::new(TracingSink));
        }
        tracker.init(&mut document, self.tags);

        LoadedPage { tracker, document }
    }

    /// Load a page and track its page view.
    pub fn visit(&self, url: &Url, html: Option<&str>, extra: Map<String, Value>) -> PageVisit {
        let mut page = self.load(url, html, None);
        self.report(&mut page, extra)
    }

    /// Load a page, track its page view, then click link `index`.
    pub fn click(&self, url: &Url, html: Option<&str>, index: usize) -> CliResult<ClickReport> {
        let mut page = self.load(url, html, None);
        if page.document.anchor(index).is_none() {
            return Err(CliError::LinkNotFound(index));
        }
        let visit = self.report(&mut page, Map::new());

        let navigation = page
            .tracker
            .handle(&mut page.document, PageEvent::LinkClicked { index })
            .ok_or(CliError::NoNavigation(index))?;

        Ok(ClickReport {
            visit,
            link: index,
            navigation: navigation.url.to_string(),
            decorated: navigation.decorated,
        })
    }

    /// Starting at `start`, repeatedly click the first marked link leading
    /// to another origin, for up to `hops` navigations (at most
    /// [`MAX_JOURNEY_HOPS`]).
    pub fn journey(&self, start: &Url, hops: usize) -> CliResult<Vec<Hop>> {
        let hops = hops.min(MAX_JOURNEY_HOPS);
        let mut url = start.clone();
        let mut referrer: Option<String> = None;
        let mut previous_visitor: Option<String> = None;
        let mut journey = Vec::with_capacity(hops + 1);

        for step in 0..=hops {
            let mut page = self.load(&url, None, referrer.as_deref());
            page.tracker.track_page_view(Map::new());

            let visitor_id = page.tracker.visitor_id().map(str::to_string);
            journey.push(Hop {
                step,
                url: url.to_string(),
                site: page.tracker.site().attribution_name().to_string(),
                visitor_id: visitor_id.clone(),
                session_id: page.tracker.session_id().map(str::to_string),
                continued: previous_visitor.is_some() && previous_visitor == visitor_id,
            });
            if step == hops {
                break;
            }

            let here = host_with_port(&url);
            let marker = self.config.marker_class();
            let Some(index) = page.document.marked(marker).into_iter().find(|&i| {
                page.document
                    .anchor(i)
                    .and_then(|a| a.target_domain.as_deref())
                    .is_some_and(|target| target != here)
            }) else {
                tracing::info!("No outbound link on {url}; journey ends");
                break;
            };

            let navigation = page
                .tracker
                .handle(&mut page.document, PageEvent::LinkClicked { index })
                .ok_or(CliError::NoNavigation(index))?;

            referrer = Some(url.to_string());
            previous_visitor = visitor_id;
            url = navigation.url;
        }

        Ok(journey)
    }

    fn report(&self, page: &mut LoadedPage, extra: Map<String, Value>) -> PageVisit {
        let page_view = page.tracker.track_page_view(extra);
        let marker = self.config.marker_class();
        let links = page
            .document
            .anchors()
            .iter()
            .enumerate()
            .map(|(index, anchor)| LinkReport {
                index,
                text: anchor.text.clone(),
                href: anchor.href.clone(),
                marked: anchor.has_class(marker),
            })
            .collect();

        PageVisit {
            url: page.tracker.page_url().to_string(),
            site: page.tracker.site().attribution_name().to_string(),
            cross_domain_enabled: page.tracker.site().cross_domain_enabled,
            visitor_id: page.tracker.visitor_id().map(str::to_string),
            session_id: page.tracker.session_id().map(str::to_string),
            first_touch: page.tracker.first_touch(),
            links,
            page_view,
        }
    }
}
