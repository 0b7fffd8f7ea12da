//! Rewrites marked links so they carry the current identity.

use url::Url;

use crate::codec::{apply_outbound, OutboundIdentity};
use crate::document::{Anchor, Document};
use crate::types::{TrackingError, TrackingResult};

/// Result of decorating one anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecorateOutcome {
    Decorated { href: String },
    /// The anchor has no `href`; nothing to do.
    NoHref,
    /// Not an http(s) target (`mailto:`, `javascript:`, ...).
    Skipped { href: String },
    /// The href could not be parsed; the anchor is unchanged.
    Failed { href: String, error: String },
}

/// Totals of a [`LinkDecorator::decorate_all`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecorationReport {
    pub outcomes: Vec<(usize, DecorateOutcome)>,
}

impl DecorationReport {
    pub fn decorated(&self) -> usize {
        self.count(|o| matches!(o, DecorateOutcome::Decorated { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DecorateOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&DecorateOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Decorates anchors carrying the marker class.
#[derive(Debug, Clone)]
pub struct LinkDecorator {
    base: Url,
    marker_class: String,
}

impl LinkDecorator {
    /// Relative hrefs resolve against the origin of `page_url`.
    pub fn new(page_url: &Url, marker_class: impl Into<String>) -> Self {
        let base = page_url.join("/").unwrap_or_else(|_| page_url.clone());
        Self {
            base,
            marker_class: marker_class.into(),
        }
    }

    pub fn marker_class(&self) -> &str {
        &self.marker_class
    }

    pub fn is_marked(&self, anchor: &Anchor) -> bool {
        anchor.has_class(&self.marker_class)
    }

    /// Resolve an href against the page origin.
    pub fn resolve(&self, href: &str) -> TrackingResult<Url> {
        self.base.join(href).map_err(|source| TrackingError::InvalidUrl {
            href: href.to_string(),
            source,
        })
    }

    /// Decorate one anchor in place. Failures leave the href untouched.
    pub fn decorate_one(&self, anchor: &mut Anchor, identity: &OutboundIdentity<'_>) -> DecorateOutcome {
        let Some(href) = anchor.href.clone() else {
            return DecorateOutcome::NoHref;
        };

        match self.resolve(&href) {
            Ok(url) if !matches!(url.scheme(), "http" | "https") => DecorateOutcome::Skipped { href },
            Ok(mut url) => {
                apply_outbound(&mut url, identity);
                let decorated = url.to_string();
                anchor.href = Some(decorated.clone());
                DecorateOutcome::Decorated { href: decorated }
            }
            Err(e) => DecorateOutcome::Failed {
                href,
                error: e.to_string(),
            },
        }
    }

    /// Decorate every marked anchor; one failure never stops the pass.
    pub fn decorate_all(&self, doc: &mut Document, identity: &OutboundIdentity<'_>) -> DecorationReport {
        let mut report = DecorationReport::default();
        for index in doc.marked(&self.marker_class) {
            if let Some(anchor) = doc.anchor_mut(index) {
                report.outcomes.push((index, self.decorate_one(anchor, identity)));
            }
        }
        report
    }
}
