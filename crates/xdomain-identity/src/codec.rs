//! Cross-domain identity parameters carried in URL query strings.
//!
//! Two encodings travel together: the composite `adobe_mc` parameter
//! (`KEY=VALUE` pairs joined by `|`) and one plain parameter per concern.

use url::form_urlencoded;
use url::Url;

/// Query parameter and composite pair keys.
pub mod params {
    /// Composite parameter.
    pub const COMPOSITE: &str = "adobe_mc";
    /// Visitor id; also the individual parameter name.
    pub const VISITOR_ID: &str = "MCID";
    /// Visitor id alias written by the encoder.
    pub const VISITOR_ID_ALIAS: &str = "MCMID";
    pub const ORG_ID: &str = "MCORGID";
    pub const ANALYTICS_ID: &str = "MCAID";
    /// Epoch milliseconds, decimal.
    pub const TIMESTAMP: &str = "TS";
}

/// Every query key the decorator owns. Anything else is left alone.
pub const TRACKING_KEYS: [&str; 5] = [
    params::COMPOSITE,
    params::VISITOR_ID,
    params::ORG_ID,
    params::ANALYTICS_ID,
    params::TIMESTAMP,
];

/// Organization id used while none is configured.
pub const PLACEHOLDER_ORG_ID: &str = "test-org@AdobeOrg";

const PAIR_SEPARATOR: char = '|';

/// Fields recovered from a composite parameter value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeParam {
    pub visitor_id: Option<String>,
    pub org_id: Option<String>,
    pub analytics_id: Option<String>,
    pub timestamp: Option<i64>,
    /// Segments dropped as malformed: no `=`, empty key or value, bad number.
    pub skipped: usize,
}

/// Parse `KEY=VALUE|KEY=VALUE|...`, skipping malformed segments.
///
/// For repeated keys the last well-formed occurrence wins.
pub fn decode_composite(value: &str) -> CompositeParam {
    let mut decoded = CompositeParam::default();

    for segment in value.split(PAIR_SEPARATOR) {
        let Some((key, val)) = segment.split_once('=') else {
            decoded.skipped += 1;
            continue;
        };
        let (key, val) = (key.trim(), val.trim());
        if key.is_empty() || val.is_empty() {
            decoded.skipped += 1;
            continue;
        }

        match key {
            params::VISITOR_ID | params::VISITOR_ID_ALIAS => {
                decoded.visitor_id = Some(val.to_string())
            }
            params::ORG_ID => decoded.org_id = Some(val.to_string()),
            params::ANALYTICS_ID => decoded.analytics_id = Some(val.to_string()),
            params::TIMESTAMP => match val.parse::<i64>() {
                Ok(ts) => decoded.timestamp = Some(ts),
                Err(_) => decoded.skipped += 1,
            },
            other => tracing::trace!(key = other, "Ignoring unknown composite key"),
        }
    }

    decoded
}

/// Build the composite value: `MCMID=<vid>|MCORGID=<org>|TS=<millis>`.
pub fn encode_outbound(visitor_id: &str, org_id: &str, now_millis: i64) -> String {
    format!(
        "{}={visitor_id}{PAIR_SEPARATOR}{}={org_id}{PAIR_SEPARATOR}{}={now_millis}",
        params::VISITOR_ID_ALIAS,
        params::ORG_ID,
        params::TIMESTAMP,
    )
}

/// Identity found in an inbound URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundIdentity {
    pub composite: Option<CompositeParam>,
    pub visitor_id: Option<String>,
    pub org_id: Option<String>,
    pub analytics_id: Option<String>,
    pub timestamp: Option<i64>,
}

impl InboundIdentity {
    /// Effective visitor id: the individual parameter overrides the composite.
    pub fn effective_visitor_id(&self) -> Option<&str> {
        self.visitor_id
            .as_deref()
            .or_else(|| self.composite.as_ref()?.visitor_id.as_deref())
    }

    /// Effective analytics id, same precedence as the visitor id.
    pub fn effective_analytics_id(&self) -> Option<&str> {
        self.analytics_id
            .as_deref()
            .or_else(|| self.composite.as_ref()?.analytics_id.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.composite.is_none()
            && self.visitor_id.is_none()
            && self.org_id.is_none()
            && self.analytics_id.is_none()
            && self.timestamp.is_none()
    }
}

/// Read identity parameters from a URL's query. First occurrence of each key wins.
pub fn decode_inbound(url: &Url) -> InboundIdentity {
    let mut inbound = InboundIdentity::default();

    for (key, value) in url.query_pairs() {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.as_ref() {
            params::COMPOSITE if inbound.composite.is_none() => {
                inbound.composite = Some(decode_composite(value))
            }
            params::VISITOR_ID if inbound.visitor_id.is_none() => {
                inbound.visitor_id = Some(value.to_string())
            }
            params::ORG_ID if inbound.org_id.is_none() => inbound.org_id = Some(value.to_string()),
            params::ANALYTICS_ID if inbound.analytics_id.is_none() => {
                inbound.analytics_id = Some(value.to_string())
            }
            params::TIMESTAMP if inbound.timestamp.is_none() => {
                inbound.timestamp = value.parse().ok()
            }
            _ => {}
        }
    }

    inbound
}

/// Identity written into an outbound URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundIdentity<'a> {
    pub visitor_id: &'a str,
    pub org_id: &'a str,
    pub analytics_id: Option<&'a str>,
    pub timestamp_millis: i64,
}

/// Overwrite the tracking keys of `url`, leaving every other query segment
/// byte-for-byte as it was. Path and fragment are untouched.
pub fn apply_outbound(url: &mut Url, identity: &OutboundIdentity<'_>) {
    let kept: Vec<String> = url
        .query()
        .unwrap_or("")
        .split('&')
        .filter(|segment| !segment.is_empty() && !is_tracking_segment(segment))
        .map(str::to_string)
        .collect();

    let timestamp = identity.timestamp_millis.to_string();
    let composite = encode_outbound(identity.visitor_id, identity.org_id, identity.timestamp_millis);

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    serializer.append_pair(params::COMPOSITE, &composite);
    serializer.append_pair(params::VISITOR_ID, identity.visitor_id);
    serializer.append_pair(params::ORG_ID, identity.org_id);
    if let Some(analytics_id) = identity.analytics_id {
        serializer.append_pair(params::ANALYTICS_ID, analytics_id);
    }
    serializer.append_pair(params::TIMESTAMP, &timestamp);
    let tracking = serializer.finish();

    let query = if kept.is_empty() {
        tracking
    } else {
        format!("{}&{tracking}", kept.join("&"))
    };
    url.set_query(Some(&query));
}

fn is_tracking_segment(segment: &str) -> bool {
    form_urlencoded::parse(segment.as_bytes())
        .next()
        .is_some_and(|(key, _)| TRACKING_KEYS.contains(&key.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_format() {
        assert_eq!(
            encode_outbound("VID-abc-123", "test-org@AdobeOrg", 1700000000000),
            "MCMID=VID-abc-123|MCORGID=test-org@AdobeOrg|TS=1700000000000"
        );
    }

    #[test]
    fn test_composite_recovers_visitor_id() {
        let value = encode_outbound("VID-lq2x-k3j4h5g6f7d", "acme@AdobeOrg", 42);
        let decoded = decode_composite(&value);
        assert_eq!(decoded.visitor_id.as_deref(), Some("VID-lq2x-k3j4h5g6f7d"));
        assert_eq!(decoded.org_id.as_deref(), Some("acme@AdobeOrg"));
        assert_eq!(decoded.timestamp, Some(42));
        assert_eq!(decoded.skipped, 0);
    }

    #[test]
    fn test_malformed_segment_is_skipped() {
        let decoded = decode_composite("MCID=VID-xyz|GARBAGE|MCORGID=acme@AdobeOrg");
        assert_eq!(decoded.visitor_id.as_deref(), Some("VID-xyz"));
        assert_eq!(decoded.org_id.as_deref(), Some("acme@AdobeOrg"));
        assert_eq!(decoded.skipped, 1);
    }

    #[test]
    fn test_extra_separators_and_bad_values() {
        let decoded = decode_composite("||MCMID=VID-1||TS=soon|MCAID=|=orphan|");
        assert_eq!(decoded.visitor_id.as_deref(), Some("VID-1"));
        assert_eq!(decoded.timestamp, None);
        assert_eq!(decoded.analytics_id, None);
        assert_eq!(decoded.skipped, 7);
    }

    #[test]
    fn test_value_may_contain_equals() {
        let decoded = decode_composite("MCMID=VID=1");
        assert_eq!(decoded.visitor_id.as_deref(), Some("VID=1"));
    }

    #[test]
    fn test_decode_inbound_both_encodings() {
        let url = Url::parse(
            "http://site-b.local:3002/?adobe_mc=MCMID%3DVID-composite%7CMCAID%3DAID-1&MCID=VID-plain&TS=5",
        )
        .unwrap();
        let inbound = decode_inbound(&url);
        assert_eq!(inbound.effective_visitor_id(), Some("VID-plain"));
        assert_eq!(inbound.effective_analytics_id(), Some("AID-1"));
        assert_eq!(inbound.timestamp, Some(5));
    }

    #[test]
    fn test_decode_inbound_composite_only() {
        let url = Url::parse("http://site-b.local:3002/?adobe_mc=MCID%3DVID-xyz").unwrap();
        let inbound = decode_inbound(&url);
        assert_eq!(inbound.effective_visitor_id(), Some("VID-xyz"));
        assert!(inbound.visitor_id.is_none());
    }

    #[test]
    fn test_decode_inbound_nothing() {
        let url = Url::parse("http://site-b.local:3002/page?q=1&MCID=").unwrap();
        assert!(decode_inbound(&url).is_empty());
    }

    #[test]
    fn test_apply_preserves_other_params() {
        let mut url = Url::parse("http://site-b.local:3002/page?foo=bar&x=%20y#top").unwrap();
        let identity = OutboundIdentity {
            visitor_id: "VID-abc-123",
            org_id: "test-org@AdobeOrg",
            analytics_id: None,
            timestamp_millis: 1700000000000,
        };
        apply_outbound(&mut url, &identity);

        assert_eq!(
            url.as_str(),
            "http://site-b.local:3002/page?foo=bar&x=%20y\
             &adobe_mc=MCMID%3DVID-abc-123%7CMCORGID%3Dtest-org%40AdobeOrg%7CTS%3D1700000000000\
             &MCID=VID-abc-123&MCORGID=test-org%40AdobeOrg&TS=1700000000000#top"
        );
    }

    #[test]
    fn test_apply_replaces_stale_tracking_keys() {
        let mut url =
            Url::parse("http://site-b.local:3002/?MCID=VID-old&MCAID=AID-old&keep=1&TS=1").unwrap();
        let identity = OutboundIdentity {
            visitor_id: "VID-new",
            org_id: "acme@AdobeOrg",
            analytics_id: None,
            timestamp_millis: 2,
        };
        apply_outbound(&mut url, &identity);

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let count = |k: &str| pairs.iter().filter(|(key, _)| key == k).count();
        assert_eq!(count("MCID"), 1);
        assert_eq!(count("TS"), 1);
        assert_eq!(count("MCAID"), 0);
        assert_eq!(pairs[0], ("keep".to_string(), "1".to_string()));
        assert_eq!(decode_inbound(&url).effective_visitor_id(), Some("VID-new"));
    }

    #[test]
    fn test_apply_forwards_analytics_id() {
        let mut url = Url::parse("http://site-a.local:3001/").unwrap();
        let identity = OutboundIdentity {
            visitor_id: "VID-1",
            org_id: PLACEHOLDER_ORG_ID,
            analytics_id: Some("AID-7"),
            timestamp_millis: 3,
        };
        apply_outbound(&mut url, &identity);
        assert_eq!(decode_inbound(&url).analytics_id.as_deref(), Some("AID-7"));
    }
}
