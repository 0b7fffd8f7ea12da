//! Core data types for identity records, log entries and beacons.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Long-lived pseudonymous identifier for a browsing profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorIdentity {
    pub id: String,
}

/// Identifier scoped to a single browsing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub id: String,
}

/// The first site of the family this visitor was observed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstTouchRecord {
    pub site: String,
    /// RFC 3339 timestamp of the first observation.
    pub timestamp: String,
}

/// Category of a tracking log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    System,
    Visitor,
    Session,
    Pageview,
    Event,
    Crossdomain,
    Error,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::System => "system",
            LogCategory::Visitor => "visitor",
            LogCategory::Session => "session",
            LogCategory::Pageview => "pageview",
            LogCategory::Event => "event",
            LogCategory::Crossdomain => "crossdomain",
            LogCategory::Error => "error",
        }
    }
}

/// One entry of the append-only tracking log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingLogEntry {
    pub timestamp: String,
    pub category: LogCategory,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

/// Kind of tracked interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeaconKind {
    #[serde(rename = "pageView")]
    PageView,
    #[serde(rename = "event")]
    Event,
}

/// A tracked interaction. Never re-read by the tracker once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconPayload {
    #[serde(rename = "type")]
    pub kind: BeaconKind,
    pub timestamp: String,
    pub visitor_id: Option<String>,
    pub session_id: Option<String>,
    /// Site context and caller-supplied fields (`site`, `domain`, ...).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl BeaconPayload {
    /// Field names the tracker always owns; callers cannot override them.
    pub const RESERVED_FIELDS: [&'static str; 4] = ["type", "timestamp", "visitorId", "sessionId"];

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn site(&self) -> Option<&str> {
        self.fields.get("site").and_then(Value::as_str)
    }

    pub fn domain(&self) -> Option<&str> {
        self.fields.get("domain").and_then(Value::as_str)
    }
}

/// Load state of the externally injected analytics tag.
///
/// Set by the tag loader, only ever read by the tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagStatus {
    pub loaded: bool,
    pub load_error: bool,
}

/// Errors that can occur in the identity library.
#[derive(thiserror::Error, Debug)]
pub enum TrackingError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL {href:?}: {source}")]
    InvalidUrl {
        href: String,
        #[source]
        source: url::ParseError,
    },
}

/// Convenience result type.
pub type TrackingResult<T> = Result<T, TrackingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_beacon_serializes_flat() {
        let mut fields = Map::new();
        fields.insert("site".into(), json!("Site A"));
        fields.insert("pageName".into(), json!("home"));
        let beacon = BeaconPayload {
            kind: BeaconKind::PageView,
            timestamp: "2024-01-01T00:00:00.000Z".into(),
            visitor_id: Some("VID-1".into()),
            session_id: None,
            fields,
        };

        let value = serde_json::to_value(&beacon).unwrap();
        assert_eq!(value["type"], "pageView");
        assert_eq!(value["visitorId"], "VID-1");
        assert_eq!(value["sessionId"], Value::Null);
        assert_eq!(value["pageName"], "home");
        assert_eq!(beacon.site(), Some("Site A"));
    }

    #[test]
    fn test_log_category_names() {
        let value = serde_json::to_value(LogCategory::Crossdomain).unwrap();
        assert_eq!(value, json!("crossdomain"));
        assert_eq!(LogCategory::Pageview.as_str(), "pageview");
    }
}
