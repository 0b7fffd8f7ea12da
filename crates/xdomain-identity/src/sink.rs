//! Observers of tracker state (debug panels, recorders, log forwarders).

use serde::Serialize;

use crate::site::SiteProfile;
use crate::types::{BeaconPayload, TagStatus, TrackingLogEntry};

/// State pushed to sinks after every state-affecting operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSnapshot {
    pub visitor_id: Option<String>,
    pub session_id: Option<String>,
    pub first_touch_site: Option<String>,
    pub site_context: SiteProfile,
    pub tags: TagStatus,
    pub recent_log: Vec<TrackingLogEntry>,
}

/// Receives tracker notifications. The tracker works with zero or more sinks.
pub trait TrackingSink {
    fn update(&mut self, snapshot: &TrackingSnapshot);
    fn add_entry(&mut self, payload: &BeaconPayload);
}

/// Emits notifications as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TrackingSink for TracingSink {
    fn update(&mut self, snapshot: &TrackingSnapshot) {
        tracing::info!(
            visitor_id = snapshot.visitor_id.as_deref().unwrap_or("-"),
            session_id = snapshot.session_id.as_deref().unwrap_or("-"),
            first_touch = snapshot.first_touch_site.as_deref().unwrap_or("-"),
            site = snapshot.site_context.attribution_name(),
            "Tracking state updated"
        );
    }

    fn add_entry(&mut self, payload: &BeaconPayload) {
        match serde_json::to_string(payload) {
            Ok(json) => tracing::info!(beacon = %json, "Beacon recorded"),
            Err(e) => tracing::warn!("Failed to serialize beacon: {e}"),
        }
    }
}
