//! Visitor/session identity: get-or-create, first touch, reset.

use rand::Rng;
use serde_json::json;

use crate::clock::Clock;
use crate::log::TrackingLog;
use crate::storage::{keys, ResilientStore, StorageScopes};
use crate::types::{FirstTouchRecord, LogCategory, SessionIdentity, VisitorIdentity};

/// Type tag of visitor identifiers.
pub const VISITOR_TAG: &str = "VID";

/// Type tag of session identifiers.
pub const SESSION_TAG: &str = "SID";

const RANDOM_SUFFIX_LEN: usize = 11;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate `<tag>-<base36 millis>-<random base36>`.
///
/// The timestamp keeps ids roughly sortable; the suffix avoids collisions.
/// Not suitable where unguessable ids are required.
pub fn generate_id(tag: &str, now_millis: i64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..RANDOM_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{tag}-{}-{suffix}", to_base36(now_millis.max(0) as u64))
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// Sole reader/writer of identity records in an origin's storage.
pub struct IdentityStore {
    scopes: StorageScopes,
}

impl IdentityStore {
    pub fn new(scopes: StorageScopes) -> Self {
        Self { scopes }
    }

    /// Long-lived scope, shared with the tracking log.
    pub fn local_mut(&mut self) -> &mut ResilientStore {
        &mut self.scopes.local
    }

    pub fn scopes_mut(&mut self) -> &mut StorageScopes {
        &mut self.scopes
    }

    pub fn into_scopes(self) -> StorageScopes {
        self.scopes
    }

    /// Stored visitor id, if any. Never generates.
    pub fn visitor_id(&mut self) -> Option<VisitorIdentity> {
        non_empty(self.scopes.local.get(keys::VISITOR_ID)).map(|id| VisitorIdentity { id })
    }

    /// Stored session id, if any. Never generates.
    pub fn session_id(&mut self) -> Option<SessionIdentity> {
        non_empty(self.scopes.session.get(keys::SESSION_ID)).map(|id| SessionIdentity { id })
    }

    /// Stored first-touch record, if any.
    pub fn first_touch(&mut self) -> Option<FirstTouchRecord> {
        let site = non_empty(self.scopes.local.get(keys::FIRST_TOUCH_SITE))?;
        let timestamp = self
            .scopes
            .local
            .get(keys::FIRST_TOUCH_TIME)
            .unwrap_or_default();
        Some(FirstTouchRecord { site, timestamp })
    }

    pub fn get_or_create_visitor_id(&mut self, clock: &dyn Clock, log: &mut TrackingLog) -> String {
        if let Some(existing) = self.visitor_id() {
            log.record(
                &mut self.scopes.local,
                clock.now_rfc3339(),
                LogCategory::Visitor,
                "Retrieved existing visitor ID",
                json!({ "visitorId": existing.id }),
            );
            return existing.id;
        }

        let id = generate_id(VISITOR_TAG, clock.now_millis());
        self.scopes.local.set(keys::VISITOR_ID, &id);
        log.record(
            &mut self.scopes.local,
            clock.now_rfc3339(),
            LogCategory::Visitor,
            "Generated new visitor ID",
            json!({ "visitorId": id }),
        );
        id
    }

    pub fn get_or_create_session_id(&mut self, clock: &dyn Clock, log: &mut TrackingLog) -> String {
        if let Some(existing) = self.session_id() {
            log.record(
                &mut self.scopes.local,
                clock.now_rfc3339(),
                LogCategory::Session,
                "Retrieved existing session ID",
                json!({ "sessionId": existing.id }),
            );
            return existing.id;
        }

        let id = generate_id(SESSION_TAG, clock.now_millis());
        self.scopes.session.set(keys::SESSION_ID, &id);
        log.record(
            &mut self.scopes.local,
            clock.now_rfc3339(),
            LogCategory::Session,
            "Generated new session ID",
            json!({ "sessionId": id }),
        );
        id
    }

    /// Replace the stored visitor id with one supplied by another origin.
    pub fn adopt_visitor_id(
        &mut self,
        id: &str,
        message: &str,
        clock: &dyn Clock,
        log: &mut TrackingLog,
    ) {
        self.scopes.local.set(keys::VISITOR_ID, id);
        log.record(
            &mut self.scopes.local,
            clock.now_rfc3339(),
            LogCategory::Crossdomain,
            message,
            json!({ "visitorId": id }),
        );
    }

    /// Write the first-touch record unless one exists. Returns whether it wrote.
    pub fn record_first_touch_if_absent(
        &mut self,
        site: &str,
        clock: &dyn Clock,
        log: &mut TrackingLog,
    ) -> bool {
        if self.first_touch().is_some() {
            return false;
        }

        self.scopes.local.set(keys::FIRST_TOUCH_SITE, site);
        self.scopes
            .local
            .set(keys::FIRST_TOUCH_TIME, &clock.now_rfc3339());
        log.record(
            &mut self.scopes.local,
            clock.now_rfc3339(),
            LogCategory::Visitor,
            "Recorded first touch site",
            json!({ "firstTouchSite": site }),
        );
        true
    }

    /// Forget visitor id, first touch, session id and the tracking log.
    ///
    /// Nothing is regenerated; the next get-or-create call starts afresh.
    pub fn reset(&mut self, log: &mut TrackingLog) {
        let local = &mut self.scopes.local;
        local.remove(keys::VISITOR_ID);
        local.remove(keys::FIRST_TOUCH_SITE);
        local.remove(keys::FIRST_TOUCH_TIME);
        log.clear(local);
        self.scopes.session.remove(keys::SESSION_ID);
        tracing::info!("Tracking data reset");
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
