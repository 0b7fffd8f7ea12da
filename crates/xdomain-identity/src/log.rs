//! Capped, append-only tracking log kept in memory and in long-lived storage.

use std::collections::VecDeque;

use serde_json::Value;

use crate::config::DEFAULT_LOG_CAPACITY;
use crate::storage::{keys, ResilientStore};
use crate::types::{LogCategory, TrackingLogEntry};

/// Entries handed to sinks with every snapshot.
pub const RECENT_LOG_LEN: usize = 20;

/// Ring buffer of log entries; the oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct TrackingLog {
    entries: VecDeque<TrackingLogEntry>,
    capacity: usize,
}

impl Default for TrackingLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl TrackingLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries of this page, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &TrackingLogEntry> {
        self.entries.iter()
    }

    /// The newest `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<TrackingLogEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Append an entry and persist it.
    pub fn record(
        &mut self,
        store: &mut ResilientStore,
        timestamp: String,
        category: LogCategory,
        message: impl Into<String>,
        data: Value,
    ) {
        let entry = TrackingLogEntry {
            timestamp,
            category,
            message: message.into(),
            data,
        };

        match category {
            LogCategory::Error => {
                tracing::warn!(category = category.as_str(), data = %entry.data, "{}", entry.message)
            }
            _ => {
                tracing::debug!(category = category.as_str(), data = %entry.data, "{}", entry.message)
            }
        }

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.clone());
        self.persist(store, entry);
    }

    fn persist(&self, store: &mut ResilientStore, entry: TrackingLogEntry) {
        let mut stored = Self::load(store);
        stored.push(entry);
        if stored.len() > self.capacity {
            let excess = stored.len() - self.capacity;
            stored.drain(..excess);
        }
        match serde_json::to_string(&stored) {
            Ok(json) => store.set(keys::TRACKING_LOG, &json),
            Err(e) => tracing::warn!("Failed to serialize tracking log: {e}"),
        }
    }

    /// Read the persisted log. A missing or unparsable log reads as empty.
    pub fn load(store: &mut ResilientStore) -> Vec<TrackingLogEntry> {
        let Some(raw) = store.get(keys::TRACKING_LOG) else {
            return Vec::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!("Discarding unreadable tracking log: {e}");
            Vec::new()
        })
    }

    /// Drop every entry, in memory and in storage.
    pub fn clear(&mut self, store: &mut ResilientStore) {
        self.entries.clear();
        store.remove(keys::TRACKING_LOG);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn store() -> ResilientStore {
        ResilientStore::new("local", Box::new(MemoryStore::new()))
    }

    fn record(log: &mut TrackingLog, store: &mut ResilientStore, i: usize) {
        log.record(
            store,
            format!("t{i}"),
            LogCategory::System,
            format!("entry {i}"),
            json!({ "i": i }),
        );
    }

    #[test]
    fn test_persisted_log_is_capped() {
        let mut store = store();
        let mut log = TrackingLog::default();
        for i in 0..150 {
            record(&mut log, &mut store, i);
        }

        let persisted = TrackingLog::load(&mut store);
        assert_eq!(persisted.len(), 100);
        assert_eq!(persisted[0].message, "entry 50");
        assert_eq!(persisted[99].message, "entry 149");
        assert_eq!(log.len(), 100);
    }

    #[test]
    fn test_persisted_log_spans_pages() {
        let mut store = store();
        let mut first_page = TrackingLog::with_capacity(3);
        record(&mut first_page, &mut store, 0);
        record(&mut first_page, &mut store, 1);

        let mut second_page = TrackingLog::with_capacity(3);
        record(&mut second_page, &mut store, 2);
        record(&mut second_page, &mut store, 3);

        let messages: Vec<_> = TrackingLog::load(&mut store)
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(messages, ["entry 1", "entry 2", "entry 3"]);
        assert_eq!(second_page.len(), 2);
    }

    #[test]
    fn test_recent() {
        let mut store = store();
        let mut log = TrackingLog::default();
        for i in 0..5 {
            record(&mut log, &mut store, i);
        }
        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "entry 3");
        assert_eq!(log.recent(50).len(), 5);
    }

    #[test]
    fn test_unreadable_log_is_replaced() {
        let mut store = store();
        store.set(keys::TRACKING_LOG, "not json");
        let mut log = TrackingLog::default();
        record(&mut log, &mut store, 0);
        assert_eq!(TrackingLog::load(&mut store).len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut store = store();
        let mut log = TrackingLog::default();
        record(&mut log, &mut store, 0);
        log.clear(&mut store);
        assert!(log.is_empty());
        assert!(TrackingLog::load(&mut store).is_empty());
        log.clear(&mut store);
    }
}
