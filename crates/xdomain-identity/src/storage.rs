//! Per-origin key/value storage with long-lived and session scopes.
//!
//! Mirrors browser storage: string keys, string values, synchronous access.
//! Concurrent writers to the same scope resolve last-writer-wins.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::types::{TrackingError, TrackingResult};

/// Storage keys (long-lived scope unless noted).
pub mod keys {
    pub const VISITOR_ID: &str = "xdomain_visitor_id";
    /// Session scope.
    pub const SESSION_ID: &str = "xdomain_session_id";
    pub const FIRST_TOUCH_SITE: &str = "xdomain_first_touch_site";
    pub const FIRST_TOUCH_TIME: &str = "xdomain_first_touch_time";
    pub const TRACKING_LOG: &str = "xdomain_tracking_log";
}

/// Synchronous string key/value storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> TrackingResult<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> TrackingResult<()>;
    /// Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> TrackingResult<()>;
    fn clear(&mut self) -> TrackingResult<()>;
}

/// Ephemeral in-memory storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> TrackingResult<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> TrackingResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> TrackingResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&mut self) -> TrackingResult<()> {
        self.entries.clear();
        Ok(())
    }
}

/// A single JSON object file holding one storage scope.
///
/// The file is re-read on every access, so writes from other processes
/// sharing the file are picked up (and may be overwritten) as in a browser.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so readers see either the old or the new object. A
/// missing file is an empty scope; an empty or truncated one is corrupt.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> TrackingResult<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Err(TrackingError::Storage(format!(
                "Empty store {}",
                self.path.display()
            ))),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                TrackingError::Storage(format!("Corrupt store {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, entries: &BTreeMap<String, String>) -> TrackingResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let payload = serde_json::to_vec_pretty(entries)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&payload)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> TrackingResult<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> TrackingResult<()> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.store(&entries)
    }

    fn remove(&mut self, key: &str) -> TrackingResult<()> {
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.store(&entries)?;
        }
        Ok(())
    }

    fn clear(&mut self) -> TrackingResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Wraps a primary store and falls back to memory on its first failure.
///
/// Once degraded, the scope stays in memory for the rest of its lifetime.
/// Values already held by the primary store are not carried over.
pub struct ResilientStore {
    scope: &'static str,
    primary: Box<dyn KeyValueStore>,
    fallback: MemoryStore,
    degraded: bool,
}

impl ResilientStore {
    pub fn new(scope: &'static str, primary: Box<dyn KeyValueStore>) -> Self {
        Self {
            scope,
            primary,
            fallback: MemoryStore::new(),
            degraded: false,
        }
    }

    /// Whether the scope has fallen back to memory.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn degrade(&mut self, op: &str, err: &TrackingError) {
        tracing::warn!(
            scope = self.scope,
            "Storage {op} failed, falling back to in-memory storage: {err}"
        );
        self.degraded = true;
    }

    pub fn get(&mut self, key: &str) -> Option<String> {
        if !self.degraded {
            match self.primary.get(key) {
                Ok(value) => return value,
                Err(e) => self.degrade("read", &e),
            }
        }
        self.fallback.entries.get(key).cloned()
    }

    pub fn set(&mut self, key: &str, value: &str) {
        if !self.degraded {
            match self.primary.set(key, value) {
                Ok(()) => return,
                Err(e) => self.degrade("write", &e),
            }
        }
        self.fallback.entries.insert(key.to_string(), value.to_string());
    }

    pub fn remove(&mut self, key: &str) {
        if !self.degraded {
            match self.primary.remove(key) {
                Ok(()) => return,
                Err(e) => self.degrade("remove", &e),
            }
        }
        self.fallback.entries.remove(key);
    }

    pub fn clear(&mut self) {
        if !self.degraded {
            match self.primary.clear() {
                Ok(()) => return,
                Err(e) => self.degrade("clear", &e),
            }
        }
        self.fallback.entries.clear();
    }
}

/// The two storage scopes of one origin.
pub struct StorageScopes {
    pub local: ResilientStore,
    pub session: ResilientStore,
}

impl StorageScopes {
    pub fn new(local: Box<dyn KeyValueStore>, session: Box<dyn KeyValueStore>) -> Self {
        Self {
            local: ResilientStore::new("local", local),
            session: ResilientStore::new("session", session),
        }
    }

    /// Both scopes in memory.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()), Box::new(MemoryStore::new()))
    }

    /// Both scopes as JSON files under `dir` (`local.json`, `session.json`).
    pub fn on_disk(dir: &Path) -> Self {
        Self::new(
            Box::new(JsonFileStore::open(dir.join("local.json"))),
            Box::new(JsonFileStore::open(dir.join("session.json"))),
        )
    }

    /// End the browsing session: the session scope is discarded.
    pub fn end_session(&mut self) {
        self.session.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A store whose every operation fails, like disabled browser storage.
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> TrackingResult<Option<String>> {
            Err(TrackingError::Storage("storage disabled".into()))
        }
        fn set(&mut self, _key: &str, _value: &str) -> TrackingResult<()> {
            Err(TrackingError::Storage("quota exceeded".into()))
        }
        fn remove(&mut self, _key: &str) -> TrackingResult<()> {
            Err(TrackingError::Storage("storage disabled".into()))
        }
        fn clear(&mut self) -> TrackingResult<()> {
            Err(TrackingError::Storage("storage disabled".into()))
        }
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("origin").join("local.json");

        let mut store = JsonFileStore::open(&path);
        assert_eq!(store.get(keys::VISITOR_ID).unwrap(), None);
        store.set(keys::VISITOR_ID, "VID-1").unwrap();

        let reopened = JsonFileStore::open(&path);
        assert_eq!(reopened.get(keys::VISITOR_ID).unwrap().as_deref(), Some("VID-1"));
    }

    #[test]
    fn test_file_store_last_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        let mut tab_a = JsonFileStore::open(&path);
        let mut tab_b = JsonFileStore::open(&path);

        tab_a.set(keys::VISITOR_ID, "VID-a").unwrap();
        tab_b.set(keys::VISITOR_ID, "VID-b").unwrap();
        assert_eq!(tab_a.get(keys::VISITOR_ID).unwrap().as_deref(), Some("VID-b"));
    }

    #[test]
    fn test_file_store_clear_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::open(dir.path().join("never-written.json"));
        store.clear().unwrap();
        store.remove("absent").unwrap();
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = JsonFileStore::open(&path);
        assert!(matches!(store.get("k"), Err(TrackingError::Storage(_))));
    }

    #[test]
    fn test_file_store_writes_leave_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        let mut store = JsonFileStore::open(&path);
        store.set(keys::VISITOR_ID, "VID-1").unwrap();
        store.set(keys::SESSION_ID, "SID-1").unwrap();
        store.remove(keys::SESSION_ID).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("local.json")]);

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: BTreeMap<String, String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.get(keys::VISITOR_ID).map(String::as_str), Some("VID-1"));
    }

    #[test]
    fn test_truncated_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        std::fs::write(&path, "{\n  \"xdomain_visitor_id\": \"VID-").unwrap();

        let mut store = JsonFileStore::open(&path);
        assert!(matches!(store.get(keys::VISITOR_ID), Err(TrackingError::Storage(_))));
        assert!(store.set(keys::VISITOR_ID, "VID-new").is_err());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\n  \"xdomain_visitor_id\": \"VID-"
        );

        std::fs::write(&path, "").unwrap();
        assert!(matches!(store.get(keys::VISITOR_ID), Err(TrackingError::Storage(_))));
    }

    #[test]
    fn test_resilient_store_degrades() {
        let mut store = ResilientStore::new("local", Box::new(BrokenStore));
        assert_eq!(store.get("k"), None);
        assert!(store.is_degraded());

        store.set("k", "v");
        assert_eq!(store.get("k").as_deref(), Some("v"));
        store.clear();
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn test_end_session_keeps_local_scope() {
        let mut scopes = StorageScopes::in_memory();
        scopes.local.set(keys::VISITOR_ID, "VID-1");
        scopes.session.set(keys::SESSION_ID, "SID-1");

        scopes.end_session();
        assert_eq!(scopes.session.get(keys::SESSION_ID), None);
        assert_eq!(scopes.local.get(keys::VISITOR_ID).as_deref(), Some("VID-1"));
    }
}
