#![warn(missing_docs)]
//! # island-gate-store
//!
//! ## Purpose
//! Client-local persistence for the location gate: the single-slot
//! [`LocationCache`] and the time-windowed [`AccessLedger`].
//!
//! ## Responsibilities
//! - Define the key-value persistence port ([`KeyValueStore`]) and the clock
//!   port ([`Clock`]) so time and storage can be faked in tests.
//! - Provide in-memory and file-backed store implementations.
//! - Apply TTL, retention window and cap policy entirely on the client side.
//!
//! ## Data flow
//! Orchestrator saves a successful detection -> [`LocationCache::save`].
//! Orchestrator observes an inside-region detection ->
//! [`AccessLedger::record_access`]. Gate evaluation ->
//! [`AccessLedger::query_recent_entries`].
//!
//! ## Ownership and lifetimes
//! Cache and ledger hold `Arc` handles to shared ports; they never hold parsed
//! state between calls, every operation re-reads the store.
//!
//! ## Error model
//! Store I/O failures surface as [`StoreError`] on writes. Corrupt persisted
//! JSON is logged and treated as absent (cache) or empty (ledger); it is never
//! returned to the caller.
//!
//! ## Concurrency notes
//! Ledger writes are read-modify-write without locking. Two writers sharing a
//! store race and the last write wins.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use island_gate_core::{
    AccessLedgerEntry, CachedLocationEntry, Coordinate, DetectionResult, DetectionStatus,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Storage key for the location cache slot.
pub const LOCATION_CACHE_KEY: &str = "island_gate_location_cache";
/// Storage key for the access ledger list.
pub const ACCESS_HISTORY_KEY: &str = "island_gate_access_history";
/// Cached detections older than this are ignored (1 hour).
pub const LOCATION_CACHE_TTL_MS: u64 = 60 * 60 * 1_000;
/// Trailing window in which a recorded access still grants capabilities
/// (14 days).
pub const ACCESS_RETENTION_WINDOW_MS: u64 = 14 * 24 * 60 * 60 * 1_000;
/// Maximum number of ledger entries kept.
pub const ACCESS_LEDGER_CAP: usize = 50;

/// Synchronous string key-value persistence port.
///
/// Values are serialized JSON blobs. The store enforces no expiry.
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replaces the value stored under `key`.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Deletes `key`. Deleting a missing key succeeds.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local store backed by a map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().map_err(|_| StoreError::LockPoisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().map_err(|_| StoreError::LockPoisoned)?;
        values.remove(key);
        Ok(())
    }
}

/// File-backed store: one `<key>.json` file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `root`. The directory is created lazily on
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(StoreError::Io(error)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root)?;
        fs::write(path, value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(StoreError::Io(error)),
        }
    }
}

/// Validates that a key is usable as a file stem.
///
/// # Errors
/// Returns [`StoreError::InvalidKey`] unless the key is non-empty ASCII
/// alphanumerics, `_` or `-`.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// Wall-clock port returning Unix epoch milliseconds.
pub trait Clock: Send + Sync {
    /// Current time in Unix epoch milliseconds.
    fn now_ms(&self) -> u64;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually driven clock for deterministic tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Creates a clock reading `now_ms`.
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    /// Moves the clock forward by `delta_ms`.
    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Single-slot, TTL-bounded cache of the last successful detection.
#[derive(Clone)]
pub struct LocationCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl_ms: u64,
}

impl LocationCache {
    /// Creates a cache with the default one-hour TTL.
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            ttl_ms: LOCATION_CACHE_TTL_MS,
        }
    }

    /// Overrides the TTL.
    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    /// Returns the configured TTL.
    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    /// Overwrites the slot with `result` stamped at the current time.
    ///
    /// Only successful detections are cached; other states return `Ok(false)`
    /// and leave the slot untouched.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the entry cannot be encoded or written.
    pub fn save(&self, result: &DetectionResult) -> Result<bool, StoreError> {
        if result.status != DetectionStatus::Success {
            debug!(status = ?result.status, "skipping cache write for non-success detection");
            return Ok(false);
        }

        let entry = CachedLocationEntry::from_result(result, self.clock.now_ms());
        let raw = serde_json::to_string(&entry)?;
        self.store.set(LOCATION_CACHE_KEY, &raw)?;
        Ok(true)
    }

    /// Returns the cached entry when present, parseable and younger than the
    /// TTL.
    pub fn load_if_fresh(&self) -> Option<CachedLocationEntry> {
        let raw = match self.store.get(LOCATION_CACHE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(error) => {
                warn!(%error, "location cache read failed; treating as miss");
                return None;
            }
        };

        let entry: CachedLocationEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(%error, "location cache is corrupt; treating as miss");
                return None;
            }
        };

        if !entry.is_fresh(self.clock.now_ms(), self.ttl_ms) {
            debug!(captured_at_ms = entry.captured_at_ms, "location cache expired");
            return None;
        }

        Some(entry)
    }

    /// Deletes the cached entry.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backend cannot be written.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(LOCATION_CACHE_KEY)
    }
}

/// Capped, time-windowed log of inside-region detections.
#[derive(Clone)]
pub struct AccessLedger {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    cap: usize,
}

impl AccessLedger {
    /// Creates a ledger with the default 50-entry cap.
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            cap: ACCESS_LEDGER_CAP,
        }
    }

    /// Overrides the entry cap. A cap of zero is raised to one.
    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap.max(1);
        self
    }

    /// Records one inside-region event at the current time.
    ///
    /// Callers invoke this only for fresh inside-region detections; the ledger
    /// does not re-check membership. The stored list is re-sorted newest
    /// first, truncated to the cap and written back in full.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the store cannot be read or written.
    pub fn record_access(&self, coordinate: Option<Coordinate>) -> Result<(), StoreError> {
        let mut entries = match self.store.get(ACCESS_HISTORY_KEY)? {
            Some(raw) => decode_entries(&raw),
            None => Vec::new(),
        };

        let now_ms = self.clock.now_ms();
        entries.insert(0, AccessLedgerEntry::inside(now_ms, coordinate));
        entries.sort_by_key(|entry| Reverse(entry.captured_at_ms));
        entries.truncate(self.cap);

        let raw = serde_json::to_string(&entries)?;
        self.store.set(ACCESS_HISTORY_KEY, &raw)?;
        debug!(now_ms, stored = entries.len(), "recorded region access");
        Ok(())
    }

    /// Inside-region entries no older than `window_ms`, newest first.
    ///
    /// Persisted entries with `insideRegion: false` never count as a grant.
    pub fn query_recent_entries(&self, window_ms: u64) -> Vec<AccessLedgerEntry> {
        let now_ms = self.clock.now_ms();
        let mut entries: Vec<AccessLedgerEntry> = self
            .load_entries()
            .into_iter()
            .filter(|entry| entry.inside_region && entry.age_ms(now_ms) <= window_ms)
            .collect();
        entries.sort_by_key(|entry| Reverse(entry.captured_at_ms));
        entries
    }

    /// Timestamp of the newest entry inside `window_ms`.
    pub fn most_recent_timestamp(&self, window_ms: u64) -> Option<u64> {
        self.query_recent_entries(window_ms)
            .first()
            .map(|entry| entry.captured_at_ms)
    }

    /// Number of physically stored entries, including expired ones.
    pub fn len_stored(&self) -> usize {
        self.load_entries().len()
    }

    /// Deletes the whole ledger.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backend cannot be written.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        self.store.remove(ACCESS_HISTORY_KEY)
    }

    fn load_entries(&self) -> Vec<AccessLedgerEntry> {
        match self.store.get(ACCESS_HISTORY_KEY) {
            Ok(Some(raw)) => decode_entries(&raw),
            Ok(None) => Vec::new(),
            Err(error) => {
                warn!(%error, "access ledger read failed; treating as empty");
                Vec::new()
            }
        }
    }
}

fn decode_entries(raw: &str) -> Vec<AccessLedgerEntry> {
    match serde_json::from_str::<Vec<AccessLedgerEntry>>(raw) {
        Ok(entries) => entries,
        Err(error) => {
            warn!(%error, "access ledger is corrupt; treating as empty");
            Vec::new()
        }
    }
}

/// Persistence layer error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Key cannot be mapped onto the backend.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
    /// Filesystem failure.
    #[error("storage i/o failure: {0}")]
    Io(#[from] io::Error),
    /// In-memory store lock was poisoned by a panicking writer.
    #[error("storage lock poisoned")]
    LockPoisoned,
    /// JSON encoding failure.
    #[error("storage codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    //! Unit tests for store backends and clock helpers.

    use super::*;

    #[test]
    fn memory_store_get_set_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").expect("get should work"), None);
        store.set("k", "v").expect("set should work");
        assert_eq!(store.get("k").expect("get should work").as_deref(), Some("v"));
        store.remove("k").expect("remove should work");
        store.remove("k").expect("second remove should work");
        assert_eq!(store.get("k").expect("get should work"), None);
    }

    #[test]
    fn file_store_round_trips_and_tolerates_missing_files() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let store = FileStore::new(dir.path().join("nested"));
        assert_eq!(store.get("slot").expect("get should work"), None);
        store.set("slot", "[1]").expect("set should work");
        assert_eq!(store.get("slot").expect("get should work").as_deref(), Some("[1]"));
        store.remove("slot").expect("remove should work");
        store.remove("slot").expect("missing remove should work");
    }

    #[test]
    fn rejects_path_like_keys() {
        assert!(validate_key("../escape").is_err());
        assert!(validate_key("").is_err());
        assert!(validate_key(LOCATION_CACHE_KEY).is_ok());
        assert!(validate_key(ACCESS_HISTORY_KEY).is_ok());
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(10);
        clock.advance(5);
        assert_eq!(clock.now_ms(), 15);
        clock.set(1);
        assert_eq!(clock.now_ms(), 1);
    }

    #[test]
    fn retention_constants_match_policy() {
        assert_eq!(ACCESS_RETENTION_WINDOW_MS, 1_209_600_000);
        assert_eq!(LOCATION_CACHE_TTL_MS, 3_600_000);
        assert_eq!(ACCESS_LEDGER_CAP, 50);
    }
}
