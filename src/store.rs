use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::telemetry::EventRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to connect to event store: {0}")]
    Connect(String),
    #[error("event store query failed: {0}")]
    Query(#[from] postgres::Error),
    #[error("event store unavailable: {0}")]
    Unavailable(String),
}

/// Append-only storage for telemetry events.
///
/// `since` compares canonical keys as strings, which sort chronologically
/// because every key has the same fixed-width UTC layout.
pub trait EventStore: Send + Sync {
    fn append(&self, record: &EventRecord) -> Result<(), StoreError>;

    fn since(&self, start_key: &str, page: Option<&str>) -> Result<Vec<EventRecord>, StoreError>;

    fn ping(&self) -> Result<(), StoreError>;

    fn backend(&self) -> &'static str;
}

// ── In-memory store ──

/// Process-local store used by `STORE=memory` and by tests.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<EventRecord>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreError::Unavailable`.
    #[cfg(test)]
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Insert a raw record without going through the recorder.
    #[cfg(test)]
    pub fn insert_raw(&self, record: EventRecord) {
        self.write().push(record);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<EventRecord>> {
        self.records.read().unwrap_or_else(|e| {
            warn!("[store] lock was poisoned, recovering records");
            e.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<EventRecord>> {
        self.records.write().unwrap_or_else(|e| {
            warn!("[store] lock was poisoned, recovering records");
            e.into_inner()
        })
    }
}

impl EventStore for MemoryStore {
    fn append(&self, record: &EventRecord) -> Result<(), StoreError> {
        self.check()?;
        self.write().push(record.clone());
        debug!("[store] appended in-memory event page={}", record.page);
        Ok(())
    }

    fn since(&self, start_key: &str, page: Option<&str>) -> Result<Vec<EventRecord>, StoreError> {
        self.check()?;
        let records = self.read();
        Ok(records
            .iter()
            .filter(|r| r.minute_timestamp.as_str() >= start_key)
            .filter(|r| page.map_or(true, |p| r.page == p))
            .cloned()
            .collect())
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(page: &str, minute: &str) -> EventRecord {
        EventRecord {
            page: page.to_string(),
            timestamp: minute.to_string(),
            minute_timestamp: minute.to_string(),
        }
    }

    #[test]
    fn since_filters_by_key_then_page() {
        let store = MemoryStore::new();
        store.insert_raw(record("home", "2024-01-15T09:59:00.000Z"));
        store.insert_raw(record("home", "2024-01-15T10:00:00.000Z"));
        store.insert_raw(record("docs", "2024-01-15T10:01:00.000Z"));

        let all = store.since("2024-01-15T10:00:00.000Z", None).unwrap();
        assert_eq!(all.len(), 2);

        let docs = store.since("2024-01-15T10:00:00.000Z", Some("docs")).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].page, "docs");
    }

    #[test]
    fn failing_store_rejects_everything() {
        let store = MemoryStore::new();
        store.set_failing(true);
        assert!(store.append(&record("home", "2024-01-15T10:00:00.000Z")).is_err());
        assert!(store.since("", None).is_err());
        assert!(store.ping().is_err());
        assert!(store.is_empty());
    }
}
