use log::{debug, error, info};

use super::range::{format_key, minute_key, parse_timestamp};
use super::{Clock, EventRecord, TelemetryError};
use crate::store::EventStore;

/// Appends page-visit events. Every call writes a new row; duplicates are
/// counted as separate visits.
pub struct Recorder<'a> {
    store: &'a dyn EventStore,
    clock: &'a dyn Clock,
}

impl<'a> Recorder<'a> {
    pub fn new(store: &'a dyn EventStore, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    pub fn record(&self, page: &str, timestamp: Option<&str>) -> Result<EventRecord, TelemetryError> {
        let page = page.trim();
        if page.is_empty() {
            return Err(TelemetryError::Validation("Page is required".to_string()));
        }

        let (timestamp, at) = match timestamp.map(str::trim).filter(|t| !t.is_empty()) {
            Some(raw) => {
                let at = parse_timestamp(raw).map_err(|e| {
                    TelemetryError::Validation(format!("Invalid timestamp {:?}: {}", raw, e))
                })?;
                (raw.to_string(), at)
            }
            None => {
                let now = self.clock.now();
                (format_key(now), now)
            }
        };

        let record = EventRecord {
            page: page.to_string(),
            timestamp,
            minute_timestamp: minute_key(at),
        };
        debug!(
            "[telemetry] recording page={}, minute={}",
            record.page, record.minute_timestamp
        );

        if let Err(e) = self.store.append(&record) {
            error!("[telemetry] failed to record event for page={}: {}", record.page, e);
            return Err(e.into());
        }

        info!("[telemetry] recorded visit page={}, at={}", record.page, record.timestamp);
        Ok(record)
    }
}
