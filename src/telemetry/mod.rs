//! Page-visit telemetry: recording raw events and turning them into a
//! gap-filled, time-bucketed series for charting.

mod aggregator;
mod range;
mod recorder;

pub use aggregator::{summarize, Aggregator, Summary};
pub use range::Range;
pub use recorder::Recorder;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

/// Page filter value that disables filtering.
pub const ALL_PAGES: &str = "all";

/// One page visit as stored. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub page: String,
    pub timestamp: String,
    pub minute_timestamp: String,
}

/// One point of the chart series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub timestamp: String,
    pub count: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant.
#[cfg(test)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
