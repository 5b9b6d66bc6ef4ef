use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use serde::Serialize;
use std::collections::HashMap;

use super::range::{format_key, parse_timestamp, Range};
use super::{Bucket, Clock, EventRecord, TelemetryError, ALL_PAGES};
use crate::store::EventStore;

/// Reads a window of raw events and produces the chart series.
pub struct Aggregator<'a> {
    store: &'a dyn EventStore,
    clock: &'a dyn Clock,
}

impl<'a> Aggregator<'a> {
    pub fn new(store: &'a dyn EventStore, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// One bucket per step from the window start up to and including now,
    /// zero-filled where nothing was recorded.
    pub fn query(&self, range: Range, page_filter: Option<&str>) -> Result<Vec<Bucket>, TelemetryError> {
        let (start, end) = range.window(self.clock.now());
        let start_key = format_key(start);
        let page = page_filter
            .map(str::trim)
            .filter(|p| !p.is_empty() && *p != ALL_PAGES);

        debug!(
            "[telemetry] querying range={}, since={}, page={}",
            range.as_str(),
            start_key,
            page.unwrap_or(ALL_PAGES)
        );

        let records = self.store.since(&start_key, page).map_err(|e| {
            error!("[telemetry] failed to fetch telemetry stats: {}", e);
            TelemetryError::from(e)
        })?;

        let counts = group_counts(&records, range);
        let buckets = fill_buckets(&counts, start, end, range);
        debug!(
            "[telemetry] range={} produced {} buckets from {} events",
            range.as_str(),
            buckets.len(),
            records.len()
        );
        Ok(buckets)
    }
}

/// Count records per bucket key. Minute ranges count the stored key string
/// exactly as written; `Week` rolls each parsed key up to its day. Records
/// whose stored key does not parse are skipped.
pub fn group_counts(records: &[EventRecord], range: Range) -> HashMap<String, u64> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    let mut skipped = 0usize;

    for record in records {
        match parse_timestamp(&record.minute_timestamp) {
            Ok(at) => {
                let key = match range {
                    Range::Week => range.bucket_key(at),
                    Range::Hour | Range::Day => record.minute_timestamp.clone(),
                };
                *counts.entry(key).or_insert(0) += 1;
            }
            Err(e) => {
                skipped += 1;
                warn!(
                    "[telemetry] skipping event page={} with malformed minute key {:?}: {}",
                    record.page, record.minute_timestamp, e
                );
            }
        }
    }

    if skipped > 0 {
        debug!("[telemetry] skipped {} malformed events", skipped);
    }
    counts
}

pub fn fill_buckets(
    counts: &HashMap<String, u64>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    range: Range,
) -> Vec<Bucket> {
    let step = range.step();
    let mut buckets = Vec::new();
    let mut current = start;

    while current <= end {
        let key = range.bucket_key(current);
        let count = counts.get(&key).copied().unwrap_or(0);
        buckets.push(Bucket { timestamp: key, count });
        current += step;
    }

    buckets
}

/// Headline numbers shown above the chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub current: u64,
    pub average: f64,
    pub peak: u64,
    pub total: u64,
    pub buckets: usize,
}

pub fn summarize(buckets: &[Bucket]) -> Summary {
    let total: u64 = buckets.iter().map(|b| b.count).sum();
    let average = if buckets.is_empty() {
        0.0
    } else {
        let raw = total as f64 / buckets.len() as f64;
        (raw * 10.0).round() / 10.0
    };

    Summary {
        current: buckets.last().map(|b| b.count).unwrap_or(0),
        average,
        peak: buckets.iter().map(|b| b.count).max().unwrap_or(0),
        total,
        buckets: buckets.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::telemetry::{FixedClock, Recorder};

    const NOW: &str = "2024-01-15T10:30:45.123Z";

    fn clock() -> FixedClock {
        FixedClock(parse_timestamp(NOW).unwrap())
    }

    fn raw(page: &str, minute: &str) -> EventRecord {
        EventRecord {
            page: page.to_string(),
            timestamp: minute.to_string(),
            minute_timestamp: minute.to_string(),
        }
    }

    #[test]
    fn single_visit_lands_in_current_minute() {
        let store = MemoryStore::new();
        let clock = clock();
        Recorder::new(&store, &clock).record("home", None).unwrap();

        let buckets = Aggregator::new(&store, &clock)
            .query(Range::Hour, Some(ALL_PAGES))
            .unwrap();

        assert_eq!(buckets.len(), 61);
        assert_eq!(buckets[0].timestamp, "2024-01-15T09:30:00.000Z");
        let last = buckets.last().unwrap();
        assert_eq!(last.timestamp, "2024-01-15T10:30:00.000Z");
        assert_eq!(last.count, 1);
        assert!(buckets[..60].iter().all(|b| b.count == 0));
    }

    #[test]
    fn visits_a_minute_apart_fill_adjacent_buckets() {
        let store = MemoryStore::new();
        let clock = clock();
        let recorder = Recorder::new(&store, &clock);
        recorder.record("home", Some("2024-01-15T10:29:10Z")).unwrap();
        recorder.record("home", Some("2024-01-15T10:30:10Z")).unwrap();

        let buckets = Aggregator::new(&store, &clock).query(Range::Hour, None).unwrap();

        assert_eq!(buckets[59].timestamp, "2024-01-15T10:29:00.000Z");
        assert_eq!(buckets[59].count, 1);
        assert_eq!(buckets[60].timestamp, "2024-01-15T10:30:00.000Z");
        assert_eq!(buckets[60].count, 1);
        assert_eq!(buckets.iter().map(|b| b.count).sum::<u64>(), 2);
    }

    #[test]
    fn unknown_page_in_week_range_is_all_zero() {
        let store = MemoryStore::new();
        let clock = clock();
        let recorder = Recorder::new(&store, &clock);
        recorder.record("home", None).unwrap();
        recorder.record("docs", Some("2024-01-12T03:00:00Z")).unwrap();

        let buckets = Aggregator::new(&store, &clock)
            .query(Range::Week, Some("nonexistent-page"))
            .unwrap();

        assert_eq!(buckets.len(), 8);
        assert_eq!(buckets[0].timestamp, "2024-01-08T00:00:00.000Z");
        assert_eq!(buckets[7].timestamp, "2024-01-15T00:00:00.000Z");
        assert!(buckets.iter().all(|b| b.count == 0));
    }

    #[test]
    fn store_failure_returns_no_series() {
        let store = MemoryStore::new();
        store.set_failing(true);
        let clock = clock();

        let result = Aggregator::new(&store, &clock).query(Range::Hour, None);
        assert!(matches!(result, Err(TelemetryError::Storage(_))));
    }

    #[test]
    fn bucket_counts_match_window_length() {
        let store = MemoryStore::new();
        let clock = clock();
        let aggregator = Aggregator::new(&store, &clock);

        assert_eq!(aggregator.query(Range::Hour, None).unwrap().len(), 61);
        assert_eq!(aggregator.query(Range::Day, None).unwrap().len(), 1441);
        assert_eq!(aggregator.query(Range::Week, None).unwrap().len(), 8);
    }

    #[test]
    fn series_is_contiguous_and_ascending() {
        let store = MemoryStore::new();
        let clock = clock();
        let buckets = Aggregator::new(&store, &clock).query(Range::Day, None).unwrap();

        for pair in buckets.windows(2) {
            let a = parse_timestamp(&pair[0].timestamp).unwrap();
            let b = parse_timestamp(&pair[1].timestamp).unwrap();
            assert_eq!(b - a, Range::Day.step());
        }
    }

    #[test]
    fn page_filter_restricts_counts() {
        let store = MemoryStore::new();
        let clock = clock();
        let recorder = Recorder::new(&store, &clock);
        recorder.record("home", None).unwrap();
        recorder.record("home", None).unwrap();
        recorder.record("docs", None).unwrap();

        let aggregator = Aggregator::new(&store, &clock);
        let home = aggregator.query(Range::Hour, Some("home")).unwrap();
        let all = aggregator.query(Range::Hour, Some("all")).unwrap();
        let unfiltered = aggregator.query(Range::Hour, None).unwrap();

        assert_eq!(home.last().unwrap().count, 2);
        assert_eq!(all.last().unwrap().count, 3);
        assert_eq!(all, unfiltered);
    }

    #[test]
    fn malformed_keys_are_skipped() {
        let store = MemoryStore::new();
        store.insert_raw(raw("home", "2024-01-15T10:10:00.000Z"));
        store.insert_raw(raw("home", "zz-not-a-time"));
        let clock = clock();

        let buckets = Aggregator::new(&store, &clock).query(Range::Hour, None).unwrap();

        assert_eq!(buckets.len(), 61);
        assert_eq!(buckets.iter().map(|b| b.count).sum::<u64>(), 1);
    }

    #[test]
    fn minute_ranges_count_stored_keys_verbatim() {
        let store = MemoryStore::new();
        store.insert_raw(raw("home", "2024-01-15T10:10:30.000Z"));
        store.insert_raw(raw("home", "2024-01-15T10:12:00.000Z"));
        let clock = clock();

        let buckets = Aggregator::new(&store, &clock).query(Range::Hour, None).unwrap();

        let count_at = |key: &str| buckets.iter().find(|b| b.timestamp == key).map(|b| b.count);
        assert_eq!(count_at("2024-01-15T10:10:00.000Z"), Some(0));
        assert_eq!(count_at("2024-01-15T10:12:00.000Z"), Some(1));
        assert_eq!(buckets.iter().map(|b| b.count).sum::<u64>(), 1);
    }

    #[test]
    fn minute_before_window_start_is_not_fetched() {
        let store = MemoryStore::new();
        store.insert_raw(raw("home", "2024-01-15T09:30:00.000Z"));
        let clock = clock();

        let buckets = Aggregator::new(&store, &clock).query(Range::Hour, None).unwrap();

        assert_eq!(buckets[0].timestamp, "2024-01-15T09:30:00.000Z");
        assert_eq!(buckets[0].count, 0);
    }

    #[test]
    fn week_rolls_minutes_up_to_days() {
        let store = MemoryStore::new();
        store.insert_raw(raw("home", "2024-01-14T13:05:00.000Z"));
        store.insert_raw(raw("home", "2024-01-14T18:00:00.000Z"));
        store.insert_raw(raw("home", "2024-01-15T00:00:00.000Z"));
        let clock = clock();

        let buckets = Aggregator::new(&store, &clock).query(Range::Week, None).unwrap();

        assert_eq!(buckets[6].timestamp, "2024-01-14T00:00:00.000Z");
        assert_eq!(buckets[6].count, 2);
        assert_eq!(buckets[7].count, 1);
    }

    #[test]
    fn degenerate_window_has_one_bucket() {
        let at = parse_timestamp(NOW).unwrap();
        let buckets = fill_buckets(&HashMap::new(), at, at, Range::Hour);
        assert_eq!(
            buckets,
            vec![Bucket {
                timestamp: "2024-01-15T10:30:00.000Z".to_string(),
                count: 0
            }]
        );
    }

    #[test]
    fn summary_of_series() {
        let buckets: Vec<Bucket> = [0u64, 3, 1, 2]
            .iter()
            .enumerate()
            .map(|(i, c)| Bucket {
                timestamp: format!("2024-01-15T10:0{}:00.000Z", i),
                count: *c,
            })
            .collect();

        let summary = summarize(&buckets);
        assert_eq!(summary.current, 2);
        assert_eq!(summary.peak, 3);
        assert_eq!(summary.total, 6);
        assert_eq!(summary.average, 1.5);
        assert_eq!(summary.buckets, 4);
    }

    #[test]
    fn summary_of_nothing_is_zero() {
        let summary = summarize(&[]);
        assert_eq!(summary.current, 0);
        assert_eq!(summary.peak, 0);
        assert_eq!(summary.average, 0.0);
    }
}
