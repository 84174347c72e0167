// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-endpoint request statistics.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{CountersConfig, HistogramConfig};

use super::bounded::{BoundedMap, EvictionPolicy};
use super::histogram::ResponseTimeHistogram;

/// Grouping key of the request counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub consumer: Option<String>,
    pub method: String,
    pub path: String,
    pub status_code: u16,
}

/// Aggregated values for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestStats {
    pub request_count: u64,
    pub request_size_sum: u64,
    pub response_size_sum: u64,
    pub response_times: ResponseTimeHistogram,
}

impl RequestStats {
    fn new(buckets: Arc<[u64]>) -> Self {
        Self {
            request_count: 0,
            request_size_sum: 0,
            response_size_sum: 0,
            response_times: ResponseTimeHistogram::with_buckets(buckets),
        }
    }
}

/// A single observed request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestRecord<'a> {
    pub consumer: Option<&'a str>,
    pub method: &'a str,
    pub path: &'a str,
    pub status_code: u16,
    /// Response time in seconds.
    pub response_time: f64,
    pub request_size: Option<u64>,
    pub response_size: Option<u64>,
}

/// Drained counts for one key, in hub payload shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestCounts {
    pub consumer: Option<String>,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub request_count: u64,
    pub request_size_sum: u64,
    pub response_size_sum: u64,
    /// Bucket lower bound (ms) → count.
    pub response_times: BTreeMap<u64, u64>,
}

/// Delta accumulator of request statistics between flushes.
pub struct RequestCounter {
    entries: BoundedMap<RequestKey, RequestStats>,
    buckets: Arc<[u64]>,
}

impl RequestCounter {
    /// Create a counter with default limits and buckets.
    pub fn new() -> Self {
        Self::with_config(&CountersConfig::default(), &HistogramConfig::default())
    }

    pub fn with_config(counters: &CountersConfig, histogram: &HistogramConfig) -> Self {
        Self {
            entries: BoundedMap::new("requests", counters.max_request_keys, counters.eviction),
            buckets: ResponseTimeHistogram::boundaries(histogram),
        }
    }

    /// Create a counter with an explicit key limit.
    pub fn with_limit(max_keys: usize, policy: EvictionPolicy) -> Self {
        Self {
            entries: BoundedMap::new("requests", max_keys, policy),
            buckets: ResponseTimeHistogram::boundaries(&HistogramConfig::default()),
        }
    }

    /// Record one request. Missing sizes are left out of the sums.
    pub fn add_request(&self, record: RequestRecord<'_>) {
        let key = RequestKey {
            consumer: record
                .consumer
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            method: record.method.to_uppercase(),
            path: record.path.to_string(),
            status_code: record.status_code,
        };

        let buckets = &self.buckets;
        self.entries.update(
            key,
            || RequestStats::new(Arc::clone(buckets)),
            |stats| {
                stats.request_count += 1;
                if let Some(size) = record.request_size {
                    stats.request_size_sum = stats.request_size_sum.saturating_add(size);
                }
                if let Some(size) = record.response_size {
                    stats.response_size_sum = stats.response_size_sum.saturating_add(size);
                }
                stats.response_times.record_secs(record.response_time);
            },
        );
    }

    /// Take all counts accumulated since the previous drain.
    pub fn drain(&self) -> Vec<RequestCounts> {
        self.entries
            .drain()
            .into_iter()
            .map(|(key, stats)| RequestCounts {
                consumer: key.consumer,
                method: key.method,
                path: key.path,
                status_code: key.status_code,
                request_count: stats.request_count,
                request_size_sum: stats.request_size_sum,
                response_size_sum: stats.response_size_sum,
                response_times: stats.response_times.to_map(),
            })
            .collect()
    }

    /// Current stats for a key.
    pub fn get(&self, key: &RequestKey) -> Option<RequestStats> {
        self.entries.get_cloned(key)
    }

    /// Number of distinct keys held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RequestCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record<'a>(consumer: Option<&'a str>, path: &'a str, status: u16) -> RequestRecord<'a> {
        RequestRecord {
            consumer,
            method: "get",
            path,
            status_code: status,
            response_time: 0.2,
            request_size: Some(10),
            response_size: Some(200),
        }
    }

    #[test]
    fn test_counts_per_key() {
        let counter = RequestCounter::new();
        counter.add_request(record(None, "/items", 200));
        counter.add_request(record(None, "/items", 200));
        counter.add_request(record(None, "/items", 404));
        counter.add_request(record(Some("tenant-1"), "/items", 200));

        let drained = counter.drain();
        assert_eq!(drained.len(), 3);

        let anon_ok = drained
            .iter()
            .find(|c| c.consumer.is_none() && c.status_code == 200)
            .unwrap();
        assert_eq!(anon_ok.method, "GET");
        assert_eq!(anon_ok.request_count, 2);
        assert_eq!(anon_ok.request_size_sum, 20);
        assert_eq!(anon_ok.response_size_sum, 400);
        assert_eq!(anon_ok.response_times.values().sum::<u64>(), 2);
    }

    #[test]
    fn test_drain_after_drain_is_empty() {
        let counter = RequestCounter::new();
        counter.add_request(record(None, "/items", 200));
        assert_eq!(counter.drain().len(), 1);
        assert!(counter.drain().is_empty());
        assert!(counter.is_empty());
    }

    #[test]
    fn test_missing_sizes_are_excluded() {
        let counter = RequestCounter::new();
        counter.add_request(RequestRecord {
            request_size: None,
            response_size: None,
            ..record(None, "/items", 200)
        });
        counter.add_request(record(None, "/items", 200));

        let drained = counter.drain();
        assert_eq!(drained[0].request_count, 2);
        assert_eq!(drained[0].request_size_sum, 10);
        assert_eq!(drained[0].response_size_sum, 200);
    }

    #[test]
    fn test_empty_consumer_is_anonymous() {
        let counter = RequestCounter::new();
        counter.add_request(record(Some("  "), "/items", 200));
        counter.add_request(record(None, "/items", 200));

        let drained = counter.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].request_count, 2);
    }

    #[test]
    fn test_key_limit() {
        let counter = RequestCounter::with_limit(2, EvictionPolicy::RejectNew);
        counter.add_request(record(None, "/a", 200));
        counter.add_request(record(None, "/b", 200));
        counter.add_request(record(None, "/c", 200));
        assert_eq!(counter.len(), 2);
    }

    #[test]
    fn test_serialized_shape() {
        let counter = RequestCounter::new();
        counter.add_request(record(Some("tenant-1"), "/items/{id}", 200));

        let json = serde_json::to_value(counter.drain()).unwrap();
        let entry = &json[0];
        assert_eq!(entry["consumer"], "tenant-1");
        assert_eq!(entry["path"], "/items/{id}");
        assert_eq!(entry["status_code"], 200);
        assert_eq!(entry["response_times"]["100"], 1);
    }
}
