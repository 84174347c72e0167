// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Fixed-bucket response time histogram.
//!
//! Memory per histogram is one counter per bucket, independent of traffic.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::HistogramConfig;

/// Histogram over response times with shared bucket boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseTimeHistogram {
    /// Bucket upper bounds in milliseconds, strictly increasing.
    buckets: Arc<[u64]>,

    /// Count per bucket; the last slot is the overflow bucket.
    counts: Box<[u64]>,
}

impl ResponseTimeHistogram {
    /// Create a histogram with the given bucket boundaries (in milliseconds).
    pub fn with_buckets(buckets: Arc<[u64]>) -> Self {
        let counts = vec![0; buckets.len() + 1].into_boxed_slice();
        Self { buckets, counts }
    }

    /// Shared boundaries built from configuration.
    pub fn boundaries(config: &HistogramConfig) -> Arc<[u64]> {
        Arc::from(config.response_time_buckets_ms.as_slice())
    }

    /// Record a response time given in seconds.
    ///
    /// Negative or non-finite values are counted in the first bucket.
    pub fn record_secs(&mut self, seconds: f64) {
        let millis = if seconds.is_finite() && seconds > 0.0 {
            (seconds * 1000.0) as u64
        } else {
            0
        };
        self.record_millis(millis);
    }

    /// Record a duration value.
    pub fn record(&mut self, duration: Duration) {
        self.record_millis(duration.as_millis().min(u64::MAX as u128) as u64);
    }

    fn record_millis(&mut self, millis: u64) {
        let bucket_idx = self
            .buckets
            .iter()
            .position(|&b| millis <= b)
            .unwrap_or(self.buckets.len());
        self.counts[bucket_idx] += 1;
    }

    /// Get counts for each bucket.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Get bucket boundaries.
    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }

    /// Total number of recorded values.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Non-empty buckets keyed by their lower bound in milliseconds.
    pub fn to_map(&self) -> BTreeMap<u64, u64> {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(i, &count)| {
                let lower = if i == 0 { 0 } else { self.buckets[i - 1] };
                (lower, count)
            })
            .collect()
    }
}

impl Default for ResponseTimeHistogram {
    fn default() -> Self {
        Self::with_buckets(Self::boundaries(&HistogramConfig::default()))
    }
}
