//! Observability metrics: search latency, outcomes, dropped candidates.

use crate::error::ErrorCategory;
use crate::orchestrator::SearchStats;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

/// Latency samples kept for averages and percentiles; older ones are evicted.
pub const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Collects runtime metrics across search requests.
#[derive(Debug)]
pub struct MetricsCollector {
    search_latencies_us: VecDeque<f64>,
    total_searches: u64,
    failed_searches: BTreeMap<ErrorCategory, u64>,
    candidates_indexed: u64,
    download_failures: BTreeMap<String, u64>,
    extraction_failures: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            search_latencies_us: VecDeque::with_capacity(MAX_LATENCY_SAMPLES),
            total_searches: 0,
            failed_searches: BTreeMap::new(),
            candidates_indexed: 0,
            download_failures: BTreeMap::new(),
            extraction_failures: 0,
        }
    }

    /// Record a successful search with its stats.
    pub fn record_success(&mut self, stats: &SearchStats) {
        self.total_searches += 1;
        self.record_latency(stats.elapsed);
        self.candidates_indexed += stats.indexed as u64;
        self.extraction_failures += stats.extraction_failures as u64;
        for (kind, count) in &stats.download_failures {
            *self.download_failures.entry(kind.clone()).or_insert(0) += *count as u64;
        }
    }

    /// Record a failed search.
    pub fn record_failure(&mut self, category: ErrorCategory, duration: Duration) {
        self.total_searches += 1;
        self.record_latency(duration);
        *self.failed_searches.entry(category).or_insert(0) += 1;
    }

    fn record_latency(&mut self, duration: Duration) {
        if self.search_latencies_us.len() == MAX_LATENCY_SAMPLES {
            self.search_latencies_us.pop_front();
        }
        self.search_latencies_us.push_back(duration.as_micros() as f64);
    }

    /// Number of latency samples currently held
    pub fn latency_samples(&self) -> usize {
        self.search_latencies_us.len()
    }

    pub fn total_searches(&self) -> u64 {
        self.total_searches
    }

    pub fn failed_searches(&self) -> u64 {
        self.failed_searches.values().sum()
    }

    pub fn succeeded_searches(&self) -> u64 {
        self.total_searches - self.failed_searches()
    }

    /// Failed searches per error category.
    pub fn failures_by_category(&self) -> BTreeMap<String, u64> {
        self.failed_searches
            .iter()
            .map(|(category, count)| (category.to_string(), *count))
            .collect()
    }

    /// Dropped downloads per reason, summed over successful searches.
    pub fn download_failures(&self) -> &BTreeMap<String, u64> {
        &self.download_failures
    }

    pub fn extraction_failures(&self) -> u64 {
        self.extraction_failures
    }

    pub fn candidates_indexed(&self) -> u64 {
        self.candidates_indexed
    }

    /// Average search latency in microseconds.
    pub fn avg_search_latency_us(&self) -> f64 {
        if self.search_latencies_us.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.search_latencies_us.iter().sum();
        sum / self.search_latencies_us.len() as f64
    }

    /// Get a percentile of search latency (e.g., 50.0, 95.0, 99.0).
    pub fn percentile_search_latency_us(&self, percentile: f64) -> f64 {
        if self.search_latencies_us.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<f64> = self.search_latencies_us.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let index = ((percentile / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        sorted[index.min(sorted.len() - 1)]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
