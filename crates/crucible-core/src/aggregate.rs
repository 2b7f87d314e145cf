use crate::model::{Classification, ResultStatus, TestResult};
use serde::Serialize;
use std::collections::HashMap;

/// Live metrics contract consumed by reporting surfaces. Latency in
/// milliseconds, rates as percentages 0-100.
#[derive(Debug, Clone, Serialize)]
pub struct LiveMetrics {
    pub total_test_cases: u64,
    pub success_rate: f64,
    pub average_latency: f64,
    pub total_vulnerabilities: u64,
}

/// Online aggregator over the result stream.
///
/// Counts, the Welford latency mean/variance and the vulnerability tally all
/// update in O(1) per result, so live metrics are available before the run
/// completes. Cancelled results count toward totals and the success rate but
/// not toward latency, since no call was completed.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    total: u64,
    counts: HashMap<Classification, u64>,
    vulnerabilities: u64,
    lat_n: u64,
    lat_mean: f64,
    lat_m2: f64,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: &TestResult) {
        self.total += 1;
        *self.counts.entry(result.classification).or_default() += 1;
        self.vulnerabilities += result.vulnerability_flags.len() as u64;

        if result.status != ResultStatus::Cancelled {
            self.lat_n += 1;
            let x = result.latency_ms as f64;
            let delta = x - self.lat_mean;
            self.lat_mean += delta / self.lat_n as f64;
            self.lat_m2 += delta * (x - self.lat_mean);
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn count(&self, class: Classification) -> u64 {
        self.counts.get(&class).copied().unwrap_or(0)
    }

    /// `count(success) / total * 100`; zero for an empty stream.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.count(Classification::Success) as f64 / self.total as f64 * 100.0
        }
    }

    pub fn average_latency(&self) -> f64 {
        self.lat_mean
    }

    pub fn latency_variance(&self) -> f64 {
        if self.lat_n < 2 {
            0.0
        } else {
            self.lat_m2 / self.lat_n as f64
        }
    }

    pub fn total_vulnerabilities(&self) -> u64 {
        self.vulnerabilities
    }

    pub fn snapshot(&self) -> LiveMetrics {
        LiveMetrics {
            total_test_cases: self.total,
            success_rate: self.success_rate(),
            average_latency: self.average_latency(),
            total_vulnerabilities: self.vulnerabilities,
        }
    }
}
