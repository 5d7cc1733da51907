//! In-process counters for requests, license checks and denials.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// Response times kept per endpoint for the rolling average.
pub const RESPONSE_TIME_WINDOW: usize = 100;

#[derive(Debug, Default)]
struct EndpointStats {
    requests: u64,
    errors: u64,
    recent: VecDeque<Duration>,
}

impl EndpointStats {
    fn average_secs(&self) -> Option<f64> {
        if self.recent.is_empty() {
            return None;
        }
        let total: Duration = self.recent.iter().sum();
        Some(total.as_secs_f64() / self.recent.len() as f64)
    }
}

#[derive(Debug, Default)]
pub struct ApiMetrics {
    license_checks: AtomicU64,
    license_denials: AtomicU64,
    feature_denials: Mutex<BTreeMap<String, u64>>,
    endpoints: Mutex<BTreeMap<String, EndpointStats>>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Requests served, by endpoint.
    pub requests: BTreeMap<String, u64>,
    /// Responses with a 4xx or 5xx status, by endpoint.
    pub errors: BTreeMap<String, u64>,
    /// Mean of the last [`RESPONSE_TIME_WINDOW`] response times, in seconds.
    pub avg_response_times: BTreeMap<String, f64>,
    pub license_checks: u64,
    pub license_denials: u64,
    pub feature_denials: BTreeMap<String, u64>,
}

impl ApiMetrics {
    /// Records one finished request against `endpoint`.
    pub fn record_response(&self, endpoint: &str, is_error: bool, elapsed: Duration) {
        let mut endpoints = self
            .endpoints
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let stats = endpoints.entry(endpoint.to_string()).or_default();
        stats.requests += 1;
        if is_error {
            stats.errors += 1;
        }
        if stats.recent.len() == RESPONSE_TIME_WINDOW {
            stats.recent.pop_front();
        }
        stats.recent.push_back(elapsed);
    }

    pub fn record_license_check(&self) {
        self.license_checks.fetch_add(1, Ordering::Relaxed);
    }

    /// A request was rejected because no valid license exists.
    pub fn record_license_denial(&self) {
        self.license_denials.fetch_add(1, Ordering::Relaxed);
    }

    /// A request was rejected or degraded for lack of `feature`.
    pub fn record_feature_denial(&self, feature: &str) {
        let mut denials = self
            .feature_denials
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *denials.entry(feature.to_string()).or_default() += 1;
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut requests = BTreeMap::new();
        let mut errors = BTreeMap::new();
        let mut avg_response_times = BTreeMap::new();
        {
            let endpoints = self
                .endpoints
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            for (endpoint, stats) in endpoints.iter() {
                requests.insert(endpoint.clone(), stats.requests);
                if stats.errors > 0 {
                    errors.insert(endpoint.clone(), stats.errors);
                }
                if let Some(average) = stats.average_secs() {
                    avg_response_times.insert(endpoint.clone(), average);
                }
            }
        }

        MetricsSnapshot {
            requests,
            errors,
            avg_response_times,
            license_checks: self.license_checks.load(Ordering::Relaxed),
            license_denials: self.license_denials.load(Ordering::Relaxed),
            feature_denials: self
                .feature_denials
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone(),
        }
    }
}
