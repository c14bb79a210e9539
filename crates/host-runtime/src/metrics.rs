//! Append-only diagnostic metrics, separate from the authoritative
//! rolling-window health state (§10.1).
//!
//! [`crate::health::HealthState`] is the bounded ring buffer the weight/gate
//! controller actually decides from; it evicts old samples and is the only
//! thing §4.C reads. This collector never evicts — it accumulates lifetime
//! request/error/latency totals per identifier purely for operator-facing
//! export (Prometheus text or JSON), the way a service would expose a
//! `/metrics` endpoint alongside its control-loop state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Lifetime, per-identifier request/error/latency counters.
#[derive(Clone)]
pub struct MetricsCollector {
    request_counts: Arc<DashMap<String, AtomicU64>>,
    error_counts: Arc<DashMap<String, AtomicU64>>,
    latency_sums_micros: Arc<DashMap<String, AtomicU64>>,
    start_time: Arc<Instant>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            request_counts: Arc::new(DashMap::new()),
            error_counts: Arc::new(DashMap::new()),
            latency_sums_micros: Arc::new(DashMap::new()),
            start_time: Arc::new(Instant::now()),
        }
    }

    /// Record one dispatched call against `identifier`.
    pub fn record_call(&self, identifier: &str, latency: Duration, success: bool) {
        self.request_counts
            .entry(identifier.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);

        self.latency_sums_micros
            .entry(identifier.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);

        if !success {
            self.error_counts
                .entry(identifier.to_string())
                .or_insert_with(|| AtomicU64::new(0))
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn request_count(&self, identifier: &str) -> u64 {
        self.request_counts
            .get(identifier)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn error_count(&self, identifier: &str) -> u64 {
        self.error_counts
            .get(identifier)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn avg_latency_micros(&self, identifier: &str) -> Option<f64> {
        let count = self.request_count(identifier);
        if count == 0 {
            return None;
        }
        let sum = self
            .latency_sums_micros
            .get(identifier)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0);
        Some(sum as f64 / count as f64)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Render as Prometheus text exposition format.
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP host_requests_total Total dispatched calls per identifier\n");
        out.push_str("# TYPE host_requests_total counter\n");
        for entry in self.request_counts.iter() {
            out.push_str(&format!(
                "host_requests_total{{identifier=\"{}\"}} {}\n",
                entry.key(),
                entry.value().load(Ordering::Relaxed)
            ));
        }

        out.push_str("# HELP host_errors_total Total invocation failures per identifier\n");
        out.push_str("# TYPE host_errors_total counter\n");
        for entry in self.error_counts.iter() {
            out.push_str(&format!(
                "host_errors_total{{identifier=\"{}\"}} {}\n",
                entry.key(),
                entry.value().load(Ordering::Relaxed)
            ));
        }

        out.push_str("# HELP host_latency_microseconds_sum Sum of call latencies per identifier\n");
        out.push_str("# TYPE host_latency_microseconds_sum counter\n");
        for entry in self.latency_sums_micros.iter() {
            out.push_str(&format!(
                "host_latency_microseconds_sum{{identifier=\"{}\"}} {}\n",
                entry.key(),
                entry.value().load(Ordering::Relaxed)
            ));
        }

        out.push_str("# HELP host_uptime_seconds Process uptime\n");
        out.push_str("# TYPE host_uptime_seconds gauge\n");
        out.push_str(&format!("host_uptime_seconds {}\n", self.uptime_seconds()));

        out
    }

    /// Render as a JSON summary, one object per identifier.
    pub fn export_json(&self) -> serde_json::Value {
        let mut identifiers = serde_json::Map::new();

        for entry in self.request_counts.iter() {
            let key = entry.key();
            let requests = entry.value().load(Ordering::Relaxed);
            let errors = self.error_count(key);
            let mut data = serde_json::Map::new();
            data.insert("requests".to_string(), serde_json::json!(requests));
            data.insert("errors".to_string(), serde_json::json!(errors));
            if let Some(avg) = self.avg_latency_micros(key) {
                data.insert("avg_latency_micros".to_string(), serde_json::json!(avg));
            }
            identifiers.insert(key.clone(), serde_json::Value::Object(data));
        }

        serde_json::json!({
            "uptime_seconds": self.uptime_seconds(),
            "identifiers": identifiers,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
