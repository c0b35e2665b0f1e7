use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::sink::{MetricsMessage, RecordSink};

/// In-memory [`RecordSink`] aggregating per-request metrics with atomic counters.
///
/// Also serves as the default exposition behind `GET /metrics`.
pub struct MetricsRecorder {
    pub total_requests: AtomicU64,
    pub total_failures: AtomicU64,
    /// Latency histogram buckets (ms): <10, <50, <100, <500, <1000, >=1000.
    pub latency_buckets: [AtomicU64; 6],
    total_latency_micros: AtomicU64,
    /// Request counts keyed by `METHOD path` (path is the route alias when set).
    path_counts: RwLock<HashMap<String, AtomicU64>>,
    /// Request counts keyed by HTTP status.
    status_counts: RwLock<HashMap<String, AtomicU64>>,
    created_at: Instant,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            latency_buckets: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
            total_latency_micros: AtomicU64::new(0),
            path_counts: RwLock::new(HashMap::new()),
            status_counts: RwLock::new(HashMap::new()),
            created_at: Instant::now(),
        }
    }

    fn record_latency(&self, cost_seconds: f64) {
        let ms = (cost_seconds.max(0.0) * 1000.0) as u64;
        let bucket = match ms {
            0..=9 => 0,
            10..=49 => 1,
            50..=99 => 2,
            100..=499 => 3,
            500..=999 => 4,
            _ => 5,
        };
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.total_latency_micros
            .fetch_add((cost_seconds.max(0.0) * 1_000_000.0) as u64, Ordering::Relaxed);
    }

    /// Snapshot current metrics as a JSON-serializable value.
    pub fn snapshot(&self) -> serde_json::Value {
        let total = self.total_requests.load(Ordering::Relaxed);
        let failures = self.total_failures.load(Ordering::Relaxed);
        let avg_latency_ms = if total > 0 {
            self.total_latency_micros.load(Ordering::Relaxed) as f64 / 1000.0 / total as f64
        } else {
            0.0
        };
        let failure_rate = if total > 0 {
            failures as f64 / total as f64
        } else {
            0.0
        };

        serde_json::json!({
            "total_requests": total,
            "total_failures": failures,
            "failure_rate": failure_rate,
            "avg_latency_ms": avg_latency_ms,
            "latency_ms": {
                "<10": self.latency_buckets[0].load(Ordering::Relaxed),
                "10-49": self.latency_buckets[1].load(Ordering::Relaxed),
                "50-99": self.latency_buckets[2].load(Ordering::Relaxed),
                "100-499": self.latency_buckets[3].load(Ordering::Relaxed),
                "500-999": self.latency_buckets[4].load(Ordering::Relaxed),
                ">=1000": self.latency_buckets[5].load(Ordering::Relaxed),
            },
            "by_path": snapshot_map(&self.path_counts),
            "by_status": snapshot_map(&self.status_counts),
            "uptime_seconds": self.created_at.elapsed().as_secs(),
        })
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSink for MetricsRecorder {
    fn record(&self, message: &MetricsMessage) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if !message.is_success {
            self.total_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.record_latency(message.cost_seconds);
        increment_map(
            &self.path_counts,
            &format!("{} {}", message.method, message.path),
        );
        increment_map(&self.status_counts, &message.http_code.to_string());
    }
}

fn increment_map(map: &RwLock<HashMap<String, AtomicU64>>, key: &str) {
    // Fast path: read lock
    if let Ok(m) = map.read()
        && let Some(counter) = m.get(key)
    {
        counter.fetch_add(1, Ordering::Relaxed);
        return;
    }
    // Slow path: write lock to insert
    if let Ok(mut m) = map.write() {
        m.entry(key.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }
}

fn snapshot_map(map: &RwLock<HashMap<String, AtomicU64>>) -> serde_json::Value {
    let mut result = serde_json::Map::new();
    if let Ok(m) = map.read() {
        for (k, v) in m.iter() {
            result.insert(
                k.clone(),
                serde_json::Value::Number(v.load(Ordering::Relaxed).into()),
            );
        }
    }
    serde_json::Value::Object(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(path: &str, http_code: u16, cost_seconds: f64, is_success: bool) -> MetricsMessage {
        MetricsMessage {
            project_name: "ferrule".into(),
            env: "fat".into(),
            trace_id: String::new(),
            host: "localhost".into(),
            path: path.into(),
            method: "GET".into(),
            http_code,
            business_code: 0,
            cost_seconds,
            is_success,
        }
    }

    #[test]
    fn test_basic_metrics() {
        let m = MetricsRecorder::new();
        m.record(&message("/users", 200, 0.005, true));
        m.record(&message("/users", 200, 0.2, true));
        m.record(&message("/orders", 500, 2.0, false));

        let snap = m.snapshot();
        assert_eq!(snap["total_requests"], 3);
        assert_eq!(snap["total_failures"], 1);
        assert_eq!(snap["by_path"]["GET /users"], 2);
        assert_eq!(snap["by_path"]["GET /orders"], 1);
        assert_eq!(snap["by_status"]["200"], 2);
        assert_eq!(snap["by_status"]["500"], 1);
        assert_eq!(snap["latency_ms"]["<10"], 1);
        assert_eq!(snap["latency_ms"]["100-499"], 1);
        assert_eq!(snap["latency_ms"][">=1000"], 1);
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = MetricsRecorder::default().snapshot();
        assert_eq!(snap["total_requests"], 0);
        assert_eq!(snap["failure_rate"], 0.0);
    }
}
