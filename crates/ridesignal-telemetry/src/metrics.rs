use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Type of metric.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Counter,
    Gauge,
}

/// Point-in-time value of one labelled metric.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub name: String,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub labels: HashMap<String, String>,
    pub value: i64,
    pub metric_type: MetricType,
}

/// Metric key: name + labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct MetricKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl MetricKey {
    fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        let mut sorted: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            name: name.to_string(),
            labels: sorted,
        }
    }

    fn sample(&self, value: i64, metric_type: MetricType) -> MetricSample {
        MetricSample {
            name: self.name.clone(),
            labels: self.labels.iter().cloned().collect(),
            value,
            metric_type,
        }
    }
}

/// Thread-safe in-memory metrics.
///
/// Lookups take a read lock; the write lock is only taken the first time a
/// key is seen.
#[derive(Default)]
pub struct MetricsRecorder {
    counters: RwLock<HashMap<MetricKey, AtomicU64>>,
    gauges: RwLock<HashMap<MetricKey, AtomicI64>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_counter(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        let key = MetricKey::new(name, labels);
        if let Some(c) = self.counters.read().get(&key) {
            c.fetch_add(n, Ordering::Relaxed);
            return;
        }
        self.counters
            .write()
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_gauge(&self, name: &str, labels: &[(&str, &str)], delta: i64) {
        let key = MetricKey::new(name, labels);
        if let Some(g) = self.gauges.read().get(&key) {
            g.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        self.gauges
            .write()
            .entry(key)
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: i64) {
        let key = MetricKey::new(name, labels);
        if let Some(g) = self.gauges.read().get(&key) {
            g.store(value, Ordering::Relaxed);
            return;
        }
        self.gauges
            .write()
            .entry(key)
            .or_insert_with(|| AtomicI64::new(0))
            .store(value, Ordering::Relaxed);
    }

    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = MetricKey::new(name, labels);
        self.counters
            .read()
            .get(&key)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> i64 {
        let key = MetricKey::new(name, labels);
        self.gauges
            .read()
            .get(&key)
            .map_or(0, |g| g.load(Ordering::Relaxed))
    }

    /// All metrics, sorted by name then labels.
    pub fn snapshot(&self) -> Vec<MetricSample> {
        let mut keyed: Vec<(MetricKey, MetricSample)> = Vec::new();
        for (key, c) in self.counters.read().iter() {
            let value = i64::try_from(c.load(Ordering::Relaxed)).unwrap_or(i64::MAX);
            keyed.push((key.clone(), key.sample(value, MetricType::Counter)));
        }
        for (key, g) in self.gauges.read().iter() {
            keyed.push((key.clone(), key.sample(g.load(Ordering::Relaxed), MetricType::Gauge)));
        }
        keyed.sort_by(|a, b| (&a.0.name, &a.0.labels).cmp(&(&b.0.name, &b.0.labels)));
        keyed.into_iter().map(|(_, s)| s).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counter_accumulates_per_label_set() {
        let m = MetricsRecorder::new();
        m.increment_counter("events_received", &[("event", "Login")], 1);
        m.increment_counter("events_received", &[("event", "Login")], 2);
        m.increment_counter("events_received", &[("event", "cancel_ride")], 1);
        assert_eq!(m.counter("events_received", &[("event", "Login")]), 3);
        assert_eq!(m.counter("events_received", &[("event", "cancel_ride")]), 1);
        assert_eq!(m.counter("events_received", &[]), 0);
    }

    #[test]
    fn label_order_does_not_matter() {
        let m = MetricsRecorder::new();
        m.increment_counter("x", &[("a", "1"), ("b", "2")], 1);
        m.increment_counter("x", &[("b", "2"), ("a", "1")], 1);
        assert_eq!(m.counter("x", &[("a", "1"), ("b", "2")]), 2);
    }

    #[test]
    fn gauge_moves_both_ways() {
        let m = MetricsRecorder::new();
        m.add_gauge("connections_open", &[], 3);
        m.add_gauge("connections_open", &[], -1);
        assert_eq!(m.gauge("connections_open", &[]), 2);
        m.set_gauge("connections_open", &[], 10);
        assert_eq!(m.gauge("connections_open", &[]), 10);
    }

    #[test]
    fn snapshot_is_sorted_and_typed() {
        let m = MetricsRecorder::new();
        m.add_gauge("users_online", &[], 1);
        m.increment_counter("frames_delivered", &[], 4);
        let snap = m.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].name, "frames_delivered");
        assert_eq!(snap[0].metric_type, MetricType::Counter);
        assert_eq!(snap[0].value, 4);
        assert_eq!(snap[1].metric_type, MetricType::Gauge);
    }

    #[test]
    fn concurrent_increments() {
        let m = Arc::new(MetricsRecorder::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&m);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        m.increment_counter("hits", &[], 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(m.counter("hits", &[]), 8000);
    }
}
