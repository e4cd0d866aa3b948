//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

//! Observability counters, read by the HTTP health endpoint. Mirrors the
//! per-session `AtomicU64` counters the teacher daemon keeps for its own
//! state tree, generalized from per-session to per-interface.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters, safe to share behind an `Arc` across tasks.
#[derive(Debug, Default)]
pub struct Metrics {
    send_success: Mutex<HashMap<String, AtomicU64>>,
    send_failure: Mutex<HashMap<String, AtomicU64>>,
    join_failure: Mutex<HashMap<String, AtomicU64>>,
    decode_failure: AtomicU64,
    write_failure: AtomicU64,
}

fn bump(map: &Mutex<HashMap<String, AtomicU64>>, key: &str) {
    let mut guard = map.lock().unwrap();
    guard
        .entry(key.to_string())
        .or_insert_with(|| AtomicU64::new(0))
        .fetch_add(1, Ordering::Relaxed);
}

fn snapshot(map: &Mutex<HashMap<String, AtomicU64>>) -> HashMap<String, u64> {
    map.lock()
        .unwrap()
        .iter()
        .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
        .collect()
}

impl Metrics {
    pub fn new() -> Metrics {
        Metrics::default()
    }

    pub fn record_send_success(&self, interface: &str) {
        bump(&self.send_success, interface);
    }

    pub fn record_send_failure(&self, interface: &str) {
        bump(&self.send_failure, interface);
    }

    pub fn record_join_failure(&self, interface: &str) {
        bump(&self.join_failure, interface);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failure.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot suitable for JSON serialization.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            send_success: snapshot(&self.send_success),
            send_failure: snapshot(&self.send_failure),
            join_failure: snapshot(&self.join_failure),
            decode_failure: self.decode_failure.load(Ordering::Relaxed),
            write_failure: self.write_failure.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub send_success: HashMap<String, u64>,
    pub send_failure: HashMap<String, u64>,
    pub join_failure: HashMap<String, u64>,
    pub decode_failure: u64,
    pub write_failure: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_per_interface() {
        let metrics = Metrics::new();
        metrics.record_send_success("e0");
        metrics.record_send_success("e0");
        metrics.record_send_failure("e1");
        metrics.record_decode_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.send_success.get("e0"), Some(&2));
        assert_eq!(snapshot.send_failure.get("e1"), Some(&1));
        assert_eq!(snapshot.decode_failure, 1);
    }
}
