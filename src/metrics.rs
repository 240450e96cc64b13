// SPDX-License-Identifier: Apache-2.0

//! Lightweight in-process dispatch metrics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

#[derive(Default)]
struct DispatchMetrics {
    partitions: AtomicU64,
    workers: AtomicU64,
    worker_failures: AtomicU64,
    routing_failures: AtomicU64,
    memo_hits: AtomicU64,
    duration_total_ms: AtomicU64,
    duration_max_ms: AtomicU64,
}

static DISPATCH_METRICS: OnceLock<DispatchMetrics> = OnceLock::new();

fn metrics() -> &'static DispatchMetrics {
    DISPATCH_METRICS.get_or_init(DispatchMetrics::default)
}

/// One barrier joined: `partitions` tops over `workers` driver tasks.
pub fn record_dispatch(partitions: usize, workers: usize, failures: usize, duration_ms: f64) {
    let duration_ms = duration_ms.max(0.0) as u64;
    let metrics = metrics();
    metrics
        .partitions
        .fetch_add(partitions as u64, Ordering::Relaxed);
    metrics.workers.fetch_add(workers as u64, Ordering::Relaxed);
    metrics
        .worker_failures
        .fetch_add(failures as u64, Ordering::Relaxed);
    metrics
        .duration_total_ms
        .fetch_add(duration_ms, Ordering::Relaxed);
    metrics
        .duration_max_ms
        .fetch_max(duration_ms, Ordering::Relaxed);
}

pub fn record_routing_failure() {
    metrics().routing_failures.fetch_add(1, Ordering::Relaxed);
}

pub fn record_memo_hit() {
    metrics().memo_hits.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchMetricsSnapshot {
    pub partitions: u64,
    pub workers: u64,
    pub worker_failures: u64,
    pub routing_failures: u64,
    pub memo_hits: u64,
    pub avg_ms: Option<f64>,
    pub max_ms: Option<u64>,
}

pub fn snapshot() -> DispatchMetricsSnapshot {
    let metrics = metrics();
    let partitions = metrics.partitions.load(Ordering::Relaxed);
    let duration_total = metrics.duration_total_ms.load(Ordering::Relaxed);
    let max_ms = metrics.duration_max_ms.load(Ordering::Relaxed);

    let avg_ms = if partitions > 0 {
        Some(duration_total as f64 / partitions as f64)
    } else {
        None
    };

    DispatchMetricsSnapshot {
        partitions,
        workers: metrics.workers.load(Ordering::Relaxed),
        worker_failures: metrics.worker_failures.load(Ordering::Relaxed),
        routing_failures: metrics.routing_failures.load(Ordering::Relaxed),
        memo_hits: metrics.memo_hits.load(Ordering::Relaxed),
        avg_ms,
        max_ms: if max_ms > 0 { Some(max_ms) } else { None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_flow() {
        // Other tests dispatch concurrently, compare deltas only.
        let initial = snapshot();

        record_dispatch(2, 3, 1, 10.0);
        let s1 = snapshot();
        assert!(s1.partitions >= initial.partitions + 2);
        assert!(s1.workers >= initial.workers + 3);
        assert!(s1.worker_failures >= initial.worker_failures + 1);

        record_routing_failure();
        record_memo_hit();
        let s2 = snapshot();
        assert!(s2.routing_failures >= initial.routing_failures + 1);
        assert!(s2.memo_hits >= initial.memo_hits + 1);

        record_dispatch(1, 1, 0, 99999.0);
        assert!(snapshot().max_ms.unwrap() >= 99999);
    }
}
