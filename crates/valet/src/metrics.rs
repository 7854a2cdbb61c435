// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use pulse::Clock;
use serde::Serialize;

/// One completed attempt of one operation.
///
/// Samples are append-only: once recorded they are never mutated, and pruning to the
/// retention window is the only removal path.
#[derive(Debug, Clone)]
pub struct OperationSample {
    /// The operation name.
    pub operation: String,

    /// Wall time of the attempt.
    pub duration: Duration,

    /// Whether the attempt succeeded.
    pub success: bool,

    /// Whether the result came from the cache (such samples have `attempt == 0`).
    pub cache_hit: bool,

    /// 1-based attempt number; 0 for samples that did not reach the backend.
    pub attempt: u32,

    /// When the attempt completed.
    pub timestamp: SystemTime,
}

/// Aggregates derived from the retained sample window, computed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Samples currently retained.
    pub operation_count: usize,

    /// Successful samples in the window.
    pub success_count: usize,

    /// Failed samples in the window.
    pub error_count: usize,

    /// Mean latency over the window.
    pub average_latency: Duration,

    /// 95th percentile latency.
    pub p95_latency: Duration,

    /// 99th percentile latency.
    pub p99_latency: Duration,

    /// Samples per second of retention window.
    pub throughput: f64,

    /// Fraction of samples served from the cache.
    pub cache_hit_rate: f64,

    /// Fraction of callers that attached to an existing flight instead of
    /// launching their own.
    pub deduplication_rate: f64,

    /// Named gauges reported by the embedding application.
    pub custom: HashMap<String, f64>,
}

/// Collects per-attempt samples in a rolling window and serves aggregates on read.
///
/// Nothing is pre-aggregated: every statistic is recomputed from the retained samples
/// when a snapshot is taken, so a snapshot is always internally consistent.
#[derive(Debug)]
pub(crate) struct MetricsCollector {
    clock: Clock,
    window: Duration,
    inner: Mutex<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    samples: VecDeque<OperationSample>,
    custom: HashMap<String, f64>,
}

impl MetricsCollector {
    /// Default retention window.
    pub(crate) const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);

    pub(crate) fn new(clock: &Clock, window: Duration) -> Self {
        Self {
            clock: clock.clone(),
            window,
            inner: Mutex::new(MetricsInner::default()),
        }
    }

    /// Appends one sample stamped with the current time.
    pub(crate) fn record(&self, operation: &str, duration: Duration, success: bool, cache_hit: bool, attempt: u32) {
        let sample = OperationSample {
            operation: operation.to_owned(),
            duration,
            success,
            cache_hit,
            attempt,
            timestamp: self.clock.system_time(),
        };

        self.inner.lock().samples.push_back(sample);
    }

    /// Drops samples older than the retention window; returns how many were dropped.
    pub(crate) fn prune(&self) -> usize {
        let now = self.clock.system_time();
        let mut inner = self.inner.lock();

        let before = inner.samples.len();
        while let Some(front) = inner.samples.front() {
            let age = now.duration_since(front.timestamp).unwrap_or(Duration::ZERO);
            if age <= self.window {
                break;
            }
            inner.samples.pop_front();
        }
        before - inner.samples.len()
    }

    /// Sets a named custom gauge, surfaced verbatim in snapshots.
    pub(crate) fn set_custom(&self, name: &str, value: f64) {
        let _ = self.inner.lock().custom.insert(name.to_owned(), value);
    }

    /// Number of samples currently retained (after pruning).
    pub(crate) fn sample_count(&self) -> usize {
        let _ = self.prune();
        self.inner.lock().samples.len()
    }

    /// Fraction of retained samples that failed.
    pub(crate) fn error_rate(&self) -> f64 {
        let _ = self.prune();
        let inner = self.inner.lock();

        if inner.samples.is_empty() {
            return 0.0;
        }

        let errors = inner.samples.iter().filter(|s| !s.success).count();
        to_f64(errors) / to_f64(inner.samples.len())
    }

    /// Computes every aggregate from the retained window.
    ///
    /// `dedup` is the flight deck's `(led, joined)` counter pair.
    pub(crate) fn snapshot(&self, dedup: (u64, u64)) -> MetricsSnapshot {
        let _ = self.prune();
        let inner = self.inner.lock();
        let samples = &inner.samples;

        let success_count = samples.iter().filter(|s| s.success).count();
        let error_count = samples.len() - success_count;
        let cache_hits = samples.iter().filter(|s| s.cache_hit).count();

        let mut durations: Vec<Duration> = samples.iter().map(|s| s.duration).collect();
        durations.sort_unstable();

        let total: Duration = durations.iter().sum();
        let average_latency = if durations.is_empty() {
            Duration::ZERO
        } else {
            total / u32::try_from(durations.len()).unwrap_or(u32::MAX)
        };

        let (led, joined) = dedup;
        let dedup_total = led + joined;

        MetricsSnapshot {
            operation_count: samples.len(),
            success_count,
            error_count,
            average_latency,
            p95_latency: percentile(&durations, 95),
            p99_latency: percentile(&durations, 99),
            throughput: to_f64(samples.len()) / self.window.as_secs_f64(),
            cache_hit_rate: if samples.is_empty() {
                0.0
            } else {
                to_f64(cache_hits) / to_f64(samples.len())
            },
            deduplication_rate: if dedup_total == 0 {
                0.0
            } else {
                joined_ratio(joined, dedup_total)
            },
            custom: inner.custom.clone(),
        }
    }

    /// Forgets every sample and custom gauge.
    pub(crate) fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.samples.clear();
        inner.custom.clear();
    }
}

/// Nearest-rank percentile over an ascending-sorted slice.
fn percentile(sorted: &[Duration], percent: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }

    let rank = (sorted.len() * percent).div_ceil(100).clamp(1, sorted.len());
    sorted.get(rank - 1).copied().unwrap_or(Duration::ZERO)
}

fn joined_ratio(joined: u64, total: u64) -> f64 {
    let joined = u32::try_from(joined.min(u64::from(u32::MAX))).unwrap_or(u32::MAX);
    let total = u32::try_from(total.min(u64::from(u32::MAX))).unwrap_or(u32::MAX);
    f64::from(joined) / f64::from(total)
}

fn to_f64(n: usize) -> f64 {
    // Sample counts stay far below 2^52; the conversion is lossless in practice.
    u32::try_from(n).map_or(f64::from(u32::MAX), f64::from)
}
