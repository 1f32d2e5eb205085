use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use crate::outcome::RequestOutcome;

/// Histogram range: 1µs .. 1h, 3 significant digits (≤0.1% relative error).
const LATENCY_LOW_US: u64 = 1;
const LATENCY_HIGH_US: u64 = 3_600_000_000;
const LATENCY_SIGFIG: u8 = 3;

/// Distinct failure details tracked before the rest are lumped together.
const MAX_FAILURE_KINDS: usize = 32;
const OTHER_FAILURES: &str = "other";

#[derive(Debug, Clone, Copy, Default)]
struct PatternCounts {
    total: u64,
    failed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternStats {
    pub pattern: String,
    pub total: u64,
    pub failed: u64,
}

/// Read-only view of the collector at one instant.
///
/// Every field comes from the same critical section, so `error_rate` always
/// equals `failed_requests / total_requests` and the percentiles cover exactly
/// `total_requests` samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub error_rate: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub p999_ms: f64,
    pub mean_ms: f64,
    pub max_ms: f64,
    pub rps: f64,
    pub elapsed_secs: f64,
    pub patterns: Vec<PatternStats>,
    /// Failure details by count, most frequent first.
    pub failures: Vec<(String, u64)>,
}

impl StatisticsSnapshot {
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.elapsed_secs.max(0.0))
    }

    #[must_use]
    pub fn successful_requests(&self) -> u64 {
        self.total_requests.saturating_sub(self.failed_requests)
    }
}

#[derive(Debug)]
struct Aggregate {
    latency_us: Histogram<u64>,
    total: u64,
    failed: u64,
    latency_sum_us: u128,
    max_us: u64,
    by_pattern: BTreeMap<Arc<str>, PatternCounts>,
    failures: BTreeMap<String, u64>,
    started: Option<Instant>,
    ended: Option<Instant>,
}

/// Thread-safe aggregation of request outcomes.
///
/// One lock guards the whole aggregate: writers never interleave with a
/// snapshot, and every outcome is counted exactly once.
#[derive(Debug)]
pub struct StatsCollector {
    inner: Mutex<Aggregate>,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector {
    #[must_use]
    pub fn new() -> Self {
        let latency_us =
            Histogram::<u64>::new_with_bounds(LATENCY_LOW_US, LATENCY_HIGH_US, LATENCY_SIGFIG)
                .unwrap_or_else(|err| panic!("failed to init histogram: {err}"));

        Self {
            inner: Mutex::new(Aggregate {
                latency_us,
                total: 0,
                failed: 0,
                latency_sum_us: 0,
                max_us: 0,
                by_pattern: BTreeMap::new(),
                failures: BTreeMap::new(),
                started: None,
                ended: None,
            }),
        }
    }

    /// Marks the start of the measured window; throughput is computed from here.
    pub fn start_at(&self, started: Instant) {
        let mut inner = self.inner.lock();
        inner.started.get_or_insert(started);
    }

    /// Freezes the measured window so later snapshots report a stable throughput.
    pub fn finish_at(&self, ended: Instant) {
        let mut inner = self.inner.lock();
        inner.ended.get_or_insert(ended);
    }

    pub fn record(&self, outcome: &RequestOutcome) {
        let us = u64::try_from(outcome.latency.as_micros())
            .unwrap_or(u64::MAX)
            .clamp(LATENCY_LOW_US, LATENCY_HIGH_US);

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.latency_us.saturating_record(us);
        inner.total = inner.total.saturating_add(1);
        inner.latency_sum_us = inner.latency_sum_us.saturating_add(u128::from(us));
        inner.max_us = inner.max_us.max(us);

        let counts = inner.by_pattern.entry(outcome.pattern.clone()).or_default();
        counts.total = counts.total.saturating_add(1);

        if !outcome.success {
            counts.failed = counts.failed.saturating_add(1);
            inner.failed = inner.failed.saturating_add(1);

            let detail = outcome.failure.as_deref().unwrap_or("unknown failure");
            let key = if inner.failures.contains_key(detail)
                || inner.failures.len() < MAX_FAILURE_KINDS
            {
                detail
            } else {
                OTHER_FAILURES
            };
            match inner.failures.get_mut(key) {
                Some(n) => *n = n.saturating_add(1),
                None => {
                    inner.failures.insert(key.to_string(), 1);
                }
            }
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> StatisticsSnapshot {
        self.snapshot_at(Instant::now())
    }

    #[must_use]
    pub fn snapshot_at(&self, now: Instant) -> StatisticsSnapshot {
        let inner = self.inner.lock();

        let elapsed = match inner.started {
            Some(started) => inner.ended.unwrap_or(now).saturating_duration_since(started),
            None => Duration::ZERO,
        };
        let elapsed_secs = elapsed.as_secs_f64();

        let total = inner.total;
        let (error_rate, mean_ms) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                inner.failed as f64 / total as f64,
                inner.latency_sum_us as f64 / total as f64 / 1000.0,
            )
        };
        let rps = if elapsed_secs > 0.0 {
            total as f64 / elapsed_secs
        } else {
            0.0
        };

        let quantile_ms = |q: f64| -> f64 {
            if total == 0 {
                0.0
            } else {
                inner.latency_us.value_at_quantile(q) as f64 / 1000.0
            }
        };

        let patterns = inner
            .by_pattern
            .iter()
            .map(|(name, c)| PatternStats {
                pattern: name.to_string(),
                total: c.total,
                failed: c.failed,
            })
            .collect();

        let mut failures: Vec<(String, u64)> = inner
            .failures
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        failures.sort_by(|(a_name, a), (b_name, b)| b.cmp(a).then_with(|| a_name.cmp(b_name)));

        StatisticsSnapshot {
            total_requests: total,
            failed_requests: inner.failed,
            error_rate,
            p50_ms: quantile_ms(0.50),
            p95_ms: quantile_ms(0.95),
            p99_ms: quantile_ms(0.99),
            p999_ms: quantile_ms(0.999),
            mean_ms,
            max_ms: inner.max_us as f64 / 1000.0,
            rps,
            elapsed_secs,
            patterns,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(pattern: &str, ms: u64) -> RequestOutcome {
        RequestOutcome::success(Arc::from(pattern), Duration::from_millis(ms))
    }

    fn failed(pattern: &str, ms: u64, detail: &str) -> RequestOutcome {
        RequestOutcome::failure(Arc::from(pattern), Duration::from_millis(ms), detail)
    }

    #[test]
    fn empty_collector_reports_zeroes() {
        let s = StatsCollector::new().snapshot();
        assert_eq!(s.total_requests, 0);
        assert_eq!(s.error_rate, 0.0);
        assert_eq!(s.p99_ms, 0.0);
        assert_eq!(s.rps, 0.0);
    }

    #[test]
    fn error_rate_is_failed_over_total() {
        let c = StatsCollector::new();
        for i in 0..97 {
            c.record(&ok("a", i % 10 + 1));
        }
        for _ in 0..3 {
            c.record(&failed("a", 5, "status 503"));
        }

        let s = c.snapshot();
        assert_eq!(s.total_requests, 100);
        assert_eq!(s.failed_requests, 3);
        assert!((s.error_rate - 0.03).abs() < 1e-12);
        assert_eq!(s.failures, vec![("status 503".to_string(), 3)]);
        assert_eq!(
            s.patterns,
            vec![PatternStats {
                pattern: "a".to_string(),
                total: 100,
                failed: 3
            }]
        );
    }

    #[test]
    fn percentiles_are_monotone_and_within_precision() {
        let c = StatsCollector::new();
        for ms in 1..=1000 {
            c.record(&ok("a", ms));
        }

        let s = c.snapshot();
        assert!(s.p50_ms <= s.p95_ms);
        assert!(s.p95_ms <= s.p99_ms);
        assert!(s.p99_ms <= s.p999_ms);
        assert!(s.p999_ms <= s.max_ms + s.max_ms * 0.001);

        for (got, want) in [(s.p50_ms, 500.0), (s.p95_ms, 950.0), (s.p99_ms, 990.0)] {
            assert!(
                (got - want).abs() / want <= 0.001 + 1e-9,
                "got {got} want {want}"
            );
        }
        assert_eq!(s.max_ms, 1000.0);
        assert!((s.mean_ms - 500.5).abs() < 1e-9);
    }

    #[test]
    fn failures_count_toward_percentiles() {
        let c = StatsCollector::new();
        c.record(&ok("a", 1));
        c.record(&failed("a", 2000, "timeout: http request timed out after 2s"));

        let s = c.snapshot();
        assert!(s.max_ms >= 2000.0);
        assert!(s.p99_ms > 1000.0);
    }

    #[test]
    fn failure_details_are_bounded() {
        let c = StatsCollector::new();
        for i in 0..(MAX_FAILURE_KINDS + 10) {
            c.record(&failed("a", 1, &format!("status {i}")));
        }

        let s = c.snapshot();
        assert_eq!(s.failures.len(), MAX_FAILURE_KINDS + 1);
        let other = s
            .failures
            .iter()
            .find(|(k, _)| k == OTHER_FAILURES)
            .map(|(_, v)| *v);
        assert_eq!(other, Some(10));
        assert_eq!(
            s.failures.iter().map(|(_, v)| *v).sum::<u64>(),
            s.failed_requests
        );
    }

    #[test]
    fn sub_microsecond_latency_counts_as_one_microsecond() {
        let c = StatsCollector::new();
        c.record(&RequestOutcome::success(Arc::from("a"), Duration::ZERO));
        let s = c.snapshot();
        assert_eq!(s.total_requests, 1);
        assert!((s.max_ms - 0.001).abs() < 1e-12);
    }

    #[test]
    fn throughput_uses_frozen_window() {
        let c = StatsCollector::new();
        let t0 = Instant::now();
        c.start_at(t0);
        for _ in 0..20 {
            c.record(&ok("a", 1));
        }
        c.finish_at(t0 + Duration::from_secs(2));

        let s = c.snapshot_at(t0 + Duration::from_secs(60));
        assert!((s.rps - 10.0).abs() < 1e-9);
        assert!((s.elapsed_secs - 2.0).abs() < 1e-9);
    }

    #[test]
    fn concurrent_writers_are_each_counted_once() {
        let c = Arc::new(StatsCollector::new());
        let threads = 8;
        let per_thread = 5_000;

        std::thread::scope(|scope| {
            for t in 0..threads {
                let c = c.clone();
                scope.spawn(move || {
                    for i in 0..per_thread {
                        if i % 10 == 0 {
                            c.record(&failed("b", 2, "status 500"));
                        } else {
                            c.record(&ok("a", (i % 50 + t) as u64 + 1));
                        }
                    }
                });
            }

            // Snapshots taken while writers run must stay self-consistent.
            for _ in 0..100 {
                let s = c.snapshot();
                let expected = if s.total_requests == 0 {
                    0.0
                } else {
                    s.failed_requests as f64 / s.total_requests as f64
                };
                assert_eq!(s.error_rate, expected);
                assert!((0.0..=1.0).contains(&s.error_rate));
                let per_pattern: u64 = s.patterns.iter().map(|p| p.total).sum();
                assert_eq!(per_pattern, s.total_requests);
            }
        });

        let s = c.snapshot();
        assert_eq!(s.total_requests, (threads * per_thread) as u64);
        assert_eq!(s.failed_requests, (threads * per_thread / 10) as u64);
    }
}
