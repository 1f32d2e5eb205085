use serde::{Deserialize, Serialize};

use crate::stats::StatisticsSnapshot;
use crate::{Error, Result};

/// Absolute limits a load run must stay within.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdPolicy {
    pub p95_threshold_ms: f64,
    pub p99_threshold_ms: f64,
    pub max_error_rate: f64,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            p95_threshold_ms: 500.0,
            p99_threshold_ms: 1000.0,
            max_error_rate: 0.01,
        }
    }
}

impl ThresholdPolicy {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("p95_threshold_ms", self.p95_threshold_ms),
            ("p99_threshold_ms", self.p99_threshold_ms),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(Error::InvalidPolicy(format!(
                    "{name} must be a finite positive number, got {v}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.max_error_rate) {
            return Err(Error::InvalidPolicy(format!(
                "max_error_rate must be within [0, 1], got {}",
                self.max_error_rate
            )));
        }
        Ok(())
    }
}

/// Allowed drift relative to a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegressionPolicy {
    /// Fractional latency increase allowed for p95 and p99 (0.20 = 20%).
    pub max_latency_regression: f64,
    /// Absolute error-rate increase allowed (0.05 = five percentage points).
    pub max_error_rate_increase: f64,
}

impl Default for RegressionPolicy {
    fn default() -> Self {
        Self {
            max_latency_regression: 0.20,
            max_error_rate_increase: 0.05,
        }
    }
}

impl RegressionPolicy {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("max_latency_regression", self.max_latency_regression),
            ("max_error_rate_increase", self.max_error_rate_increase),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(Error::InvalidPolicy(format!(
                    "{name} must be a finite non-negative number, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// The subset of a results document a comparison needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub error_rate: f64,
}

impl BaselineRecord {
    /// A baseline is usable as a denominator: p95/p99 finite and positive,
    /// error rate finite.
    pub fn validate(&self) -> Result<()> {
        check_baseline("baseline", "p95_ms", self.p95_ms)?;
        check_baseline("baseline", "p99_ms", self.p99_ms)?;
        if !self.error_rate.is_finite() {
            return Err(Error::InvalidBaseline {
                which: "baseline",
                metric: "error_rate",
                value: self.error_rate,
            });
        }
        Ok(())
    }
}

impl From<&StatisticsSnapshot> for BaselineRecord {
    fn from(s: &StatisticsSnapshot) -> Self {
        Self {
            p95_ms: s.p95_ms,
            p99_ms: s.p99_ms,
            error_rate: s.error_rate,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Capacity {
    Healthy,
    AtCapacity,
    Overloaded,
}

impl Capacity {
    pub const AT_CAPACITY_ERROR_RATE: f64 = 0.01;
    pub const OVERLOADED_ERROR_RATE: f64 = 0.05;

    #[must_use]
    pub fn classify(error_rate: f64) -> Self {
        if error_rate < Self::AT_CAPACITY_ERROR_RATE {
            Self::Healthy
        } else if error_rate < Self::OVERLOADED_ERROR_RATE {
            Self::AtCapacity
        } else {
            Self::Overloaded
        }
    }

    #[must_use]
    pub fn headline(self) -> &'static str {
        match self {
            Self::Healthy => "service handled load well",
            Self::AtCapacity => "service at capacity",
            Self::Overloaded => "service overloaded",
        }
    }
}

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Verdict {
    pub passed: bool,
    /// One line per violated check; empty iff `passed`.
    pub reasons: Vec<String>,
    /// Notes that never affect `passed`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub advisories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<Capacity>,
}

impl Verdict {
    fn from_reasons(reasons: Vec<String>) -> Self {
        Self {
            passed: reasons.is_empty(),
            reasons,
            advisories: Vec::new(),
            capacity: None,
        }
    }
}

fn pct(v: f64) -> f64 {
    v * 100.0
}

fn threshold_reasons(snapshot: &StatisticsSnapshot, policy: &ThresholdPolicy) -> Vec<String> {
    let mut reasons = Vec::new();
    if snapshot.p95_ms > policy.p95_threshold_ms {
        reasons.push(format!(
            "p95 {:.2}ms exceeds {}ms",
            snapshot.p95_ms, policy.p95_threshold_ms
        ));
    }
    if snapshot.p99_ms > policy.p99_threshold_ms {
        reasons.push(format!(
            "p99 {:.2}ms exceeds {}ms",
            snapshot.p99_ms, policy.p99_threshold_ms
        ));
    }
    if snapshot.error_rate > policy.max_error_rate {
        reasons.push(format!(
            "error rate {:.2}% exceeds {}%",
            pct(snapshot.error_rate),
            pct(policy.max_error_rate)
        ));
    }
    reasons
}

/// Absolute mode. Every check runs; a verdict may carry several reasons.
#[must_use]
pub fn evaluate_thresholds(snapshot: &StatisticsSnapshot, policy: &ThresholdPolicy) -> Verdict {
    Verdict::from_reasons(threshold_reasons(snapshot, policy))
}

fn check_baseline(which: &'static str, metric: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidBaseline {
            which,
            metric,
            value,
        })
    }
}

fn check_current(metric: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidBaseline {
            which: "current",
            metric,
            value,
        })
    }
}

/// Relative mode.
///
/// Latency regression is `(current - baseline) / baseline`; the error-rate check
/// uses the absolute delta. A baseline p95/p99 that is zero, negative or
/// non-finite cannot serve as a denominator and is rejected.
pub fn evaluate_regression(
    current: &BaselineRecord,
    baseline: &BaselineRecord,
    policy: &RegressionPolicy,
) -> Result<Verdict> {
    baseline.validate()?;
    check_current("p95_ms", current.p95_ms)?;
    check_current("p99_ms", current.p99_ms)?;
    check_current("error_rate", current.error_rate)?;

    let mut reasons = Vec::new();

    let p95 = (current.p95_ms - baseline.p95_ms) / baseline.p95_ms;
    if p95 > policy.max_latency_regression {
        reasons.push(format!(
            "p95 regression: {:.1}% (baseline: {}ms, current: {}ms)",
            pct(p95),
            baseline.p95_ms,
            current.p95_ms
        ));
    }

    let p99 = (current.p99_ms - baseline.p99_ms) / baseline.p99_ms;
    if p99 > policy.max_latency_regression {
        reasons.push(format!(
            "p99 regression: {:.1}% (baseline: {}ms, current: {}ms)",
            pct(p99),
            baseline.p99_ms,
            current.p99_ms
        ));
    }

    let error_delta = current.error_rate - baseline.error_rate;
    if error_delta > policy.max_error_rate_increase {
        reasons.push(format!("Error rate increased by {:.2}%", pct(error_delta)));
    }

    Ok(Verdict::from_reasons(reasons))
}

/// Stress mode never fails: limit breaches become advisories next to the
/// capacity classification.
#[must_use]
pub fn evaluate_stress(snapshot: &StatisticsSnapshot, policy: &ThresholdPolicy) -> Verdict {
    let mut advisories = Vec::new();
    if snapshot.p99_ms > policy.p99_threshold_ms {
        advisories.push(format!(
            "high p99 latency: {:.2}ms (> {}ms SLA)",
            snapshot.p99_ms, policy.p99_threshold_ms
        ));
    }
    if snapshot.p95_ms > policy.p95_threshold_ms {
        advisories.push(format!(
            "high p95 latency: {:.2}ms (> {}ms SLA)",
            snapshot.p95_ms, policy.p95_threshold_ms
        ));
    }

    Verdict {
        passed: true,
        reasons: Vec::new(),
        advisories,
        capacity: Some(Capacity::classify(snapshot.error_rate)),
    }
}

/// Everything decided about a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub thresholds: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regression: Option<Verdict>,
}

impl Evaluation {
    /// Post-run evaluation. `stress` switches the threshold pass to advisory
    /// mode and turns regression failures into advisories as well.
    pub fn run(
        snapshot: &StatisticsSnapshot,
        stress: bool,
        thresholds: &ThresholdPolicy,
        baseline: Option<(&BaselineRecord, &RegressionPolicy)>,
    ) -> Result<Self> {
        let thresholds_verdict = if stress {
            evaluate_stress(snapshot, thresholds)
        } else {
            evaluate_thresholds(snapshot, thresholds)
        };

        let regression = match baseline {
            None => None,
            Some((baseline, policy)) => {
                let mut v = evaluate_regression(&BaselineRecord::from(snapshot), baseline, policy)?;
                if stress && !v.passed {
                    v.advisories.append(&mut v.reasons);
                    v.passed = true;
                }
                Some(v)
            }
        };

        Ok(Self {
            thresholds: thresholds_verdict,
            regression,
        })
    }

    #[must_use]
    pub fn thresholds_failed(&self) -> bool {
        !self.thresholds.passed
    }

    #[must_use]
    pub fn regression_failed(&self) -> bool {
        self.regression.as_ref().is_some_and(|v| !v.passed)
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        !self.thresholds_failed() && !self.regression_failed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(p95: f64, p99: f64, error_rate: f64) -> StatisticsSnapshot {
        StatisticsSnapshot {
            p95_ms: p95,
            p99_ms: p99,
            error_rate,
            ..StatisticsSnapshot::default()
        }
    }

    fn record(p95: f64, p99: f64, error_rate: f64) -> BaselineRecord {
        BaselineRecord {
            p95_ms: p95,
            p99_ms: p99,
            error_rate,
        }
    }

    #[test]
    fn thresholds_report_every_violation() {
        let v = evaluate_thresholds(&snapshot(600.0, 900.0, 0.02), &ThresholdPolicy::default());
        assert!(!v.passed);
        assert_eq!(v.reasons.len(), 2, "{:?}", v.reasons);
        assert!(v.reasons[0].starts_with("p95 "));
        assert!(v.reasons[1].starts_with("error rate "));
    }

    #[test]
    fn thresholds_are_strict_inequalities() {
        let v = evaluate_thresholds(&snapshot(500.0, 1000.0, 0.01), &ThresholdPolicy::default());
        assert!(v.passed);
        assert!(v.reasons.is_empty());
    }

    #[test]
    fn all_three_thresholds_can_fail_together() {
        let v = evaluate_thresholds(&snapshot(501.0, 1001.0, 0.5), &ThresholdPolicy::default());
        assert_eq!(v.reasons.len(), 3);
    }

    #[test]
    fn regression_threshold_decides() {
        let baseline = record(100.0, 200.0, 0.0);
        let current = record(125.0, 200.0, 0.0);

        let strict = RegressionPolicy {
            max_latency_regression: 0.20,
            ..RegressionPolicy::default()
        };
        let v = match evaluate_regression(&current, &baseline, &strict) {
            Ok(v) => v,
            Err(e) => panic!("unexpected error: {e}"),
        };
        assert!(!v.passed);
        assert_eq!(
            v.reasons,
            vec!["p95 regression: 25.0% (baseline: 100ms, current: 125ms)".to_string()]
        );

        let loose = RegressionPolicy {
            max_latency_regression: 0.30,
            ..RegressionPolicy::default()
        };
        let v = match evaluate_regression(&current, &baseline, &loose) {
            Ok(v) => v,
            Err(e) => panic!("unexpected error: {e}"),
        };
        assert!(v.passed);
    }

    #[test]
    fn error_rate_delta_is_absolute() {
        let v = match evaluate_regression(
            &record(100.0, 200.0, 0.07),
            &record(100.0, 200.0, 0.01),
            &RegressionPolicy::default(),
        ) {
            Ok(v) => v,
            Err(e) => panic!("unexpected error: {e}"),
        };
        assert_eq!(v.reasons, vec!["Error rate increased by 6.00%".to_string()]);
    }

    #[test]
    fn improvements_pass() {
        let v = match evaluate_regression(
            &record(50.0, 80.0, 0.0),
            &record(100.0, 200.0, 0.02),
            &RegressionPolicy::default(),
        ) {
            Ok(v) => v,
            Err(e) => panic!("unexpected error: {e}"),
        };
        assert!(v.passed);
    }

    #[test]
    fn zero_baseline_is_a_configuration_error() {
        let err = evaluate_regression(
            &record(10.0, 20.0, 0.0),
            &record(0.0, 200.0, 0.0),
            &RegressionPolicy::default(),
        );
        assert!(matches!(
            err,
            Err(Error::InvalidBaseline {
                which: "baseline",
                metric: "p95_ms",
                ..
            })
        ));

        let err = evaluate_regression(
            &record(10.0, 20.0, 0.0),
            &record(100.0, f64::NAN, 0.0),
            &RegressionPolicy::default(),
        );
        assert!(matches!(
            err,
            Err(Error::InvalidBaseline {
                metric: "p99_ms",
                ..
            })
        ));
    }

    #[test]
    fn capacity_bands() {
        assert_eq!(Capacity::classify(0.008), Capacity::Healthy);
        assert_eq!(Capacity::classify(0.01), Capacity::AtCapacity);
        assert_eq!(Capacity::classify(0.03), Capacity::AtCapacity);
        assert_eq!(Capacity::classify(0.05), Capacity::Overloaded);
        assert_eq!(Capacity::classify(0.12), Capacity::Overloaded);
        assert_eq!(Capacity::AtCapacity.to_string(), "at-capacity");
    }

    #[test]
    fn stress_never_fails() {
        let v = evaluate_stress(&snapshot(900.0, 4000.0, 0.4), &ThresholdPolicy::default());
        assert!(v.passed);
        assert!(v.reasons.is_empty());
        assert_eq!(v.advisories.len(), 2);
        assert_eq!(v.capacity, Some(Capacity::Overloaded));
    }

    #[test]
    fn stress_regression_is_advisory() {
        let s = snapshot(300.0, 400.0, 0.0);
        let baseline = record(100.0, 200.0, 0.0);
        let policy = RegressionPolicy::default();
        let thresholds = ThresholdPolicy::default();
        let against = Some((&baseline, &policy));

        let e = match Evaluation::run(&s, true, &thresholds, against) {
            Ok(e) => e,
            Err(err) => panic!("unexpected error: {err}"),
        };
        assert!(e.passed());
        let r = e.regression.unwrap_or_default();
        assert_eq!(r.advisories.len(), 2);

        let e = match Evaluation::run(&s, false, &thresholds, against) {
            Ok(e) => e,
            Err(err) => panic!("unexpected error: {err}"),
        };
        assert!(!e.thresholds_failed());
        assert!(e.regression_failed());
    }

    #[test]
    fn policies_validate() {
        assert!(ThresholdPolicy::default().validate().is_ok());
        assert!(RegressionPolicy::default().validate().is_ok());
        let bad = ThresholdPolicy {
            max_error_rate: 1.5,
            ..ThresholdPolicy::default()
        };
        assert!(bad.validate().is_err());
        let bad = RegressionPolicy {
            max_latency_regression: -0.1,
            ..RegressionPolicy::default()
        };
        assert!(bad.validate().is_err());
    }
}
