use std::fmt::Write as _;

use ingestbench_core::{Evaluation, Verdict};

use super::format::*;
use crate::output::RunOutcome;

pub(crate) fn render(outcome: &RunOutcome<'_>) -> String {
    let mut out = String::new();
    let report = outcome.report;
    let s = &report.snapshot;

    out.push_str("summary\n");
    writeln!(&mut out, "scenario: {}", outcome.scenario).ok();
    writeln!(
        &mut out,
        "  requests: {} (ok {}, failed {})",
        s.total_requests,
        s.successful_requests(),
        s.failed_requests
    )
    .ok();
    writeln!(&mut out, "  error rate: {}", format_percent(s.error_rate)).ok();
    writeln!(
        &mut out,
        "  rps: {:.2} over {}",
        s.rps,
        format_elapsed(s.elapsed())
    )
    .ok();

    if s.total_requests > 0 {
        writeln!(
            out,
            "  latency = p50={} p95={} p99={} p99.9={} mean={} max={}",
            format_ms(s.p50_ms),
            format_ms(s.p95_ms),
            format_ms(s.p99_ms),
            format_ms(s.p999_ms),
            format_ms(s.mean_ms),
            format_ms(s.max_ms),
        )
        .ok();
    } else {
        out.push_str("  latency: n/a\n");
    }

    writeln!(
        &mut out,
        "  users: started {} peak {}",
        report.users_started, report.peak_active_users
    )
    .ok();
    writeln!(&mut out, "  iterations: {}", report.iterations_started).ok();

    if report.setup_failures > 0 {
        writeln!(&mut out, "  setup failures: {}", report.setup_failures).ok();
    }
    if report.teardown_failures > 0 {
        writeln!(&mut out, "  teardown failures: {}", report.teardown_failures).ok();
    }
    if report.abandoned_iterations > 0 {
        writeln!(
            &mut out,
            "  abandoned iterations: {}",
            report.abandoned_iterations
        )
        .ok();
    }

    if !s.patterns.is_empty() {
        out.push_str("patterns\n");
        for p in &s.patterns {
            writeln!(&mut out, "  {}: {} (failed {})", p.pattern, p.total, p.failed).ok();
        }
    }

    if !s.failures.is_empty() {
        out.push_str("failures\n");
        for (detail, count) in &s.failures {
            writeln!(&mut out, "  {detail}: {count}").ok();
        }
    }

    writeln!(&mut out, "results: {}", outcome.results_path.display()).ok();
    out.push('\n');

    render_evaluation(outcome.evaluation, &mut out);
    out
}

fn render_evaluation(evaluation: &Evaluation, out: &mut String) {
    render_verdict("thresholds", &evaluation.thresholds, out);
    if let Some(regression) = &evaluation.regression {
        render_verdict("baseline", regression, out);
    }
}

fn render_verdict(label: &str, v: &Verdict, out: &mut String) {
    if v.passed {
        writeln!(out, "{label}: passed").ok();
    } else {
        writeln!(out, "{label}: failed ({})", v.reasons.len()).ok();
    }
    for note in &v.advisories {
        writeln!(out, "  note: {note}").ok();
    }
    if let Some(capacity) = v.capacity {
        writeln!(out, "  capacity: {capacity} ({})", capacity.headline()).ok();
    }
}
