use serde::Serialize;
use std::io::Write as _;
use std::sync::Arc;

use ingestbench_core::runner::{ProgressFn, ProgressUpdate, RunConfig, RunReport};
use ingestbench_core::{Evaluation, StatisticsSnapshot};

use super::{OutputFormatter, RunOutcome};

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _scenario: &str, _ingest_url: &str, _cfg: &RunConfig) {}

    fn progress(&self) -> Option<ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, outcome: &RunOutcome<'_>) -> anyhow::Result<()> {
        let line = build_summary_line(outcome);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonStage {
    pub stage: usize,
    pub stages: usize,
    pub stage_remaining_secs: f64,
    pub current_target: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: u64,
    pub active_users: u64,
    pub target_users: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<JsonStage>,

    pub requests_per_sec: f64,
    pub error_rate_now: f64,

    pub total_requests: u64,
    pub failed_requests: u64,
    pub error_rate: f64,
    pub rps: f64,

    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    let s = &u.snapshot;
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs(),
        active_users: u.active_users,
        target_users: u.target_users,
        stage: u.stage.as_ref().map(|st| JsonStage {
            stage: st.stage,
            stages: st.stages,
            stage_remaining_secs: st.stage_remaining.as_secs_f64(),
            current_target: st.current_target,
        }),

        requests_per_sec: u.rps_now,
        error_rate_now: u.error_rate_now,

        total_requests: s.total_requests,
        failed_requests: s.failed_requests,
        error_rate: s.error_rate,
        rps: s.rps,

        p50_ms: s.p50_ms,
        p95_ms: s.p95_ms,
        p99_ms: s.p99_ms,
        max_ms: s.max_ms,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonRunTotals {
    pub users_started: u64,
    pub peak_active_users: u64,
    pub iterations_started: u64,
    pub setup_failures: u64,
    pub teardown_failures: u64,
    pub abandoned_iterations: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine<'a> {
    pub kind: &'static str,
    pub scenario: &'a str,
    pub results_path: String,
    pub passed: bool,
    pub statistics: &'a StatisticsSnapshot,
    pub run: JsonRunTotals,
    pub evaluation: &'a Evaluation,
}

fn run_totals(report: &RunReport) -> JsonRunTotals {
    JsonRunTotals {
        users_started: report.users_started,
        peak_active_users: report.peak_active_users,
        iterations_started: report.iterations_started,
        setup_failures: report.setup_failures,
        teardown_failures: report.teardown_failures,
        abandoned_iterations: report.abandoned_iterations,
    }
}

fn build_summary_line<'a>(outcome: &RunOutcome<'a>) -> JsonSummaryLine<'a> {
    JsonSummaryLine {
        kind: "summary",
        scenario: outcome.scenario,
        results_path: outcome.results_path.display().to_string(),
        passed: outcome.evaluation.passed(),
        statistics: &outcome.report.snapshot,
        run: run_totals(outcome.report),
        evaluation: outcome.evaluation,
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
