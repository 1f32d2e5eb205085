use anyhow::Context as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ingestbench_core::runner::{LoadProfile, RunConfig, StopSignal, run_scenario};
use ingestbench_core::{
    BaselineRecord, Evaluation, RegressionPolicy, ResultsDocument, Scenario, ScenarioSettings,
    ThresholdPolicy, read_baseline,
};
use ingestbench_http::HttpClient;

use crate::cli::{RegressionArgs, RunArgs};
use crate::exit_codes::ExitCode;
use crate::output::{self, RunOutcome};
use crate::run_error::RunError;

/// Test window when neither `--duration` nor `--iterations` is given.
const DEFAULT_DURATION: Duration = Duration::from_secs(60);

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let thresholds = ThresholdPolicy {
        p95_threshold_ms: args.p95_threshold_ms,
        p99_threshold_ms: args.p99_threshold_ms,
        max_error_rate: args.max_error_rate,
    };
    thresholds
        .validate()
        .context("invalid thresholds")
        .map_err(RunError::InvalidInput)?;

    let regression = regression_policy(&args.regression).map_err(RunError::InvalidInput)?;
    let baseline = load_baseline(args.baseline.as_ref()).map_err(RunError::InvalidInput)?;

    let api_key = args
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            RunError::InvalidInput(anyhow::anyhow!(
                "no API key: set TEST_API_KEY or pass --api-key"
            ))
        })?;

    let settings = ScenarioSettings {
        ingest_url: args.ingest_url.trim_end_matches('/').to_string(),
        api_key: api_key.to_string(),
        project_name: args.project_name.clone(),
        request_timeout: Some(args.request_timeout),
    };

    let cfg = run_config(&args);
    cfg.validate()
        .context("invalid load profile")
        .map_err(RunError::InvalidInput)?;

    let client = Arc::new(HttpClient::default());
    let scenario = Scenario::build(args.scenario, &settings, client)
        .context("failed to build scenario")
        .map_err(RunError::InvalidInput)?;
    let scenario = Arc::new(scenario);
    let results_path = args
        .results
        .clone()
        .unwrap_or_else(|| args.scenario.default_results_path().to_path_buf());

    out.print_header(scenario.name(), &settings.ingest_url, &cfg);

    let stop = Arc::new(StopSignal::new());
    let interrupt_handle = {
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = stop.wait() => {}
                res = tokio::signal::ctrl_c() => {
                    if res.is_ok() {
                        tracing::info!("interrupt received, draining in-flight requests");
                        stop.fire();
                    }
                }
            }
        })
    };

    let report = run_scenario(scenario.clone(), cfg, out.progress(), stop.clone())
        .await
        .context("run failed")
        .map_err(RunError::RuntimeError);
    stop.fire();
    let _ = interrupt_handle.await;
    let report = report?;

    let evaluation = Evaluation::run(
        &report.snapshot,
        args.scenario.is_stress(),
        &thresholds,
        baseline.as_ref().map(|b| (b, &regression)),
    )
    .context("failed to evaluate run")
    .map_err(RunError::RuntimeError)?;

    out.print_summary(&RunOutcome {
        scenario: scenario.name(),
        report: &report,
        evaluation: &evaluation,
        results_path: &results_path,
    })
    .map_err(RunError::RuntimeError)?;

    ResultsDocument::from_snapshot(args.scenario, &report.snapshot)
        .write_atomic(&results_path)
        .with_context(|| format!("failed to write results: {}", results_path.display()))
        .map_err(RunError::RuntimeError)?;

    report_failures(&evaluation);

    Ok(ExitCode::from_quality_gates(
        evaluation.thresholds_failed(),
        evaluation.regression_failed(),
    ))
}

pub(crate) fn regression_policy(args: &RegressionArgs) -> anyhow::Result<RegressionPolicy> {
    let policy = RegressionPolicy {
        max_latency_regression: args.max_latency_regression,
        max_error_rate_increase: args.max_error_rate_increase,
    };
    policy.validate().context("invalid regression policy")?;
    Ok(policy)
}

fn load_baseline(path: Option<&PathBuf>) -> anyhow::Result<Option<BaselineRecord>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let baseline = read_baseline(path)
        .with_context(|| format!("failed to read baseline: {}", path.display()))?;
    baseline
        .validate()
        .with_context(|| format!("unusable baseline: {}", path.display()))?;
    Ok(Some(baseline))
}

fn run_config(args: &RunArgs) -> RunConfig {
    let ramp_up = args.ramp_up.unwrap_or(Duration::ZERO);
    let duration = args.duration.or_else(|| {
        args.iterations
            .is_none()
            .then(|| DEFAULT_DURATION.max(ramp_up))
    });

    RunConfig {
        profile: LoadProfile::ramp_up(args.users, ramp_up),
        duration,
        iterations: args.iterations,
        grace: args.grace,
        seed: args.seed,
    }
}

fn report_failures(evaluation: &Evaluation) {
    let regression = evaluation.regression.iter().flat_map(|v| v.reasons.iter());
    for reason in evaluation.thresholds.reasons.iter().chain(regression) {
        eprintln!("FAILED: {reason}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser as _;

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["ingestbench", "run"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv) {
            Ok(Cli {
                command: Command::Run(args),
            }) => args,
            Ok(_) => panic!("expected run command"),
            Err(err) => panic!("failed to parse args: {err}"),
        }
    }

    #[test]
    fn unbounded_runs_default_to_one_minute() {
        let cfg = run_config(&run_args(&["--users", "3"]));
        assert_eq!(cfg.profile, LoadProfile::Constant { users: 3 });
        assert_eq!(cfg.duration, Some(DEFAULT_DURATION));
    }

    #[test]
    fn iteration_budget_leaves_duration_open() {
        let cfg = run_config(&run_args(&["--iterations", "50"]));
        assert_eq!(cfg.duration, None);
        assert_eq!(cfg.iterations, Some(50));
    }

    #[test]
    fn long_ramp_extends_the_default_window() {
        let cfg = run_config(&run_args(&["--users", "8", "--ramp-up", "2m"]));
        assert_eq!(cfg.profile.max_users(), 8);
        assert_eq!(cfg.duration, Some(Duration::from_secs(120)));
    }
}
