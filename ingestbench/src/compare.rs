use anyhow::Context as _;
use std::path::Path;

use ingestbench_core::{BaselineRecord, evaluate_regression, read_baseline};

use crate::cli::CompareArgs;
use crate::exit_codes::ExitCode;
use crate::run::regression_policy;
use crate::run_error::RunError;

/// Checks `current` against `baseline`; one line per regression.
pub fn compare(args: &CompareArgs) -> Result<ExitCode, RunError> {
    let policy = regression_policy(&args.regression).map_err(RunError::InvalidInput)?;
    let baseline = read(&args.baseline).map_err(RunError::InvalidInput)?;
    let current = read(&args.current).map_err(RunError::InvalidInput)?;

    let verdict = evaluate_regression(&current, &baseline, &policy)
        .context("cannot compare against this baseline")
        .map_err(RunError::InvalidInput)?;

    if verdict.passed {
        println!("Performance within baseline thresholds");
        return Ok(ExitCode::Success);
    }

    println!("PERFORMANCE REGRESSION DETECTED:");
    for reason in &verdict.reasons {
        println!("  - {reason}");
    }
    for reason in &verdict.reasons {
        eprintln!("FAILED: {reason}");
    }
    Ok(ExitCode::RegressionFailed)
}

fn read(path: &Path) -> anyhow::Result<BaselineRecord> {
    read_baseline(path).with_context(|| format!("failed to read results: {}", path.display()))
}
