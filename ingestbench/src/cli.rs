use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use ingestbench_core::ScenarioKind;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        ));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"))?;

    match unit_str.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            Ok(Duration::from_millis(value))
        }
        "m" | "min" | "mins" | "minute" | "minutes" => {
            let secs = value
                .checked_mul(60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        "h" | "hr" | "hrs" | "hour" | "hours" => {
            let secs = value
                .checked_mul(60)
                .and_then(|v| v.checked_mul(60))
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        _ => Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        )),
    }
}

fn parse_scenario_kind(input: &str) -> Result<ScenarioKind, String> {
    input
        .trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|_| format!("unknown scenario '{input}' (expected load, stress or sdk)"))
}

fn parse_fraction(input: &str) -> Result<f64, String> {
    let v: f64 = input
        .trim()
        .parse()
        .map_err(|_| format!("invalid number '{input}'"))?;
    if !v.is_finite() || v < 0.0 {
        return Err(format!("'{input}' must be a finite non-negative number"));
    }
    Ok(v)
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bar on stderr, summary and verdict on stdout.
    HumanReadable,
    /// Emit JSON progress lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "ingestbench",
    author,
    version,
    about = "Load and stress harness for NDJSON telemetry ingestion",
    long_about = "ingestbench drives concurrent virtual users against a telemetry ingestion service.\n\nEach user posts NDJSON metrics, log and custom data records (or goes through the client SDK), every request is timed and classified, and the run ends with percentiles, error rate, throughput and a pass/fail verdict against absolute thresholds and an optional baseline.",
    after_help = "Examples:\n  ingestbench run --scenario load --users 10 --ramp-up 30s --duration 2m\n  ingestbench run --scenario stress --users 100 --iterations 5000 --output json\n  ingestbench run --baseline reports/baseline.json\n  ingestbench compare reports/baseline.json reports/latest.json\n\nConfiguration is read from INGEST_URL, TEST_API_KEY, PROJECT_NAME, P95_THRESHOLD_MS, P99_THRESHOLD_MS and MAX_ERROR_RATE; flags override the environment."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a scenario against the ingestion service
    #[command(
        long_about = "Run one of the built-in scenarios, write the results document, and evaluate it.\n\nExit code 10 means thresholds failed, 11 a baseline regression, 12 both."
    )]
    Run(RunArgs),

    /// Compare a results document against a baseline
    Compare(CompareArgs),
}

#[derive(Debug, Args)]
pub struct RegressionArgs {
    /// Allowed relative p95/p99 increase over the baseline (0.20 = 20%)
    #[arg(long, value_parser = parse_fraction, default_value_t = 0.20)]
    pub max_latency_regression: f64,

    /// Allowed absolute error-rate increase over the baseline (0.05 = 5 points)
    #[arg(long = "max-error-increase", value_parser = parse_fraction, default_value_t = 0.05)]
    pub max_error_rate_increase: f64,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Scenario to run (load, stress, sdk)
    #[arg(long, value_parser = parse_scenario_kind, default_value = "load")]
    pub scenario: ScenarioKind,

    /// Number of concurrent virtual users
    #[arg(long, default_value_t = 10)]
    pub users: u64,

    /// Linear ramp from 0 to `--users` (e.g. 30s)
    #[arg(long, value_parser = parse_duration)]
    pub ramp_up: Option<Duration>,

    /// Test duration (e.g. 10s, 250ms, 1m); defaults to 1m without `--iterations`
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Total iteration budget shared by all users
    #[arg(long)]
    pub iterations: Option<u64>,

    /// How long in-flight iterations may finish after the run stops
    #[arg(long, value_parser = parse_duration, default_value = "5s")]
    pub grace: Duration,

    /// Per-request timeout
    #[arg(long, value_parser = parse_duration, default_value = "30s")]
    pub request_timeout: Duration,

    /// Results document path (defaults per scenario under reports/)
    #[arg(long)]
    pub results: Option<PathBuf>,

    /// Baseline results document to check for regressions
    #[arg(long)]
    pub baseline: Option<PathBuf>,

    #[command(flatten)]
    pub regression: RegressionArgs,

    /// Seed for pattern selection and payloads (reproducible runs)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Ingestion service base URL
    #[arg(long, env = "INGEST_URL", default_value = "http://localhost:3003")]
    pub ingest_url: String,

    /// API key sent as `Authorization: Bearer <key>`
    #[arg(long, env = "TEST_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Project name sent as `X-Project-Name`
    #[arg(long, env = "PROJECT_NAME", default_value = ingestbench_core::DEFAULT_PROJECT_NAME)]
    pub project_name: String,

    /// Fail when p95 latency exceeds this many milliseconds
    #[arg(long, env = "P95_THRESHOLD_MS", default_value_t = 500.0)]
    pub p95_threshold_ms: f64,

    /// Fail when p99 latency exceeds this many milliseconds
    #[arg(long, env = "P99_THRESHOLD_MS", default_value_t = 1000.0)]
    pub p99_threshold_ms: f64,

    /// Fail when the error rate exceeds this fraction
    #[arg(long, env = "MAX_ERROR_RATE", default_value_t = 0.01)]
    pub max_error_rate: f64,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Baseline results document
    pub baseline: PathBuf,

    /// Current results document
    pub current: PathBuf,

    #[command(flatten)]
    pub regression: RegressionArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(2 * 60 * 60)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn parse_fraction_rejects_negative_and_nan() {
        assert_eq!(parse_fraction("0.3"), Ok(0.3));
        assert!(parse_fraction("-0.1").is_err());
        assert!(parse_fraction("NaN").is_err());
        assert!(parse_fraction("x").is_err());
    }

    #[test]
    fn cli_parses_run() {
        let parsed = Cli::try_parse_from([
            "ingestbench",
            "run",
            "--scenario",
            "Stress",
            "--users",
            "4",
            "--ramp-up",
            "250ms",
            "--iterations",
            "100",
            "--grace",
            "1s",
            "--max-latency-regression",
            "0.3",
            "--api-key",
            "k",
            "--output",
            "json",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.scenario, ScenarioKind::Stress);
                assert_eq!(args.users, 4);
                assert_eq!(args.ramp_up, Some(Duration::from_millis(250)));
                assert_eq!(args.iterations, Some(100));
                assert_eq!(args.grace, Duration::from_secs(1));
                assert_eq!(args.regression.max_latency_regression, 0.3);
                assert_eq!(args.regression.max_error_rate_increase, 0.05);
                assert_eq!(args.api_key.as_deref(), Some("k"));
                assert!(matches!(args.output, OutputFormat::Json));
            }
            Command::Compare(_) => panic!("expected run command"),
        }
    }

    #[test]
    fn cli_rejects_unknown_scenario() {
        let parsed = Cli::try_parse_from(["ingestbench", "run", "--scenario", "soak"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn cli_parses_compare() {
        let parsed = Cli::try_parse_from([
            "ingestbench",
            "compare",
            "base.json",
            "cur.json",
            "--max-error-increase",
            "0.1",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        match cli.command {
            Command::Compare(args) => {
                assert_eq!(args.baseline, PathBuf::from("base.json"));
                assert_eq!(args.current, PathBuf::from("cur.json"));
                assert_eq!(args.regression.max_latency_regression, 0.20);
                assert_eq!(args.regression.max_error_rate_increase, 0.1);
            }
            Command::Run(_) => panic!("expected compare command"),
        }
    }
}
