use std::path::Path;
use std::process::{Command, Output};
use std::time::Duration;

use anyhow::Context as _;
use ingestbench_testserver::{DEFAULT_API_KEY, TestServer, TestServerOptions};

fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn ensure_exit(out: &Output, expected: i32) -> anyhow::Result<()> {
    anyhow::ensure!(
        status_code(out.status) == expected,
        "expected exit code {expected}, got {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out.status),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}

fn write_results(path: &Path, p95_ms: f64, p99_ms: f64, error_rate: f64) -> anyhow::Result<()> {
    let doc = serde_json::json!({
        "p50_ms": p95_ms / 2.0,
        "p95_ms": p95_ms,
        "p99_ms": p99_ms,
        "error_rate": error_rate,
        "total_requests": 100,
        "rps": 10.0,
    });
    std::fs::write(path, serde_json::to_vec_pretty(&doc)?)
        .with_context(|| format!("write {}", path.display()))
}

async fn run_against(
    server: &TestServer,
    args: Vec<String>,
    envs: Vec<(&'static str, String)>,
) -> anyhow::Result<Output> {
    let exe = env!("CARGO_BIN_EXE_ingestbench");
    let base_url = server.base_url().to_string();

    tokio::task::spawn_blocking(move || {
        let mut cmd = Command::new(exe);
        cmd.arg("run")
            .args(&args)
            .env("INGEST_URL", &base_url)
            .env("TEST_API_KEY", DEFAULT_API_KEY)
            .env("RUST_LOG", "warn");
        for (k, v) in envs {
            cmd.env(k, v);
        }
        cmd.output()
    })
    .await
    .context("spawn_blocking join")?
    .context("run ingestbench binary")
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

#[test]
fn invalid_flags_exit_30() -> anyhow::Result<()> {
    let out = Command::new(env!("CARGO_BIN_EXE_ingestbench"))
        .arg("run")
        .arg("--duration")
        .arg("10x")
        .output()
        .context("run ingestbench binary")?;

    ensure_exit(&out, 30)
}

#[test]
fn missing_api_key_exit_30() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let results = dir.path().join("latest.json");

    let out = Command::new(env!("CARGO_BIN_EXE_ingestbench"))
        .arg("run")
        .arg("--iterations")
        .arg("1")
        .arg("--results")
        .arg(&results)
        .env_remove("TEST_API_KEY")
        .env("INGEST_URL", "http://127.0.0.1:9")
        .output()
        .context("run ingestbench binary")?;

    ensure_exit(&out, 30)?;
    anyhow::ensure!(!results.exists(), "no results expected for a refused run");
    Ok(())
}

#[tokio::test]
async fn passing_load_run_exit_0() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let dir = tempfile::tempdir()?;
    let results = dir.path().join("reports").join("latest.json");

    let out = run_against(
        &server,
        args(&[
            "--users",
            "2",
            "--iterations",
            "6",
            "--grace",
            "1s",
            "--results",
            &results.display().to_string(),
        ]),
        Vec::new(),
    )
    .await?;

    let requests = server.stats().requests_total();
    server.shutdown().await;

    ensure_exit(&out, 0)?;
    anyhow::ensure!(requests == 6, "expected 6 ingest requests, got {requests}");

    let doc: serde_json::Value = serde_json::from_slice(&std::fs::read(&results)?)?;
    anyhow::ensure!(
        doc.get("total_requests").and_then(serde_json::Value::as_u64) == Some(6),
        "unexpected results document: {doc}"
    );
    anyhow::ensure!(doc.get("test_type").is_none(), "load results carry no test_type");

    let stdout = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(stdout.contains("thresholds: passed"), "stdout:\n{stdout}");
    Ok(())
}

#[tokio::test]
async fn unwritable_results_still_print_the_summary() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let dir = tempfile::tempdir()?;
    let blocker = dir.path().join("reports");
    std::fs::write(&blocker, b"not a directory")?;
    let results = blocker.join("latest.json");

    let out = run_against(
        &server,
        args(&[
            "--iterations",
            "2",
            "--users",
            "1",
            "--results",
            &results.display().to_string(),
        ]),
        Vec::new(),
    )
    .await?;
    server.shutdown().await;

    ensure_exit(&out, 40)?;
    let stdout = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(stdout.contains("requests: 2 (ok 2, failed 0)"), "stdout:\n{stdout}");
    let stderr = String::from_utf8_lossy(&out.stderr);
    anyhow::ensure!(stderr.contains("failed to write results"), "stderr:\n{stderr}");
    Ok(())
}

#[tokio::test]
async fn thresholds_failed_exit_10() -> anyhow::Result<()> {
    let server = TestServer::start_with(TestServerOptions {
        delay: Some(Duration::from_millis(30)),
        ..TestServerOptions::default()
    })
    .await
    .context("start test server")?;
    let dir = tempfile::tempdir()?;
    let results = dir.path().join("latest.json");

    let out = run_against(
        &server,
        args(&[
            "--iterations",
            "3",
            "--users",
            "1",
            "--results",
            &results.display().to_string(),
        ]),
        vec![("P95_THRESHOLD_MS", "5".to_string())],
    )
    .await?;
    server.shutdown().await;

    ensure_exit(&out, 10)?;
    let stderr = String::from_utf8_lossy(&out.stderr);
    anyhow::ensure!(stderr.contains("FAILED: p95"), "stderr:\n{stderr}");
    Ok(())
}

#[tokio::test]
async fn baseline_regression_exit_11() -> anyhow::Result<()> {
    let server = TestServer::start_with(TestServerOptions {
        delay: Some(Duration::from_millis(20)),
        ..TestServerOptions::default()
    })
    .await
    .context("start test server")?;
    let dir = tempfile::tempdir()?;
    let baseline = dir.path().join("baseline.json");
    write_results(&baseline, 1.0, 1.0, 0.0)?;
    let results = dir.path().join("latest.json");

    let out = run_against(
        &server,
        args(&[
            "--iterations",
            "3",
            "--users",
            "1",
            "--baseline",
            &baseline.display().to_string(),
            "--results",
            &results.display().to_string(),
            "--output",
            "json",
        ]),
        Vec::new(),
    )
    .await?;
    server.shutdown().await;

    ensure_exit(&out, 11)?;

    let stdout = String::from_utf8_lossy(&out.stdout);
    let summary = stdout
        .lines()
        .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
        .find(|v| v.get("kind").and_then(serde_json::Value::as_str) == Some("summary"))
        .context("missing summary line")?;
    anyhow::ensure!(
        summary.pointer("/evaluation/regression/passed") == Some(&serde_json::Value::Bool(false)),
        "unexpected summary: {summary}"
    );
    Ok(())
}

#[tokio::test]
async fn zero_baseline_is_refused_before_the_run() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let dir = tempfile::tempdir()?;
    let baseline = dir.path().join("baseline.json");
    write_results(&baseline, 0.0, 200.0, 0.0)?;

    let out = run_against(
        &server,
        args(&[
            "--iterations",
            "3",
            "--baseline",
            &baseline.display().to_string(),
            "--results",
            &dir.path().join("latest.json").display().to_string(),
        ]),
        Vec::new(),
    )
    .await?;

    let requests = server.stats().requests_total();
    server.shutdown().await;

    ensure_exit(&out, 30)?;
    anyhow::ensure!(requests == 0, "no request expected, got {requests}");
    Ok(())
}

#[tokio::test]
async fn overloaded_stress_run_still_exits_0() -> anyhow::Result<()> {
    let server = TestServer::start_with(TestServerOptions {
        fail_every: Some(2),
        ..TestServerOptions::default()
    })
    .await
    .context("start test server")?;
    let dir = tempfile::tempdir()?;
    let results = dir.path().join("stress.json");

    let out = run_against(
        &server,
        args(&[
            "--scenario",
            "stress",
            "--users",
            "4",
            "--iterations",
            "20",
            "--results",
            &results.display().to_string(),
        ]),
        Vec::new(),
    )
    .await?;
    server.shutdown().await;

    ensure_exit(&out, 0)?;

    let doc: serde_json::Value = serde_json::from_slice(&std::fs::read(&results)?)?;
    anyhow::ensure!(
        doc.get("test_type").and_then(serde_json::Value::as_str) == Some("stress"),
        "unexpected results document: {doc}"
    );
    anyhow::ensure!(
        doc.get("capacity_assessment").and_then(serde_json::Value::as_str) == Some("overloaded"),
        "unexpected results document: {doc}"
    );
    Ok(())
}

#[test]
fn compare_exit_codes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let baseline = dir.path().join("baseline.json");
    let current = dir.path().join("current.json");
    write_results(&baseline, 100.0, 200.0, 0.0)?;
    write_results(&current, 125.0, 200.0, 0.0)?;

    let compare = |extra: &[&str]| {
        Command::new(env!("CARGO_BIN_EXE_ingestbench"))
            .arg("compare")
            .arg(&baseline)
            .arg(&current)
            .args(extra)
            .output()
            .context("run ingestbench binary")
    };

    let out = compare(&[])?;
    ensure_exit(&out, 11)?;
    let stdout = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(
        stdout.contains("PERFORMANCE REGRESSION DETECTED:")
            && stdout.contains("p95 regression: 25.0%"),
        "stdout:\n{stdout}"
    );

    let out = compare(&["--max-latency-regression", "0.3"])?;
    ensure_exit(&out, 0)?;
    let stdout = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(
        stdout.contains("Performance within baseline thresholds"),
        "stdout:\n{stdout}"
    );

    write_results(&baseline, 0.0, 200.0, 0.0)?;
    let out = compare(&[])?;
    ensure_exit(&out, 30)
}
