//! A local stand-in for the telemetry ingestion service.
//!
//! Accepts the same three NDJSON endpoints, validates auth, required headers and
//! every body line, and counts what it saw so tests can compare the harness's
//! own statistics with what actually reached the server.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use ingestbench_value::{DataRecord, LogRecord, MetricRecord, decode_ndjson};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_METRICS: &str = "/ingest/metrics";
pub const PATH_LOGS: &str = "/ingest/logs";
pub const PATH_DATA: &str = "/ingest/data";
pub const PATH_HEALTH: &str = "/health";

pub const DEFAULT_API_KEY: &str = "test-api-key";

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    accepted_total: Arc<AtomicU64>,
    unauthorized_total: Arc<AtomicU64>,
    bad_request_total: Arc<AtomicU64>,
    injected_failures_total: Arc<AtomicU64>,
    metric_records: Arc<AtomicU64>,
    log_records: Arc<AtomicU64>,
    data_records: Arc<AtomicU64>,
    non_finite_values: Arc<AtomicU64>,
    run_ids: Arc<Mutex<BTreeSet<u64>>>,
}

impl TestServerStats {
    fn inc(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn saw_run_id(&self, run_id: u64) {
        self.run_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(run_id);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn accepted_total(&self) -> u64 {
        self.accepted_total.load(Ordering::Relaxed)
    }

    pub fn unauthorized_total(&self) -> u64 {
        self.unauthorized_total.load(Ordering::Relaxed)
    }

    pub fn bad_request_total(&self) -> u64 {
        self.bad_request_total.load(Ordering::Relaxed)
    }

    pub fn injected_failures_total(&self) -> u64 {
        self.injected_failures_total.load(Ordering::Relaxed)
    }

    pub fn metric_records(&self) -> u64 {
        self.metric_records.load(Ordering::Relaxed)
    }

    pub fn log_records(&self) -> u64 {
        self.log_records.load(Ordering::Relaxed)
    }

    pub fn data_records(&self) -> u64 {
        self.data_records.load(Ordering::Relaxed)
    }

    pub fn non_finite_values(&self) -> u64 {
        self.non_finite_values.load(Ordering::Relaxed)
    }

    /// Distinct `X-Run-Id` values seen on accepted requests.
    pub fn distinct_run_ids(&self) -> usize {
        self.run_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// Behavior knobs for the stand-in server.
#[derive(Debug, Clone)]
pub struct TestServerOptions {
    pub api_key: String,
    /// Answer every n-th ingest request with `503`.
    pub fail_every: Option<u64>,
    /// Artificial processing delay applied to every ingest request.
    pub delay: Option<Duration>,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            api_key: DEFAULT_API_KEY.to_string(),
            fail_every: None,
            delay: None,
        }
    }
}

#[derive(Debug, Clone)]
struct AppState {
    stats: TestServerStats,
    options: Arc<TestServerOptions>,
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    pub metrics: String,
    pub logs: String,
    pub data: String,
}

impl TestServerUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            metrics: format!("{base_url}{PATH_METRICS}"),
            logs: format!("{base_url}{PATH_LOGS}"),
            data: format!("{base_url}{PATH_DATA}"),
            base_url,
        }
    }
}

type Reply = (StatusCode, &'static str);

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Shared admission checks. Returns the run id on success.
async fn admit(state: &AppState, headers: &HeaderMap) -> Result<u64, Reply> {
    let seq = state.stats.requests_total.fetch_add(1, Ordering::Relaxed) + 1;

    if let Some(delay) = state.options.delay {
        sleep(delay).await;
    }

    let expected = format!("Bearer {}", state.options.api_key);
    if header(headers, "authorization") != Some(expected.as_str()) {
        TestServerStats::inc(&state.stats.unauthorized_total, 1);
        return Err((StatusCode::UNAUTHORIZED, "invalid api key"));
    }

    let Some(run_id) = header(headers, "x-run-id").and_then(|v| v.trim().parse::<u64>().ok())
    else {
        TestServerStats::inc(&state.stats.bad_request_total, 1);
        return Err((StatusCode::BAD_REQUEST, "missing or invalid X-Run-Id"));
    };

    if header(headers, "x-project-name").is_none_or(|v| v.trim().is_empty()) {
        TestServerStats::inc(&state.stats.bad_request_total, 1);
        return Err((StatusCode::BAD_REQUEST, "missing X-Project-Name"));
    }

    if !header(headers, "content-type")
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("application/x-ndjson"))
    {
        TestServerStats::inc(&state.stats.bad_request_total, 1);
        return Err((StatusCode::BAD_REQUEST, "expected application/x-ndjson"));
    }

    if let Some(n) = state.options.fail_every
        && n > 0
        && seq % n == 0
    {
        TestServerStats::inc(&state.stats.injected_failures_total, 1);
        return Err((StatusCode::SERVICE_UNAVAILABLE, "injected failure"));
    }

    Ok(run_id)
}

fn reject_body(state: &AppState, msg: &'static str) -> Reply {
    TestServerStats::inc(&state.stats.bad_request_total, 1);
    (StatusCode::BAD_REQUEST, msg)
}

fn accept(state: &AppState, run_id: u64) -> Reply {
    state.stats.saw_run_id(run_id);
    TestServerStats::inc(&state.stats.accepted_total, 1);
    (StatusCode::ACCEPTED, "accepted")
}

async fn handle_metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    let run_id = match admit(&state, &headers).await {
        Ok(v) => v,
        Err(reply) => return reply,
    };

    let records: Vec<MetricRecord> = match decode_ndjson(&body) {
        Ok(v) if !v.is_empty() => v,
        _ => return reject_body(&state, "invalid metric format"),
    };
    if records
        .iter()
        .any(|r| r.data.is_empty() || r.data.keys().any(|k| k.trim().is_empty()))
    {
        return reject_body(&state, "'data' field cannot be empty");
    }

    let non_finite = records
        .iter()
        .flat_map(|r| r.data.values())
        .filter(|v| v.as_f64().is_some_and(|f| !f.is_finite()))
        .count() as u64;

    TestServerStats::inc(&state.stats.metric_records, records.len() as u64);
    TestServerStats::inc(&state.stats.non_finite_values, non_finite);
    accept(&state, run_id)
}

async fn handle_logs(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Reply {
    let run_id = match admit(&state, &headers).await {
        Ok(v) => v,
        Err(reply) => return reply,
    };

    let records: Vec<LogRecord> = match decode_ndjson(&body) {
        Ok(v) if !v.is_empty() => v,
        _ => return reject_body(&state, "invalid log format"),
    };

    TestServerStats::inc(&state.stats.log_records, records.len() as u64);
    accept(&state, run_id)
}

async fn handle_data(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Reply {
    let run_id = match admit(&state, &headers).await {
        Ok(v) => v,
        Err(reply) => return reply,
    };

    let records: Vec<DataRecord> = match decode_ndjson(&body) {
        Ok(v) if !v.is_empty() => v,
        _ => return reject_body(&state, "invalid data format"),
    };
    if records
        .iter()
        .any(|r| serde_json::from_str::<serde_json::Value>(&r.data).is_err())
    {
        return reject_body(&state, "'data' must be a JSON document encoded as a string");
    }

    TestServerStats::inc(&state.stats.data_records, records.len() as u64);
    accept(&state, run_id)
}

async fn handle_health() -> &'static str {
    "OK"
}

pub fn router(stats: TestServerStats, options: TestServerOptions) -> Router {
    let state = AppState {
        stats,
        options: Arc::new(options),
    };

    Router::new()
        .route(PATH_METRICS, post(handle_metrics))
        .route(PATH_LOGS, post(handle_logs))
        .route(PATH_DATA, post(handle_data))
        .route(PATH_HEALTH, get(handle_health))
        .with_state(state)
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    urls: TestServerUrls,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(TestServerOptions::default()).await
    }

    pub async fn start_with(options: TestServerOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone(), options);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        let base_url = format!("http://{addr}");
        let urls = TestServerUrls::new(base_url.clone());

        Ok(Self {
            addr,
            base_url,
            urls,
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
