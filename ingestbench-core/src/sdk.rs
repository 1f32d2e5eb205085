//! The client SDK boundary used by the `sdk` scenario.
//!
//! [`Sdk`] and [`SdkRun`] mirror the calls a training script makes
//! (`login`, `init`, `log`, `finish`) plus an explicit console sink in place of
//! stdout capture. [`HttpSdk`] implements them on top of the ingestion HTTP
//! endpoints; anything else can be plugged in through the traits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ingestbench_http::{HttpClient, HttpRequest, join_url};
use ingestbench_value::{LogRecord, LogType, MetricRecord, Payload, encode_ndjson, epoch_millis};

use crate::outcome::is_accepted;
use crate::patterns::{PATH_LOGS, PATH_METRICS};
use crate::session::HttpSession;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct SdkSettings {
    pub ingest_url: String,
    pub api_key: String,
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub project: String,
    pub name: String,
    pub config: Payload,
    pub tags: Vec<String>,
    /// Offset of the run id from the SDK's base, so distinct users get distinct runs.
    pub user_id: u64,
}

#[async_trait]
pub trait Sdk: Send + Sync {
    async fn login(&self, settings: &SdkSettings) -> Result<()>;
    async fn init(&self, opts: InitOptions, settings: &SdkSettings) -> Result<Box<dyn SdkRun>>;
}

#[async_trait]
pub trait SdkRun: Send + Sync {
    fn run_id(&self) -> u64;

    /// Logs one set of metrics. Without `step` the run advances its own step counter.
    async fn log(&self, data: Payload, step: Option<u64>) -> Result<()>;

    /// Console sink: forwards one line of program output.
    async fn console(&self, line: &str, log_type: LogType) -> Result<()>;

    async fn finish(&self) -> Result<()>;
}

/// Run ids are the SDK's creation time in epoch milliseconds plus the user id.
#[derive(Debug, Clone)]
pub struct HttpSdk {
    client: Arc<HttpClient>,
    run_id_base: u64,
}

impl HttpSdk {
    #[must_use]
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self {
            client,
            run_id_base: epoch_millis(),
        }
    }
}

#[async_trait]
impl Sdk for HttpSdk {
    async fn login(&self, settings: &SdkSettings) -> Result<()> {
        if settings.api_key.trim().is_empty() {
            return Err(Error::MissingApiKey);
        }
        Ok(())
    }

    async fn init(&self, opts: InitOptions, settings: &SdkSettings) -> Result<Box<dyn SdkRun>> {
        let run_id = self.run_id_base.saturating_add(opts.user_id);
        tracing::debug!(
            run_id,
            project = %opts.project,
            name = %opts.name,
            tags = ?opts.tags,
            config = ?opts.config,
            "sdk run initialized"
        );

        Ok(Box::new(HttpSdkRun {
            client: self.client.clone(),
            session: HttpSession::new(run_id, &settings.api_key, &opts.project),
            metrics_url: join_url(&settings.ingest_url, PATH_METRICS),
            logs_url: join_url(&settings.ingest_url, PATH_LOGS),
            timeout: settings.request_timeout,
            step: AtomicU64::new(0),
            line: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        }))
    }
}

struct HttpSdkRun {
    client: Arc<HttpClient>,
    session: HttpSession,
    metrics_url: String,
    logs_url: String,
    timeout: Option<Duration>,
    step: AtomicU64,
    line: AtomicU64,
    finished: AtomicBool,
}

impl HttpSdkRun {
    fn ensure_open(&self) -> Result<()> {
        if self.finished.load(Ordering::Acquire) {
            return Err(Error::Sdk(format!("run {} is already finished", self.session.run_id)));
        }
        Ok(())
    }

    async fn post(&self, url: &str, body: Bytes) -> Result<()> {
        let req = HttpRequest::post(url, body)
            .with_headers(&self.session.headers)
            .with_timeout(self.timeout);
        let res = self.client.request(req).await?;
        if !is_accepted(res.status) {
            return Err(Error::Rejected {
                status: res.status,
                body: res.body_excerpt(80),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SdkRun for HttpSdkRun {
    fn run_id(&self) -> u64 {
        self.session.run_id
    }

    async fn log(&self, data: Payload, step: Option<u64>) -> Result<()> {
        self.ensure_open()?;

        let step = match step {
            Some(step) => {
                self.step.fetch_max(step, Ordering::Relaxed);
                step
            }
            None => self.step.fetch_add(1, Ordering::Relaxed).saturating_add(1),
        };

        let body = encode_ndjson(&[MetricRecord {
            time: epoch_millis(),
            step,
            data,
        }])?;
        self.post(&self.metrics_url, body).await
    }

    async fn console(&self, line: &str, log_type: LogType) -> Result<()> {
        self.ensure_open()?;

        let line_number = self.line.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        let body = encode_ndjson(&[LogRecord {
            time: epoch_millis(),
            message: line.to_string(),
            line_number,
            log_type,
        }])?;
        self.post(&self.logs_url, body).await
    }

    async fn finish(&self) -> Result<()> {
        if self.finished.swap(true, Ordering::AcqRel) {
            return Err(Error::Sdk(format!("run {} finished twice", self.session.run_id)));
        }
        Ok(())
    }
}
