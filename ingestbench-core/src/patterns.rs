//! Request pattern generators.
//!
//! A pattern builds one protocol-correct payload from the user's state and an
//! actor-owned random source, sends it, and classifies the result. Latency is
//! measured around the network (or SDK) call only.

mod data;
mod logs;
mod metrics;
mod sdk;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use ingestbench_http::{HttpClient, HttpRequest, join_url};
use rand::rngs::StdRng;

use crate::outcome::RequestOutcome;
use crate::session::{HttpSession, VirtualUser};

pub use data::DataPattern;
pub use logs::{LogMessage, LogsPattern};
pub use metrics::{MetricsPattern, TRAINING_FIELDS};
pub use sdk::{SdkConsolePattern, SdkMetricsPattern, SdkStepPattern};

pub const PATH_METRICS: &str = "/ingest/metrics";
pub const PATH_LOGS: &str = "/ingest/logs";
pub const PATH_DATA: &str = "/ingest/data";

#[async_trait]
pub trait Pattern: Send + Sync {
    fn name(&self) -> &Arc<str>;

    /// Runs one request. Never fails: every problem becomes a failed outcome.
    async fn execute(&self, user: &mut VirtualUser, rng: &mut StdRng) -> RequestOutcome;
}

/// One ingestion endpoint plus the shared client and per-request timeout.
#[derive(Debug, Clone)]
pub struct IngestEndpoint {
    client: Arc<HttpClient>,
    url: String,
    timeout: Option<Duration>,
}

impl IngestEndpoint {
    #[must_use]
    pub fn new(
        client: Arc<HttpClient>,
        base_url: &str,
        path: &str,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            client,
            url: join_url(base_url, path),
            timeout,
        }
    }

    pub(crate) async fn post(
        &self,
        pattern: &Arc<str>,
        session: &HttpSession,
        body: Bytes,
    ) -> RequestOutcome {
        let req = HttpRequest::post(&self.url, body)
            .with_headers(&session.headers)
            .with_timeout(self.timeout);

        let started = Instant::now();
        let res = self.client.request(req).await;
        RequestOutcome::from_http(pattern.clone(), started.elapsed(), res)
    }
}

fn missing_http_session(pattern: &Arc<str>) -> RequestOutcome {
    RequestOutcome::failure(pattern.clone(), Duration::ZERO, "user has no http session")
}

fn encode_failure(pattern: &Arc<str>, err: ingestbench_value::Error) -> RequestOutcome {
    RequestOutcome::failure(pattern.clone(), Duration::ZERO, err.to_string())
}
