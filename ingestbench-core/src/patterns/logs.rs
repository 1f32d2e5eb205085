use std::sync::Arc;

use async_trait::async_trait;
use ingestbench_value::{LogRecord, LogType, encode_ndjson, epoch_millis};
use rand::Rng as _;
use rand::rngs::StdRng;

use super::{IngestEndpoint, Pattern, encode_failure, missing_http_session};
use crate::outcome::RequestOutcome;
use crate::session::VirtualUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMessage {
    /// `Training step {step} completed - batch_size: {n}`
    Verbose,
    /// `Step {step} - batch_size: {n}`
    Short,
}

impl LogMessage {
    pub(crate) fn render(self, step: u64, batch_size: u32) -> String {
        match self {
            Self::Verbose => format!("Training step {step} completed - batch_size: {batch_size}"),
            Self::Short => format!("Step {step} - batch_size: {batch_size}"),
        }
    }
}

/// `POST /ingest/logs` with one stdout line at the user's current step.
pub struct LogsPattern {
    name: Arc<str>,
    endpoint: IngestEndpoint,
    message: LogMessage,
}

impl LogsPattern {
    #[must_use]
    pub fn new(endpoint: IngestEndpoint, message: LogMessage) -> Self {
        Self {
            name: Arc::from("POST /ingest/logs"),
            endpoint,
            message,
        }
    }
}

#[async_trait]
impl Pattern for LogsPattern {
    fn name(&self) -> &Arc<str> {
        &self.name
    }

    async fn execute(&self, user: &mut VirtualUser, rng: &mut StdRng) -> RequestOutcome {
        let step = user.step();
        let Some(session) = user.http_session() else {
            return missing_http_session(&self.name);
        };

        let record = LogRecord {
            time: epoch_millis(),
            message: self.message.render(step, rng.random_range(16..=128)),
            line_number: step,
            log_type: LogType::Stdout,
        };
        let body = match encode_ndjson(&[record]) {
            Ok(body) => body,
            Err(err) => return encode_failure(&self.name, err),
        };
        self.endpoint.post(&self.name, session, body).await
    }
}
