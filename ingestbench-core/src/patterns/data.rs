use std::sync::Arc;

use async_trait::async_trait;
use ingestbench_value::{DataRecord, encode_ndjson, epoch_millis};
use rand::Rng as _;
use rand::rngs::StdRng;

use super::{IngestEndpoint, Pattern, encode_failure, missing_http_session};
use crate::outcome::RequestOutcome;
use crate::session::VirtualUser;

pub(crate) const DATA_TYPE: &str = "batch_metrics";
pub(crate) const LOG_NAME: &str = "training_metrics";

pub(crate) fn batch_metrics_document(rng: &mut StdRng) -> String {
    serde_json::json!({
        "batch_loss": rng.random_range(0.0..1.5),
        "batch_size": rng.random_range(16..=128),
        "gpu_util": rng.random_range(0.7..1.0),
    })
    .to_string()
}

/// `POST /ingest/data` carrying a batch-metrics document as a JSON string.
pub struct DataPattern {
    name: Arc<str>,
    endpoint: IngestEndpoint,
}

impl DataPattern {
    #[must_use]
    pub fn new(endpoint: IngestEndpoint) -> Self {
        Self {
            name: Arc::from("POST /ingest/data"),
            endpoint,
        }
    }
}

#[async_trait]
impl Pattern for DataPattern {
    fn name(&self) -> &Arc<str> {
        &self.name
    }

    async fn execute(&self, user: &mut VirtualUser, rng: &mut StdRng) -> RequestOutcome {
        let step = user.step();
        let Some(session) = user.http_session() else {
            return missing_http_session(&self.name);
        };

        let record = DataRecord {
            time: epoch_millis(),
            step,
            data: batch_metrics_document(rng),
            data_type: DATA_TYPE.to_string(),
            log_name: LOG_NAME.to_string(),
        };
        let body = match encode_ndjson(&[record]) {
            Ok(body) => body,
            Err(err) => return encode_failure(&self.name, err),
        };
        self.endpoint.post(&self.name, session, body).await
    }
}
