use std::sync::Arc;

use async_trait::async_trait;
use ingestbench_value::{MetricRecord, Payload, Value, encode_ndjson, epoch_millis};
use rand::Rng as _;
use rand::rngs::StdRng;

use super::{IngestEndpoint, Pattern, encode_failure, missing_http_session};
use crate::outcome::RequestOutcome;
use crate::session::VirtualUser;

/// Training-loop metrics with the uniform range each value is drawn from.
pub const TRAINING_FIELDS: &[(&str, f64, f64)] = &[
    ("train/loss", 0.0, 1.0),
    ("train/accuracy", 0.8, 1.0),
    ("val/loss", 0.0, 1.0),
    ("val/accuracy", 0.75, 0.95),
    ("learning_rate", 0.0001, 0.001),
];

pub(crate) fn training_payload(fields: &[(&str, f64, f64)], rng: &mut StdRng) -> Payload {
    fields
        .iter()
        .map(|(name, lo, hi)| ((*name).to_string(), Value::Float(rng.random_range(*lo..*hi))))
        .collect()
}

/// `POST /ingest/metrics`; advances the user's step once per request.
pub struct MetricsPattern {
    name: Arc<str>,
    endpoint: IngestEndpoint,
    records_per_request: usize,
    fields: &'static [(&'static str, f64, f64)],
}

impl MetricsPattern {
    /// One record with all training fields.
    #[must_use]
    pub fn single(endpoint: IngestEndpoint) -> Self {
        Self {
            name: Arc::from("POST /ingest/metrics"),
            endpoint,
            records_per_request: 1,
            fields: TRAINING_FIELDS,
        }
    }

    /// Several records per request, train/val fields only.
    #[must_use]
    pub fn batch(endpoint: IngestEndpoint, records_per_request: usize) -> Self {
        Self {
            name: Arc::from("POST /ingest/metrics (batch)"),
            endpoint,
            records_per_request: records_per_request.max(1),
            fields: &TRAINING_FIELDS[..4],
        }
    }

    fn build(&self, step: u64, rng: &mut StdRng) -> Vec<MetricRecord> {
        (0..self.records_per_request)
            .map(|_| MetricRecord {
                time: epoch_millis(),
                step,
                data: training_payload(self.fields, rng),
            })
            .collect()
    }
}

#[async_trait]
impl Pattern for MetricsPattern {
    fn name(&self) -> &Arc<str> {
        &self.name
    }

    async fn execute(&self, user: &mut VirtualUser, rng: &mut StdRng) -> RequestOutcome {
        let step = user.next_step();
        let Some(session) = user.http_session() else {
            return missing_http_session(&self.name);
        };

        let body = match encode_ndjson(&self.build(step, rng)) {
            Ok(body) => body,
            Err(err) => return encode_failure(&self.name, err),
        };
        self.endpoint.post(&self.name, session, body).await
    }
}
