use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ingestbench_value::{LogType, Value};
use rand::Rng as _;
use rand::rngs::StdRng;

use super::metrics::{TRAINING_FIELDS, training_payload};
use super::{LogMessage, Pattern};
use crate::outcome::RequestOutcome;
use crate::session::VirtualUser;

fn missing_run(pattern: &Arc<str>) -> RequestOutcome {
    RequestOutcome::failure(pattern.clone(), Duration::ZERO, "user has no sdk run")
}

fn classify(pattern: &Arc<str>, started: Instant, res: crate::Result<()>) -> RequestOutcome {
    let latency = started.elapsed();
    match res {
        Ok(()) => RequestOutcome::success(pattern.clone(), latency),
        Err(err) => RequestOutcome::failure(pattern.clone(), latency, err.to_string()),
    }
}

/// `run.log(...)` with the training fields plus `epoch`, letting the run pick the step.
pub struct SdkMetricsPattern {
    name: Arc<str>,
}

impl Default for SdkMetricsPattern {
    fn default() -> Self {
        Self {
            name: Arc::from("run.log (metrics)"),
        }
    }
}

#[async_trait]
impl Pattern for SdkMetricsPattern {
    fn name(&self) -> &Arc<str> {
        &self.name
    }

    async fn execute(&self, user: &mut VirtualUser, rng: &mut StdRng) -> RequestOutcome {
        let step = user.next_step();
        let Some(run) = user.sdk_run() else {
            return missing_run(&self.name);
        };

        let mut data = training_payload(TRAINING_FIELDS, rng);
        data.insert("epoch".to_string(), Value::from(step));

        let started = Instant::now();
        let res = run.log(data, None).await;
        classify(&self.name, started, res)
    }
}

/// `run.log(..., step)` with batch fields and the user's step passed explicitly.
pub struct SdkStepPattern {
    name: Arc<str>,
}

impl Default for SdkStepPattern {
    fn default() -> Self {
        Self {
            name: Arc::from("run.log (explicit step)"),
        }
    }
}

#[async_trait]
impl Pattern for SdkStepPattern {
    fn name(&self) -> &Arc<str> {
        &self.name
    }

    async fn execute(&self, user: &mut VirtualUser, rng: &mut StdRng) -> RequestOutcome {
        let step = user.next_step();
        let Some(run) = user.sdk_run() else {
            return missing_run(&self.name);
        };

        let mut data = ingestbench_value::Payload::new();
        data.insert(
            "batch/loss".to_string(),
            Value::Float(rng.random_range(0.0..1.5)),
        );
        data.insert(
            "batch/size".to_string(),
            Value::Int(rng.random_range(16..=128)),
        );

        let started = Instant::now();
        let res = run.log(data, Some(step)).await;
        classify(&self.name, started, res)
    }
}

/// One console line through the run's sink.
pub struct SdkConsolePattern {
    name: Arc<str>,
}

impl Default for SdkConsolePattern {
    fn default() -> Self {
        Self {
            name: Arc::from("run.console"),
        }
    }
}

#[async_trait]
impl Pattern for SdkConsolePattern {
    fn name(&self) -> &Arc<str> {
        &self.name
    }

    async fn execute(&self, user: &mut VirtualUser, rng: &mut StdRng) -> RequestOutcome {
        let step = user.step();
        let Some(run) = user.sdk_run() else {
            return missing_run(&self.name);
        };

        let line = LogMessage::Verbose.render(step, rng.random_range(16..=128));

        let started = Instant::now();
        let res = run.console(&line, LogType::Stdout).await;
        classify(&self.name, started, res)
    }
}
