use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ingestbench_http::HttpClient;
use rand::Rng as _;
use rand::distr::Distribution as _;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;

use crate::lifecycle::{HttpLifecycle, SdkLifecycle, UserLifecycle};
use crate::patterns::{
    DataPattern, IngestEndpoint, LogMessage, LogsPattern, MetricsPattern, PATH_DATA, PATH_LOGS,
    PATH_METRICS, Pattern, SdkConsolePattern, SdkMetricsPattern, SdkStepPattern,
};
use crate::sdk::{HttpSdk, Sdk, SdkSettings};
use crate::{Error, Result};

pub const DEFAULT_PROJECT_NAME: &str = "load-test-project";
pub const STRESS_BATCH_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ScenarioKind {
    /// Normal expected traffic; thresholds decide pass/fail.
    Load,
    /// Aggressive traffic to find limits; never fails the build.
    Stress,
    /// Traffic through the client SDK.
    Sdk,
}

impl ScenarioKind {
    #[must_use]
    pub fn default_results_path(self) -> &'static Path {
        match self {
            Self::Load | Self::Sdk => Path::new("reports/latest.json"),
            Self::Stress => Path::new("reports/stress_test_results.json"),
        }
    }

    #[must_use]
    pub fn is_stress(self) -> bool {
        matches!(self, Self::Stress)
    }
}

/// Think time between iterations, drawn uniformly from `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min: Duration,
    pub max: Duration,
}

impl Pacing {
    pub fn new(min: Duration, max: Duration) -> Result<Self> {
        if min > max {
            return Err(Error::InvalidPacing { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn sample(&self, rng: &mut StdRng) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rng.random_range(self.min..=self.max)
    }
}

pub struct WeightedPattern {
    pub pattern: Arc<dyn Pattern>,
    pub weight: u32,
}

impl WeightedPattern {
    pub fn new(pattern: impl Pattern + 'static, weight: u32) -> Self {
        Self {
            pattern: Arc::new(pattern),
            weight,
        }
    }
}

/// Connection settings shared by the built-in scenario definitions.
#[derive(Debug, Clone)]
pub struct ScenarioSettings {
    pub ingest_url: String,
    pub api_key: String,
    pub project_name: String,
    pub request_timeout: Option<Duration>,
}

/// Weighted patterns, pacing, and a user lifecycle. Immutable once built.
pub struct Scenario {
    name: Arc<str>,
    kind: ScenarioKind,
    patterns: Vec<WeightedPattern>,
    picker: WeightedIndex<u32>,
    pacing: Pacing,
    lifecycle: Arc<dyn UserLifecycle>,
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let patterns: Vec<_> = self
            .patterns
            .iter()
            .map(|p| (p.pattern.name().as_ref(), p.weight))
            .collect();
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("patterns", &patterns)
            .field("pacing", &self.pacing)
            .finish()
    }
}

impl Scenario {
    pub fn new(
        name: impl Into<Arc<str>>,
        kind: ScenarioKind,
        patterns: Vec<WeightedPattern>,
        pacing: Pacing,
        lifecycle: Arc<dyn UserLifecycle>,
    ) -> Result<Self> {
        let name = name.into();
        let picker = WeightedIndex::new(patterns.iter().map(|p| p.weight))
            .map_err(|_| Error::NoPatterns(name.to_string()))?;

        Ok(Self {
            name,
            kind,
            patterns,
            picker,
            pacing,
            lifecycle,
        })
    }

    /// Normal load: metrics 5, logs 3, data 2; 100-500ms think time.
    pub fn load(settings: &ScenarioSettings, client: Arc<HttpClient>) -> Result<Self> {
        let endpoint = |path: &str| {
            IngestEndpoint::new(
                client.clone(),
                &settings.ingest_url,
                path,
                settings.request_timeout,
            )
        };
        Self::new(
            "ingest load",
            ScenarioKind::Load,
            vec![
                WeightedPattern::new(MetricsPattern::single(endpoint(PATH_METRICS)), 5),
                WeightedPattern::new(
                    LogsPattern::new(endpoint(PATH_LOGS), LogMessage::Verbose),
                    3,
                ),
                WeightedPattern::new(DataPattern::new(endpoint(PATH_DATA)), 2),
            ],
            Pacing::new(Duration::from_millis(100), Duration::from_millis(500))?,
            Arc::new(HttpLifecycle::new(
                settings.api_key.clone(),
                settings.project_name.clone(),
            )),
        )
    }

    /// Stress: batched metrics 10, logs 3, data 2; 10-100ms think time.
    pub fn stress(settings: &ScenarioSettings, client: Arc<HttpClient>) -> Result<Self> {
        let endpoint = |path: &str| {
            IngestEndpoint::new(
                client.clone(),
                &settings.ingest_url,
                path,
                settings.request_timeout,
            )
        };
        Self::new(
            "ingest stress",
            ScenarioKind::Stress,
            vec![
                WeightedPattern::new(
                    MetricsPattern::batch(endpoint(PATH_METRICS), STRESS_BATCH_SIZE),
                    10,
                ),
                WeightedPattern::new(LogsPattern::new(endpoint(PATH_LOGS), LogMessage::Short), 3),
                WeightedPattern::new(DataPattern::new(endpoint(PATH_DATA)), 2),
            ],
            Pacing::new(Duration::from_millis(10), Duration::from_millis(100))?,
            Arc::new(HttpLifecycle::new(
                settings.api_key.clone(),
                settings.project_name.clone(),
            )),
        )
    }

    /// SDK path: log 5, log with explicit step 3, console 2; 100-500ms think time.
    pub fn sdk(settings: &ScenarioSettings, sdk: Arc<dyn Sdk>) -> Result<Self> {
        let sdk_settings = SdkSettings {
            ingest_url: settings.ingest_url.clone(),
            api_key: settings.api_key.clone(),
            request_timeout: settings.request_timeout,
        };
        Self::new(
            "ingest sdk",
            ScenarioKind::Sdk,
            vec![
                WeightedPattern::new(SdkMetricsPattern::default(), 5),
                WeightedPattern::new(SdkStepPattern::default(), 3),
                WeightedPattern::new(SdkConsolePattern::default(), 2),
            ],
            Pacing::new(Duration::from_millis(100), Duration::from_millis(500))?,
            Arc::new(SdkLifecycle::new(
                sdk,
                sdk_settings,
                settings.project_name.clone(),
            )),
        )
    }

    /// Builds one of the built-in scenarios. The SDK scenario uses [`HttpSdk`].
    pub fn build(
        kind: ScenarioKind,
        settings: &ScenarioSettings,
        client: Arc<HttpClient>,
    ) -> Result<Self> {
        match kind {
            ScenarioKind::Load => Self::load(settings, client),
            ScenarioKind::Stress => Self::stress(settings, client),
            ScenarioKind::Sdk => Self::sdk(settings, Arc::new(HttpSdk::new(client))),
        }
    }

    #[must_use]
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn kind(&self) -> ScenarioKind {
        self.kind
    }

    pub fn patterns(&self) -> &[WeightedPattern] {
        &self.patterns
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    pub fn lifecycle(&self) -> &Arc<dyn UserLifecycle> {
        &self.lifecycle
    }

    /// Picks the next pattern with probability `weight / total_weight`.
    pub fn pick(&self, rng: &mut StdRng) -> &Arc<dyn Pattern> {
        &self.patterns[self.picker.sample(rng)].pattern
    }
}
