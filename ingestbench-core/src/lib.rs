#![forbid(unsafe_code)]

mod error;
mod evaluate;
mod lifecycle;
mod outcome;
mod results;
mod scenario;
mod sdk;
mod session;
mod stats;

pub mod patterns;
pub mod runner;

pub use error::{Error, Result};
pub use evaluate::{
    BaselineRecord, Capacity, Evaluation, RegressionPolicy, ThresholdPolicy, Verdict,
    evaluate_regression, evaluate_stress, evaluate_thresholds,
};
pub use lifecycle::{HttpLifecycle, SdkLifecycle, UserLifecycle};
pub use outcome::{ACCEPTED_STATUSES, RequestOutcome, is_accepted};
pub use results::{ResultsDocument, read_baseline};
pub use scenario::{
    DEFAULT_PROJECT_NAME, Pacing, STRESS_BATCH_SIZE, Scenario, ScenarioKind, ScenarioSettings,
    WeightedPattern,
};
pub use sdk::{HttpSdk, InitOptions, Sdk, SdkRun, SdkSettings};
pub use session::{HttpSession, Session, VirtualUser};
pub use stats::{PatternStats, StatisticsSnapshot, StatsCollector};
