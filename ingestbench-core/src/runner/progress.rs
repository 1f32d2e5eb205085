use std::time::Duration;

use crate::stats::StatisticsSnapshot;

#[derive(Debug, Clone)]
pub struct StageProgress {
    /// 1-based stage index.
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based) for progress emissions.
    pub tick: u64,
    pub elapsed: Duration,
    /// The bounded test window, when there is one.
    pub planned_duration: Option<Duration>,
    pub active_users: u64,
    pub target_users: u64,
    pub stage: Option<StageProgress>,
    /// Requests/sec observed during the last progress interval.
    pub rps_now: f64,
    /// Failed requests / total requests during the last progress interval (0..=1).
    pub error_rate_now: f64,
    /// Cumulative statistics so far.
    pub snapshot: StatisticsSnapshot,
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;
