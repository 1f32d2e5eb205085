use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::MissedTickBehavior;

use super::config::RunConfig;
use super::gate::IterationGate;
use super::progress::{ProgressFn, ProgressUpdate, StageProgress};
use super::schedule::UserSchedule;
use super::signal::StopSignal;
use super::vu::{RunCounters, UserContext, run_user};
use crate::Result;
use crate::scenario::Scenario;
use crate::stats::{StatisticsSnapshot, StatsCollector};

/// What the runner observed, beyond the request statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub snapshot: StatisticsSnapshot,
    pub users_started: u64,
    pub peak_active_users: u64,
    pub setup_failures: u64,
    pub teardown_failures: u64,
    pub abandoned_iterations: u64,
    pub iterations_started: u64,
}

/// Drives `scenario` under `cfg` until the window closes, the iteration
/// budget is spent, or `stop` is fired by the caller.
///
/// Invalid configuration is rejected before any actor starts.
pub async fn run_scenario(
    scenario: Arc<Scenario>,
    cfg: RunConfig,
    progress: Option<ProgressFn>,
    stop: Arc<StopSignal>,
) -> Result<RunReport> {
    cfg.validate()?;

    let max_users = cfg.profile.max_users();
    let planned_duration = cfg.effective_duration();
    let schedule = Arc::new(UserSchedule::from_profile(&cfg.profile));
    let gate = Arc::new(IterationGate::new(cfg.iterations));
    let stats = Arc::new(StatsCollector::new());
    let counters = Arc::new(RunCounters::default());
    let hard_stop = Arc::new(StopSignal::new());

    tracing::info!(
        scenario = %scenario.name(),
        users = max_users,
        duration = ?planned_duration,
        iterations = ?cfg.iterations,
        "run starting"
    );

    let started = Instant::now();
    stats.start_at(started);

    let deadline_handle = planned_duration.map(|d| {
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = stop.wait() => {}
                _ = tokio::time::sleep_until((started + d).into()) => stop.fire(),
            }
        })
    });

    let hard_stop_handle = {
        let stop = stop.clone();
        let hard_stop = hard_stop.clone();
        let grace = cfg.grace;
        tokio::spawn(async move {
            stop.wait().await;
            tokio::select! {
                biased;
                _ = hard_stop.wait() => {}
                _ = tokio::time::sleep(grace) => hard_stop.fire(),
            }
        })
    };

    let progress_handle = progress.map(|progress| {
        let stats = stats.clone();
        let counters = counters.clone();
        let schedule = schedule.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;

            let mut tick: u64 = 0;
            let mut last_at = Instant::now();
            let mut last_total = 0u64;
            let mut last_failed = 0u64;

            loop {
                interval.tick().await;

                tick = tick.saturating_add(1);
                let now = Instant::now();
                let dt = now.duration_since(last_at).as_secs_f64().max(1e-9);
                last_at = now;

                let elapsed = now.saturating_duration_since(started);
                let snapshot = stats.snapshot_at(now);

                let delta_total = snapshot.total_requests.saturating_sub(last_total);
                let delta_failed = snapshot.failed_requests.saturating_sub(last_failed);
                last_total = snapshot.total_requests;
                last_failed = snapshot.failed_requests;

                let error_rate_now = if delta_total == 0 {
                    0.0
                } else {
                    delta_failed as f64 / delta_total as f64
                };

                let stage = schedule.stage_snapshot_at(elapsed).map(|st| StageProgress {
                    stage: st.index + 1,
                    stages: st.count,
                    stage_elapsed: st.stage_elapsed,
                    stage_remaining: st.stage_remaining,
                    start_target: st.start_target,
                    end_target: st.end_target,
                    current_target: st.current_target,
                });

                (progress)(ProgressUpdate {
                    tick,
                    elapsed,
                    planned_duration,
                    active_users: counters.active_users.load(Ordering::Relaxed),
                    target_users: schedule.target_at(elapsed).min(max_users),
                    stage,
                    rps_now: delta_total as f64 / dt,
                    error_rate_now,
                    snapshot,
                });
            }
        })
    });

    let mut handles = Vec::with_capacity(usize::try_from(max_users).unwrap_or(0));
    for slot in 1..=max_users {
        let ctx = UserContext {
            slot,
            scenario: scenario.clone(),
            stats: stats.clone(),
            gate: gate.clone(),
            schedule: schedule.clone(),
            counters: counters.clone(),
            stop: stop.clone(),
            hard_stop: hard_stop.clone(),
            started,
            grace: cfg.grace,
            seed: cfg.seed,
        };
        handles.push(tokio::spawn(run_user(ctx)));
    }

    let mut join_error = None;
    for h in handles {
        if let Err(err) = h.await {
            join_error.get_or_insert(err);
        }
    }
    let ended = Instant::now();
    stats.finish_at(ended);

    // Every actor is gone: release the helper tasks.
    stop.fire();
    hard_stop.fire();
    if let Some(h) = deadline_handle {
        let _ = h.await;
    }
    let _ = hard_stop_handle.await;
    if let Some(h) = progress_handle {
        h.abort();
        let _ = h.await;
    }

    if let Some(err) = join_error {
        return Err(err.into());
    }

    let snapshot = stats.snapshot_at(ended);
    let report = RunReport {
        users_started: counters.users_started.load(Ordering::Relaxed),
        peak_active_users: counters.peak_active_users.load(Ordering::Relaxed),
        setup_failures: counters.setup_failures.load(Ordering::Relaxed),
        teardown_failures: counters.teardown_failures.load(Ordering::Relaxed),
        abandoned_iterations: counters.abandoned_iterations.load(Ordering::Relaxed),
        iterations_started: gate.started(),
        snapshot,
    };

    tracing::info!(
        scenario = %scenario.name(),
        requests = report.snapshot.total_requests,
        failed = report.snapshot.failed_requests,
        elapsed = ?ended.duration_since(started),
        "run finished"
    );

    Ok(report)
}
